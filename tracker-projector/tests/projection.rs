//! Parameterised projection tests for `tracker-projector`.
//!
//! Each `#[case]` builds its own grant — no shared state.

use rstest::rstest;
use tracker_core::GrantRecord;
use tracker_projector::{project_metadata, METADATA_LABELS};

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn grant_from_yaml(yaml: &str) -> GrantRecord {
    serde_yaml::from_str(yaml).expect("grant yaml")
}

fn value_of<'a>(rows: &'a [tracker_core::FieldRow], label: &str) -> &'a str {
    rows.iter()
        .find(|r| r.label == label)
        .map(|r| r.value.as_str())
        .unwrap_or_else(|| panic!("no row labelled {label}"))
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

#[rstest]
#[case("ID: G-1", "Grant ID", "G-1")]
#[case("ID: G-1\nTitle: '  Audit  '", "Title", "Audit")]
#[case("ID: G-1\nAmount: 75000.5", "Amount", "$75,000.50")]
#[case("ID: G-1\nAmount: pending", "Amount", "pending")]
#[case("ID: G-1\nYear: 2026", "Year", "2026")]
#[case("ID: G-1\nPrimary_Contact: Ada", "Primary Contact", "Ada")]
#[case("ID: G-1\nBeneficiary: CPython", "Beneficiary", "CPython")]
#[case("ID: G-1\nTags: a,b", "Tags", "a, b")]
fn sheet_columns_land_in_their_rows(
    #[case] yaml: &str,
    #[case] label: &str,
    #[case] expected: &str,
) {
    let rows = project_metadata(&grant_from_yaml(yaml));
    assert_eq!(rows.len(), METADATA_LABELS.len());
    assert_eq!(value_of(&rows, label), expected);
}

#[test]
fn columns_without_a_row_are_not_projected() {
    let rows = project_metadata(&grant_from_yaml(
        "ID: G-1\nOther_Contacts: Bob\nCat_A_Percent: 40\n",
    ));
    assert!(rows.iter().all(|r| r.value != "Bob" && r.value != "40"));
}
