//! Section row projection.

use tracker_core::{FieldRow, GrantRecord};

use crate::format::{format_currency, format_tags};

/// Labels of the Metadata table, in display order.
pub const METADATA_LABELS: [&str; 9] = [
    "Grant ID",
    "Title",
    "Organization",
    "Status",
    "Amount",
    "Year",
    "Primary Contact",
    "Beneficiary",
    "Tags",
];

/// Rows of the Metadata section for `grant`.
///
/// Always returns one row per entry of [`METADATA_LABELS`], in that order;
/// blank cells become empty values.
pub fn project_metadata(grant: &GrantRecord) -> Vec<FieldRow> {
    let values = [
        grant.id.0.trim().to_string(),
        grant.title.trim().to_string(),
        grant.organization.trim().to_string(),
        grant.status.trim().to_string(),
        format_currency(&grant.amount),
        grant.year.trim().to_string(),
        grant.primary_contact.trim().to_string(),
        grant.beneficiary.trim().to_string(),
        format_tags(&grant.tags),
    ];
    METADATA_LABELS
        .iter()
        .zip(values)
        .map(|(label, value)| FieldRow::new(*label, value))
        .collect()
}

/// Rows of the Approvals section: one per approver, label only.
///
/// Blank names are dropped; order is preserved.
pub fn project_approvals(approvers: &[String]) -> Vec<FieldRow> {
    approvers
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| FieldRow::new(name, ""))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_grant() -> GrantRecord {
        let mut grant = GrantRecord::new("PYPI-2026-Packaging");
        grant.title = "Security Audit".to_string();
        grant.organization = "PyPI".to_string();
        grant.status = "Active".to_string();
        grant.amount = "50000".to_string();
        grant.year = "2026".to_string();
        grant
    }

    #[test]
    fn metadata_rows_follow_fixed_order() {
        let rows = project_metadata(&scenario_grant());
        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, METADATA_LABELS);
        let values: Vec<_> = rows.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(
            values,
            [
                "PYPI-2026-Packaging",
                "Security Audit",
                "PyPI",
                "Active",
                "$50,000",
                "2026",
                "",
                "",
                ""
            ]
        );
    }

    #[test]
    fn metadata_projection_is_deterministic() {
        let grant = scenario_grant();
        assert_eq!(project_metadata(&grant), project_metadata(&grant));
    }

    #[test]
    fn approvals_keep_order_and_drop_blanks() {
        let names = vec![
            "Grace Hopper".to_string(),
            "  ".to_string(),
            " Ada Lovelace ".to_string(),
        ];
        let rows = project_approvals(&names);
        assert_eq!(
            rows,
            vec![
                FieldRow::new("Grace Hopper", ""),
                FieldRow::new("Ada Lovelace", "")
            ]
        );
    }

    #[test]
    fn no_approvers_yields_no_rows() {
        assert!(project_approvals(&[]).is_empty());
    }
}
