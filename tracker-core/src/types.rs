//! Domain types shared by every grant-tracker crate.
//!
//! Grant records arrive as flat spreadsheet rows, so every cell is parsed
//! leniently: strings, numbers, booleans and nulls all collapse to text.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Spreadsheet identifier of a grant (the `ID` column).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GrantId(pub String);

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for GrantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GrantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a remote document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Resolve a document identifier from either a document URL containing
    /// `/d/{id}` or a bare identifier.
    ///
    /// Returns `None` when the input is neither.
    pub fn resolve(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(pos) = input.find("/d/") {
            let rest = &input[pos + 3..];
            let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
            let id = &rest[..end];
            return is_id(id).then(|| Self(id.to_owned()));
        }
        is_id(input).then(|| Self(input.to_owned()))
    }

    /// First 8 and last 4 characters, for log lines.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

fn is_id(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Mask all but the first 8 and last 4 characters of an identifier.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    match chars.len() {
        0 => "(not set)".to_string(),
        n if n <= 12 => format!("{}...", chars[..n / 2].iter().collect::<String>()),
        n => format!(
            "{}...{}",
            chars[..8].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

// ---------------------------------------------------------------------------
// Sections and rows
// ---------------------------------------------------------------------------

/// The two managed sections of a tracker document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionName {
    Metadata,
    Approvals,
}

impl SectionName {
    pub fn all() -> &'static [SectionName] {
        &[SectionName::Metadata, SectionName::Approvals]
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionName::Metadata => write!(f, "Metadata"),
            SectionName::Approvals => write!(f, "Approvals"),
        }
    }
}

/// One `(label, value)` row of a managed section's table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRow {
    pub label: String,
    pub value: String,
}

impl FieldRow {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Grant record
// ---------------------------------------------------------------------------

/// One row of the Grants sheet.
///
/// Field names follow the sheet's column headers. Columns this crate does not
/// know about are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GrantRecord {
    #[serde(rename = "ID", deserialize_with = "cell_id")]
    pub id: GrantId,
    #[serde(rename = "Title", default, deserialize_with = "cell")]
    pub title: String,
    #[serde(rename = "Organization", default, deserialize_with = "cell")]
    pub organization: String,
    #[serde(rename = "Status", default, deserialize_with = "cell")]
    pub status: String,
    #[serde(rename = "Amount", default, deserialize_with = "cell")]
    pub amount: String,
    #[serde(
        rename = "Primary_Contact",
        alias = "Primary Contact",
        default,
        deserialize_with = "cell"
    )]
    pub primary_contact: String,
    #[serde(
        rename = "Other_Contacts",
        alias = "Other Contacts",
        default,
        deserialize_with = "cell"
    )]
    pub other_contacts: String,
    #[serde(rename = "Year", default, deserialize_with = "cell")]
    pub year: String,
    #[serde(rename = "Beneficiary", default, deserialize_with = "cell")]
    pub beneficiary: String,
    #[serde(rename = "Tags", default, deserialize_with = "cell")]
    pub tags: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl GrantRecord {
    pub fn new(id: impl Into<GrantId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

fn cell<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<CellValue> = Option::deserialize(deserializer)?;
    Ok(match value {
        None => String::new(),
        Some(CellValue::Text(s)) => s.trim().to_string(),
        Some(CellValue::Int(n)) => n.to_string(),
        Some(CellValue::Float(n)) => n.to_string(),
        Some(CellValue::Bool(b)) => b.to_string(),
    })
}

fn cell_id<'de, D>(deserializer: D) -> Result<GrantId, D::Error>
where
    D: Deserializer<'de>,
{
    cell(deserializer).map(GrantId)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_id_from_url() {
        let id = DocumentId::resolve(
            "https://docs.google.com/document/d/1AbC-xyz_09/edit?tab=t.0",
        )
        .expect("id");
        assert_eq!(id.0, "1AbC-xyz_09");
    }

    #[test]
    fn resolves_bare_id() {
        assert_eq!(
            DocumentId::resolve("  1AbC-xyz_09 ").map(|d| d.0),
            Some("1AbC-xyz_09".to_string())
        );
    }

    #[test]
    fn rejects_unrecognised_input() {
        assert!(DocumentId::resolve("https://example.com/not-a-doc").is_none());
        assert!(DocumentId::resolve("https://docs.google.com/document/d//edit").is_none());
        assert!(DocumentId::resolve("").is_none());
    }

    #[test]
    fn mask_keeps_prefix_and_suffix() {
        assert_eq!(mask(""), "(not set)");
        assert_eq!(mask("abcdef"), "abc...");
        assert_eq!(mask("1234567890abcdefXYZW"), "12345678...XYZW");
    }

    #[test]
    fn grant_cells_accept_numbers_and_nulls() {
        let yaml = "ID: PYPI-2026-Packaging\nTitle: Security Audit\nAmount: 50000\nYear: 2026\nTags: null\nCat_A_Percent: 40\n";
        let grant: GrantRecord = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(grant.id.0, "PYPI-2026-Packaging");
        assert_eq!(grant.amount, "50000");
        assert_eq!(grant.year, "2026");
        assert_eq!(grant.tags, "");
        assert!(grant.extra.contains_key("Cat_A_Percent"));
    }

    #[test]
    fn section_display() {
        assert_eq!(SectionName::Metadata.to_string(), "Metadata");
        assert_eq!(SectionName::Approvals.to_string(), "Approvals");
    }
}
