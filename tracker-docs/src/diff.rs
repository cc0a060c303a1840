//! Read-only preview of a metadata refresh.

use similar::TextDiff;
use tracker_core::{DocumentId, FieldRow, GrantRecord, SectionName};
use tracker_projector::project_metadata;

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::reconciler::locate;
use crate::snapshot::get_snapshot;

/// Unified diff between the metadata table in the document and what a sync
/// would write for `grant`. Empty when they already match.
///
/// Nothing is written.
pub fn diff_metadata<G>(
    gateway: &G,
    document_id: &DocumentId,
    grant: &GrantRecord,
) -> Result<String, DocsError>
where
    G: DocsGateway + ?Sized,
{
    let snapshot = get_snapshot(gateway, document_id)?;
    let current = locate(&snapshot, SectionName::Metadata)
        .and_then(|found| found.table)
        .map(|table| table.field_rows())
        .unwrap_or_default();
    let projected = project_metadata(grant);

    let old = render_rows(&current);
    let new = render_rows(&projected);
    if old == new {
        return Ok(String::new());
    }
    let old_header = format!("a/{}", document_id.masked());
    let new_header = format!("b/{}", grant.id);
    Ok(TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string())
}

/// `label: value` per line.
pub fn render_rows(rows: &[FieldRow]) -> String {
    rows.iter()
        .map(|row| format!("{}: {}\n", row.label, row.value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DocumentBuilder, MemoryDocsGateway};

    #[test]
    fn absent_section_diffs_against_empty_text() {
        let gateway = MemoryDocsGateway::new();
        gateway.insert("doc", DocumentBuilder::new().paragraph("Notes"));
        let diff = diff_metadata(&gateway, &DocumentId::from("doc"), &GrantRecord::new("G-1")).unwrap();
        assert!(diff.contains("+Grant ID: G-1"), "got:\n{diff}");
        assert!(!diff.lines().any(|l| l.starts_with("-G")));
        assert_eq!(gateway.batch_count(), 0);
    }

    #[test]
    fn render_rows_keeps_order() {
        let rows = vec![FieldRow::new("A", "1"), FieldRow::new("B", "")];
        assert_eq!(render_rows(&rows), "A: 1\nB: \n");
    }
}
