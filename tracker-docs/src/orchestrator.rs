//! Public entry point: project one grant into one document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracker_core::{DocumentId, FieldRow, GrantRecord, SectionName};
use tracker_projector::{project_approvals, project_metadata};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::reconciler::{SectionOutcome, SectionReconciler};
use crate::sections::{spec, Placement};
use crate::snapshot::Anchor;

/// What one sync did to each managed section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub document_id: DocumentId,
    pub metadata: SectionOutcome,
    pub approvals: SectionOutcome,
}

/// Resolve a document id from a `.../d/{id}/...` URL or a bare id.
pub fn resolve_document(input: &str) -> Result<DocumentId, DocsError> {
    DocumentId::resolve(input).ok_or_else(|| {
        DocsError::malformed(format!("cannot find a document id in {:?}", input.trim()))
    })
}

/// Write the grant's metadata section and, when approvers are given, make
/// sure an approvals section exists right after it.
///
/// First-time setup and later refreshes both go through here. Any failure
/// aborts the sync and is returned unchanged; running the sync again is
/// safe because every step re-reads the document.
pub fn sync_grant_to_doc<G>(
    gateway: &G,
    document: &str,
    grant: &GrantRecord,
    approvers: &[String],
) -> Result<SyncReport, DocsError>
where
    G: DocsGateway + ?Sized,
{
    let document_id = resolve_document(document)?;
    info!(
        "syncing grant {} into {}",
        grant.id,
        document_id.masked()
    );
    let reconciler = SectionReconciler::new(gateway, &document_id);

    let mut ends: BTreeMap<SectionName, Anchor> = BTreeMap::new();
    let mut outcomes: BTreeMap<SectionName, SectionOutcome> = BTreeMap::new();
    for &section in SectionName::all() {
        let fields = section_fields(section, grant, approvers);
        if fields.is_empty() {
            outcomes.insert(section, SectionOutcome::Skipped);
            continue;
        }
        let at = match spec(section).placement {
            Placement::BodyStart => Anchor::BODY_START,
            Placement::After(previous) => ends.get(&previous).copied().unwrap_or(Anchor::BODY_START),
        };
        let done = reconciler.reconcile(section, &fields, at)?;
        info!(
            "{section} in {}: {:?}",
            document_id.masked(),
            done.outcome
        );
        ends.insert(section, done.end);
        outcomes.insert(section, done.outcome);
    }

    let outcome = |section| {
        outcomes
            .get(&section)
            .copied()
            .unwrap_or(SectionOutcome::Skipped)
    };
    Ok(SyncReport {
        metadata: outcome(SectionName::Metadata),
        approvals: outcome(SectionName::Approvals),
        document_id,
    })
}

fn section_fields(section: SectionName, grant: &GrantRecord, approvers: &[String]) -> Vec<FieldRow> {
    match section {
        SectionName::Metadata => project_metadata(grant),
        SectionName::Approvals => project_approvals(approvers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DocumentBuilder, MemoryDocsGateway};

    #[test]
    fn unresolvable_document_is_malformed() {
        let gateway = MemoryDocsGateway::new();
        let err = sync_grant_to_doc(
            &gateway,
            "https://example.com/sheet",
            &GrantRecord::new("G-1"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DocsError::Malformed(_)));
        assert_eq!(gateway.read_count(), 0);
    }

    #[test]
    fn no_approvers_skips_the_approvals_section() {
        let gateway = MemoryDocsGateway::new();
        gateway.insert("doc", DocumentBuilder::new().paragraph(""));
        let report = sync_grant_to_doc(&gateway, "doc", &GrantRecord::new("G-1"), &[" ".to_string()])
            .unwrap();
        assert_eq!(report.metadata, SectionOutcome::Created);
        assert_eq!(report.approvals, SectionOutcome::Skipped);
    }

    #[test]
    fn missing_document_surfaces_not_found() {
        let gateway = MemoryDocsGateway::new();
        let err = sync_grant_to_doc(
            &gateway,
            "https://docs.google.com/document/d/missing123/edit",
            &GrantRecord::new("G-1"),
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, DocsError::NotFound { .. }));
    }
}
