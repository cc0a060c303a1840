//! Report where the managed sections of a document are.

use serde::Serialize;
use tracker_core::{DocumentId, FieldRow, SectionName};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::reconciler::{locate, LocateOrigin};
use crate::sections::spec;
use crate::snapshot::get_snapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionReport {
    pub section: SectionName,
    pub range_name: &'static str,
    /// `None` when the section is absent.
    pub origin: Option<LocateOrigin>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub rows: Vec<FieldRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub document_id: DocumentId,
    pub revision_id: Option<String>,
    pub sections: Vec<SectionReport>,
}

pub fn inspect<G>(gateway: &G, document_id: &DocumentId) -> Result<InspectReport, DocsError>
where
    G: DocsGateway + ?Sized,
{
    let snapshot = get_snapshot(gateway, document_id)?;
    let sections = SectionName::all()
        .iter()
        .map(|&section| {
            let found = locate(&snapshot, section);
            SectionReport {
                section,
                range_name: spec(section).range_name,
                origin: found.as_ref().map(|f| f.origin),
                start: found.as_ref().map(|f| f.span.start()),
                end: found.as_ref().map(|f| f.span.end()),
                rows: found
                    .and_then(|f| f.table)
                    .map(|t| t.field_rows())
                    .unwrap_or_default(),
            }
        })
        .collect();
    Ok(InspectReport {
        document_id: document_id.clone(),
        revision_id: snapshot.revision_id().map(str::to_string),
        sections,
    })
}
