//! # tracker-docs
//!
//! Keeps the managed sections of a grant tracker document in sync with the
//! grant record.
//!
//! Call [`sync_grant_to_doc`] with any [`DocsGateway`]: [`HttpDocsGateway`]
//! talks to the document service, [`MemoryDocsGateway`] emulates it in
//! memory.
//!
//! ```
//! use tracker_core::GrantRecord;
//! use tracker_docs::{sync_grant_to_doc, DocumentBuilder, MemoryDocsGateway, SectionOutcome};
//!
//! let gateway = MemoryDocsGateway::new();
//! gateway.insert("doc-1", DocumentBuilder::new().paragraph("Notes"));
//!
//! let report = sync_grant_to_doc(&gateway, "doc-1", &GrantRecord::new("G-1"), &[]).unwrap();
//! assert_eq!(report.metadata, SectionOutcome::Created);
//! ```

pub mod diff;
pub mod error;
pub mod gateway;
pub mod http;
pub mod inspect;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod reconciler;
pub mod sections;
pub mod snapshot;
pub mod wire;

pub use diff::diff_metadata;
pub use error::DocsError;
pub use gateway::DocsGateway;
pub use http::HttpDocsGateway;
pub use inspect::{inspect, InspectReport, SectionReport};
pub use memory::{DocumentBuilder, MemoryDocsGateway, RecordedBatch};
pub use orchestrator::{resolve_document, sync_grant_to_doc, SyncReport};
pub use planner::{EditBatch, EditOperation};
pub use reconciler::{locate, LocateOrigin, LocatedSection, SectionOutcome, SectionReconciler};
pub use snapshot::{get_snapshot, Anchor, DocumentSnapshot, Offset, SnapshotId, Span};
