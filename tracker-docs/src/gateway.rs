//! The document-mutation gateway seam.

use std::sync::Arc;

use tracker_core::DocumentId;

use crate::error::DocsError;
use crate::wire::{BatchUpdateResponse, Document, Request};

/// Blocking access to a remote document service.
///
/// `batch_update` applies `requests` in order as one atomic unit: either every
/// request is applied or none is.
pub trait DocsGateway {
    fn get_document(&self, document_id: &DocumentId) -> Result<Document, DocsError>;

    fn batch_update(
        &self,
        document_id: &DocumentId,
        requests: &[Request],
    ) -> Result<BatchUpdateResponse, DocsError>;
}

impl<G: DocsGateway + ?Sized> DocsGateway for &G {
    fn get_document(&self, document_id: &DocumentId) -> Result<Document, DocsError> {
        (**self).get_document(document_id)
    }

    fn batch_update(
        &self,
        document_id: &DocumentId,
        requests: &[Request],
    ) -> Result<BatchUpdateResponse, DocsError> {
        (**self).batch_update(document_id, requests)
    }
}

impl<G: DocsGateway + ?Sized> DocsGateway for Arc<G> {
    fn get_document(&self, document_id: &DocumentId) -> Result<Document, DocsError> {
        (**self).get_document(document_id)
    }

    fn batch_update(
        &self,
        document_id: &DocumentId,
        requests: &[Request],
    ) -> Result<BatchUpdateResponse, DocsError> {
        (**self).batch_update(document_id, requests)
    }
}
