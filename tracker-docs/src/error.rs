//! Error types for tracker-docs.

use thiserror::Error;

use tracker_core::ConfigError;

use crate::snapshot::SnapshotId;

/// All errors that can arise while reading or mutating a document.
///
/// The first four variants are the failure taxonomy callers are expected to
/// branch on; every variant aborts the sequence it occurs in.
#[derive(Debug, Error)]
pub enum DocsError {
    /// Bad document id, or the document does not exist.
    #[error("document not found: {document}")]
    NotFound { document: String },

    /// Credential missing, expired, or lacking access.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The document service refused a request (for example an invalid range).
    #[error("document service rejected the request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// An element that should exist is missing, or an input cannot name a document.
    #[error("malformed document state: {0}")]
    Malformed(String),

    /// Connection-level failure before any response was received.
    #[error("transport error: {0}")]
    Transport(String),

    /// An offset from one snapshot was planned into a batch for another.
    #[error("offset from snapshot {found} used in a batch planned against snapshot {expected}")]
    StaleOffset {
        expected: SnapshotId,
        found: SnapshotId,
    },

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error while building a gateway.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl DocsError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        DocsError::Malformed(message.into())
    }

    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        DocsError::RemoteRejected {
            status: 400,
            message: message.into(),
        }
    }
}
