//! [`DocsGateway`] over the document service's REST API.

use std::path::Path;
use std::time::Duration;

use tracing::debug;
use tracker_core::{DocumentId, TrackerConfig};

use crate::error::DocsError;
use crate::gateway::DocsGateway;
use crate::wire::{BatchUpdateRequest, BatchUpdateResponse, Document, ErrorEnvelope, Request};

/// Blocking HTTP gateway authenticated with a bearer token.
pub struct HttpDocsGateway {
    agent: ureq::Agent,
    base: String,
    token: String,
}

impl std::fmt::Debug for HttpDocsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDocsGateway")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl HttpDocsGateway {
    pub fn new(base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base,
            token: token.into(),
        }
    }

    /// Build from loaded settings. Fails when no access token is configured.
    pub fn from_config(config: &TrackerConfig, home: &Path) -> Result<Self, DocsError> {
        let token = config.require_access_token(home)?;
        Ok(Self::new(
            config.docs_api_base.clone(),
            token,
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    fn document_url(&self, document_id: &DocumentId) -> String {
        format!("{}/documents/{}", self.base, document_id)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl DocsGateway for HttpDocsGateway {
    fn get_document(&self, document_id: &DocumentId) -> Result<Document, DocsError> {
        debug!("GET document {}", document_id.masked());
        let response = self
            .agent
            .get(&self.document_url(document_id))
            .set("Authorization", &self.bearer())
            .call()
            .map_err(|err| classify(err, document_id))?;
        read_json(response)
    }

    fn batch_update(
        &self,
        document_id: &DocumentId,
        requests: &[Request],
    ) -> Result<BatchUpdateResponse, DocsError> {
        debug!(
            "POST batchUpdate with {} requests to {}",
            requests.len(),
            document_id.masked()
        );
        let body = BatchUpdateRequest {
            requests: requests.to_vec(),
        };
        let url = format!("{}:batchUpdate", self.document_url(document_id));
        let response = self
            .agent
            .post(&url)
            .set("Authorization", &self.bearer())
            .send_json(&body)
            .map_err(|err| classify(err, document_id))?;
        read_json(response)
    }
}

/// Decode straight from the body stream; `into_string` caps bodies at 10 MB.
fn read_json<T: serde::de::DeserializeOwned>(response: ureq::Response) -> Result<T, DocsError> {
    serde_json::from_reader(response.into_reader()).map_err(|err| {
        if err.is_io() {
            DocsError::Transport(format!("reading response body: {err}"))
        } else {
            DocsError::Json(err)
        }
    })
}

/// Map a failed call onto the error taxonomy.
fn classify(err: ureq::Error, document_id: &DocumentId) -> DocsError {
    match err {
        ureq::Error::Status(status, response) => {
            let message = response
                .into_string()
                .ok()
                .and_then(|body| {
                    serde_json::from_str::<ErrorEnvelope>(&body)
                        .ok()
                        .map(|e| e.error.message)
                        .filter(|m| !m.is_empty())
                        .or(Some(body))
                })
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("HTTP {status}"));
            match status {
                404 => DocsError::NotFound {
                    document: document_id.to_string(),
                },
                401 | 403 => DocsError::Unauthorized { message },
                _ => DocsError::RemoteRejected { status, message },
            }
        }
        ureq::Error::Transport(transport) => DocsError::Transport(transport.to_string()),
    }
}
