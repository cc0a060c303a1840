use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;
use serde_json::json;
use tracker_core::{DocumentId, GrantRecord, SectionName, TrackerConfig};
use tracker_docs::wire::{BatchUpdateRequest, InsertText, Location, Request};
use tracker_docs::{
    get_snapshot, locate, sync_grant_to_doc, DocsError, DocsGateway, DocumentBuilder,
    HttpDocsGateway, MemoryDocsGateway, SectionOutcome,
};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

const TOKEN: &str = "ya29.test-token";

fn gateway_for(server: &MockServer) -> HttpDocsGateway {
    HttpDocsGateway::new(format!("{}/v1/", server.uri()), TOKEN, Duration::from_secs(5))
}

/// Run a blocking gateway call off the async runtime driving the mock server.
async fn blocking<T, F>(call: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call).await.expect("join")
}

fn minimal_document(id: &str) -> serde_json::Value {
    json!({
        "documentId": id,
        "title": "Tracker",
        "revisionId": "rev-1",
        "body": {"content": [
            {"endIndex": 1, "sectionBreak": {"sectionStyle": {}}},
            {"startIndex": 1, "endIndex": 7, "paragraph": {
                "elements": [{"startIndex": 1, "endIndex": 7,
                    "textRun": {"content": "Hello\n", "textStyle": {}}}],
                "paragraphStyle": {"namedStyleType": "NORMAL_TEXT"}
            }}
        ]}
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_document_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/documents/doc-1"))
        .and(header("authorization", "Bearer ya29.test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(minimal_document("doc-1")))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let document = blocking(move || gateway.get_document(&DocumentId::from("doc-1")))
        .await
        .expect("document");
    assert_eq!(document.document_id, "doc-1");
    assert_eq!(document.revision_id.as_deref(), Some("rev-1"));
    assert_eq!(document.body.content.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn large_documents_are_read_in_full() {
    let text = format!("{}\n", "x".repeat(11 * 1024 * 1024));
    let end = 1 + text.len() as i64;
    let mut body = minimal_document("doc-big");
    body["body"]["content"][1] = json!({"startIndex": 1, "endIndex": end, "paragraph": {
        "elements": [{"startIndex": 1, "endIndex": end,
            "textRun": {"content": text, "textStyle": {}}}],
        "paragraphStyle": {"namedStyleType": "NORMAL_TEXT"}
    }});

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/documents/doc-big"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let document = blocking(move || gateway.get_document(&DocumentId::from("doc-big")))
        .await
        .expect("document larger than 10 MB");
    assert_eq!(document.body.content.len(), 2);
    assert_eq!(document.body.content[1].end_index, end);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_update_posts_requests_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/documents/doc-1:batchUpdate"))
        .and(body_partial_json(json!({"requests": [
            {"insertText": {"text": "b", "location": {"index": 5}}},
            {"insertText": {"text": "a", "location": {"index": 2}}}
        ]})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"documentId": "doc-1", "replies": [{}, {}]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let insert = |index, text: &str| {
        Request::InsertText(InsertText {
            text: text.to_string(),
            location: Location { index },
        })
    };
    let requests = vec![insert(5, "b"), insert(2, "a")];
    let gateway = gateway_for(&server);
    let response = blocking(move || gateway.batch_update(&DocumentId::from("doc-1"), &requests))
        .await
        .expect("batch");
    assert_eq!(response.replies.len(), 2);
}

#[rstest]
#[case(404, "", "not found")]
#[case(401, r#"{"error":{"code":401,"message":"Request had invalid authentication credentials.","status":"UNAUTHENTICATED"}}"#, "unauthorized")]
#[case(403, r#"{"error":{"code":403,"message":"The caller does not have permission","status":"PERMISSION_DENIED"}}"#, "unauthorized")]
#[case(400, r#"{"error":{"code":400,"message":"Invalid requests[0].deleteContentRange: Index 99 must be less than the end index","status":"INVALID_ARGUMENT"}}"#, "rejected")]
#[case(503, "upstream unavailable", "rejected")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_statuses_map_onto_taxonomy(
    #[case] status: u16,
    #[case] body: &'static str,
    #[case] expected: &'static str,
) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let err = blocking(move || gateway.get_document(&DocumentId::from("doc-1")))
        .await
        .unwrap_err();
    match (expected, &err) {
        ("not found", DocsError::NotFound { document }) => assert_eq!(document, "doc-1"),
        ("unauthorized", DocsError::Unauthorized { message }) => {
            assert!(!message.contains("error"), "envelope not unwrapped: {message}")
        }
        ("rejected", DocsError::RemoteRejected { status: s, message }) => {
            assert_eq!(*s, status);
            assert!(!message.is_empty());
            assert!(!message.starts_with('{'), "envelope not unwrapped: {message}");
        }
        _ => panic!("status {status} mapped to {err:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_failure_is_a_transport_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("port")
        .port();
    let gateway =
        HttpDocsGateway::new(format!("http://127.0.0.1:{port}/v1"), TOKEN, Duration::from_secs(2));
    let err = blocking(move || gateway.get_document(&DocumentId::from("doc-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, DocsError::Transport(_)), "got {err:?}");
}

#[test]
fn from_config_requires_a_token() {
    let home = tempfile::TempDir::new().expect("home");
    let err = HttpDocsGateway::from_config(&TrackerConfig::default(), home.path()).unwrap_err();
    assert!(matches!(err, DocsError::Config(_)), "got {err:?}");

    let config = TrackerConfig {
        access_token: Some(TOKEN.to_string()),
        ..TrackerConfig::default()
    };
    let gateway = HttpDocsGateway::from_config(&config, home.path()).expect("gateway");
    assert!(!format!("{gateway:?}").contains(TOKEN));
}

/// Serves the REST API from an in-memory document.
struct EmulatedDocs(Arc<MemoryDocsGateway>);

impl Respond for EmulatedDocs {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let route = request.url.path().trim_start_matches("/v1/documents/");
        let result = match route.split_once(':') {
            Some((id, "batchUpdate")) => serde_json::from_slice::<BatchUpdateRequest>(&request.body)
                .map_err(DocsError::from)
                .and_then(|body| self.0.batch_update(&DocumentId::from(id), &body.requests))
                .and_then(|reply| Ok(serde_json::to_value(reply)?)),
            _ => self
                .0
                .get_document(&DocumentId::from(route))
                .and_then(|doc| Ok(serde_json::to_value(doc)?)),
        };
        match result {
            Ok(body) => ResponseTemplate::new(200).set_body_json(body),
            Err(DocsError::NotFound { .. }) => ResponseTemplate::new(404),
            Err(err) => ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": 400, "message": err.to_string(), "status": "INVALID_ARGUMENT"}
            })),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_sync_over_http() {
    let docs = Arc::new(MemoryDocsGateway::new());
    docs.insert("doc-1", DocumentBuilder::new().paragraph("Notes"));

    let server = MockServer::start().await;
    Mock::given(path_regex(r"^/v1/documents/[A-Za-z0-9_-]+(:batchUpdate)?$"))
        .respond_with(EmulatedDocs(Arc::clone(&docs)))
        .mount(&server)
        .await;

    let gateway = gateway_for(&server);
    let report = blocking(move || {
        sync_grant_to_doc(
            &gateway,
            "https://docs.google.com/document/d/doc-1/edit",
            &GrantRecord::new("G-1"),
            &["Ada Lovelace".to_string()],
        )
    })
    .await
    .expect("sync");
    assert_eq!(report.metadata, SectionOutcome::Created);
    assert_eq!(report.approvals, SectionOutcome::Created);

    let snapshot = get_snapshot(docs.as_ref(), &DocumentId::from("doc-1")).expect("snapshot");
    assert!(locate(&snapshot, SectionName::Metadata).is_some());
    assert!(locate(&snapshot, SectionName::Approvals).is_some());
    assert_eq!(docs.batch_count(), 10);
}
