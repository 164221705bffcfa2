//! HTTP surface tests driven through the router without a socket.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use rag_gateway_config::ServerConfig;
use rag_gateway_core::{CompletionOrchestrator, GatewayServices, RetrievalSettings};
use rag_gateway_protocol::ChatMessage;
use rag_gateway_server::{AppState, SIGNATURE_HEADER, TOKEN_HEADER, router};
use rag_gateway_test_utils::{
    FailingCompletion, MemoryDocumentStore, ScriptedCompletion, StaticEmbedder, TestSigner,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

const BODY_LIMIT: usize = 64 * 1024;

struct Harness {
    signer: TestSigner,
    completion: Arc<ScriptedCompletion>,
    app: axum::Router,
}

fn harness_with(
    server: ServerConfig,
    completions: Arc<dyn rag_gateway_core::CompletionProvider>,
    completion: Arc<ScriptedCompletion>,
) -> Harness {
    let signer = TestSigner::default();
    let orchestrator = CompletionOrchestrator::new(
        RetrievalSettings {
            preamble: String::new(),
            ..RetrievalSettings::default()
        },
        signer.verifier(),
        GatewayServices {
            documents: Arc::new(
                MemoryDocumentStore::new().with_document("data/faq.md", "Answer is 42."),
            ),
            embedder: Arc::new(StaticEmbedder::new(vec![1.0, 0.0])),
            completions,
        },
    );
    Harness {
        signer,
        completion,
        app: router(AppState::new(Arc::new(orchestrator)), &server),
    }
}

fn harness() -> Harness {
    let completion = Arc::new(ScriptedCompletion::sse(&["{\"n\":1}", "[DONE]"]));
    harness_with(server_config("/"), completion.clone(), completion)
}

fn server_config(route: &str) -> ServerConfig {
    ServerConfig {
        route: route.to_string(),
        max_body_bytes: BODY_LIMIT,
        ..ServerConfig::default()
    }
}

fn chat_body() -> String {
    json!({ "messages": [{ "role": "user", "content": "what is the answer?" }] }).to_string()
}

fn post(path: &str, body: String, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::post(path)
        .header(TOKEN_HEADER, "ghu_token")
        .header("Copilot-Integration-Id", "agent-id")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body)).expect("request")
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf8")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_request_streams_completion() {
    let harness = harness();
    let body = chat_body();
    let signature = harness.signer.sign(body.as_bytes());
    let response = harness
        .app
        .oneshot(post("/", body, Some(signature)))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    assert_eq!(
        read_body(response).await,
        "data: {\"n\":1}\n\ndata: [DONE]\n\n"
    );

    let request = harness.completion.last_request().expect("forwarded");
    assert_eq!(request.messages[0], ChatMessage::system("Context: Answer is 42."));
    let auth = harness.completion.auths().remove(0);
    assert_eq!(auth.token, "ghu_token");
    assert_eq!(auth.integration_id, "agent-id");
}

#[tokio::test]
async fn tampered_body_is_unauthorized() {
    let harness = harness();
    let body = chat_body();
    let signature = harness.signer.sign(body.as_bytes());
    let response = harness
        .app
        .oneshot(post("/", format!("{body}\n"), Some(signature)))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_body(response).await, "invalid payload signature");
    assert_eq!(harness.completion.calls(), 0);
}

#[tokio::test]
async fn missing_signature_is_unauthorized() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(post("/", chat_body(), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.completion.calls(), 0);
}

#[tokio::test]
async fn verified_non_json_is_bad_request() {
    let harness = harness();
    let body = "{not json".to_string();
    let signature = harness.signer.sign(body.as_bytes());
    let response = harness
        .app
        .oneshot(post("/", body, Some(signature)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_body(response).await, "malformed request body");
}

#[tokio::test]
async fn downstream_failure_hides_details() {
    let scripted = Arc::new(ScriptedCompletion::new(""));
    let harness = harness_with(server_config("/"), Arc::new(FailingCompletion::new()), scripted);
    let body = chat_body();
    let signature = harness.signer.sign(body.as_bytes());
    let response = harness
        .app
        .oneshot(post("/", body, Some(signature)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = read_body(response).await;
    assert_eq!(text, "internal server error");
}

#[tokio::test]
async fn configured_route_is_served() {
    let completion = Arc::new(ScriptedCompletion::new("ok\n"));
    let harness = harness_with(server_config("/agent"), completion.clone(), completion);
    let body = chat_body();
    let signature = harness.signer.sign(body.as_bytes());

    let response = harness
        .app
        .clone()
        .oneshot(post("/agent", body.clone(), Some(signature.clone())))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "ok\n");

    let response = harness
        .app
        .oneshot(post("/", body, Some(signature)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let harness = harness();
    let body = "x".repeat(BODY_LIMIT + 1);
    let signature = harness.signer.sign(body.as_bytes());
    let response = harness
        .app
        .oneshot(post("/", body, Some(signature)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(harness.completion.calls(), 0);
}
