//! HTTP contract tests: routes, status codes, and session semantics, with mock providers.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pagerelay::{router, Relay, RelayConfig};
use pagerelay_core::{AskProvider, ConversationTurn, Error, ProviderKind, Result};
use pagerelay_local::ProviderRegistry;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

#[derive(Default)]
struct Calls {
    count: AtomicUsize,
    last_message: Mutex<Option<String>>,
}

/// Answers with a fixed string, or fails with a fixed error when `answer` is `None`.
struct Scripted {
    kind: ProviderKind,
    available: bool,
    answer: Option<&'static str>,
    calls: Arc<Calls>,
}

#[async_trait::async_trait]
impl AskProvider for Scripted {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn send(
        &self,
        _system: &str,
        user_message: &str,
        _history: &[ConversationTurn],
        _model: Option<&str>,
    ) -> Result<String> {
        self.calls.count.fetch_add(1, Ordering::SeqCst);
        *self.calls.last_message.lock().unwrap() = Some(user_message.to_string());
        match self.answer {
            Some(a) => Ok(a.to_string()),
            None => Err(Error::upstream(self.kind, Some(503), "overloaded")),
        }
    }
}

struct Harness {
    relay: Arc<Relay>,
    app: Router,
    codex: Arc<Calls>,
    claude: Arc<Calls>,
}

fn harness(codex_answer: Option<&'static str>) -> Harness {
    let codex = Arc::new(Calls::default());
    let claude = Arc::new(Calls::default());
    let reg = ProviderRegistry::new()
        .register(Scripted {
            kind: ProviderKind::Codex,
            available: true,
            answer: codex_answer,
            calls: codex.clone(),
        })
        .register(Scripted {
            kind: ProviderKind::Claude,
            available: false,
            answer: Some("from claude"),
            calls: claude.clone(),
        });
    let relay = Arc::new(Relay::new(reg, RelayConfig::default()));
    Harness {
        app: router(relay.clone()),
        relay,
        codex,
        claude,
    }
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn ask_with_empty_question_is_400_and_never_calls_a_provider() {
    let h = harness(Some("unused"));
    let (status, body) = post(
        &h.app,
        "/ask",
        json!({"question": "   ", "context": "Some page text."}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"detail": "Question cannot be empty"}));
    assert_eq!(h.codex.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ask_with_empty_context_is_400() {
    let h = harness(Some("unused"));
    let (status, body) = post(&h.app, "/ask", json!({"question": "q", "context": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Context cannot be empty");
}

#[tokio::test]
async fn ask_routes_to_default_provider_with_wrapped_context() {
    let h = harness(Some("Blue."));
    let (status, body) = post(
        &h.app,
        "/ask",
        json!({
            "question": " What color is the sky? ",
            "context": "The sky is blue.",
            "url": "https://example.test/sky",
            "title": "Sky"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"answer": "Blue."}));
    assert_eq!(h.claude.count.load(Ordering::SeqCst), 0);

    let msg = h.codex.last_message.lock().unwrap().clone().unwrap();
    assert!(msg.starts_with("Page URL: https://example.test/sky\nPage Title: Sky\n\n"));
    assert!(msg.contains("BEGIN_UNTRUSTED_PAGE_TEXT\nThe sky is blue.\nEND_UNTRUSTED_PAGE_TEXT"));
    assert!(msg.ends_with("User Question: What color is the sky?"));
}

#[tokio::test]
async fn ask_honors_explicit_provider() {
    let h = harness(Some("from codex"));
    let (status, body) = post(
        &h.app,
        "/ask",
        json!({"question": "q", "context": "c", "provider": "claude"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "from claude");
    assert_eq!(h.codex.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn schema_violations_are_422() {
    let h = harness(Some("unused"));
    let cases = [
        json!({"question": "q".repeat(2_001), "context": "c"}),
        json!({"question": "q", "context": "c".repeat(50_001)}),
        json!({"question": "q", "context": "c", "title": "t".repeat(501)}),
        json!({"question": "q", "context": "c", "url": "u".repeat(2_001)}),
        json!({"question": "q", "context": "c", "provider": "gemini"}),
        json!({"question": "q", "context": "c", "history": [{"role": "system", "content": "x"}]}),
        json!({"question": "q", "context": "c", "history": vec![json!({"role": "user", "content": "x"}); 51]}),
        json!({"context": "missing question"}),
    ];
    for case in cases {
        let (status, body) = post(&h.app, "/ask", case).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string(), "missing detail: {body}");
    }
    assert_eq!(h.codex.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn session_round_trip_records_exactly_one_exchange() {
    let h = harness(Some("Blue."));
    let (status, body) = post(
        &h.app,
        "/session/create",
        json!({"context": "The sky is blue."}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = post(
        &h.app,
        "/session/ask",
        json!({"session_id": id, "question": "What color is the sky?"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"answer": "Blue."}));

    let session = h.relay.sessions().get(&id).await.unwrap();
    assert_eq!(
        session.history,
        vec![
            ConversationTurn::user("What color is the sky?"),
            ConversationTurn::assistant("Blue."),
        ]
    );
}

#[tokio::test]
async fn failed_session_ask_leaves_history_untouched() {
    let h = harness(None);
    let (_, body) = post(&h.app, "/session/create", json!({"context": "ctx"})).await;
    let id = body["session_id"].as_str().unwrap().to_string();

    let (status, body) = post(
        &h.app,
        "/session/ask",
        json!({"session_id": id, "question": "q"}),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "Codex CLI error: overloaded");
    assert!(h.relay.sessions().get(&id).await.unwrap().history.is_empty());
}

#[tokio::test]
async fn unknown_session_is_404() {
    let h = harness(Some("unused"));
    let (status, body) = post(
        &h.app,
        "/session/ask",
        json!({"session_id": "00000000-0000-4000-8000-000000000000", "question": "q"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Session not found or expired"}));
}

#[tokio::test]
async fn session_create_rejects_blank_context() {
    let h = harness(Some("unused"));
    let (status, _) = post(&h.app, "/session/create", json!({"context": " \n"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.relay.sessions().is_empty());
}

#[tokio::test]
async fn unregistered_provider_is_500_with_detail() {
    let h = harness(Some("unused"));
    let (status, body) = post(
        &h.app,
        "/ask",
        json!({"question": "q", "context": "c", "provider": "openai"}),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("OpenAI"));
}

#[tokio::test]
async fn health_reports_local_availability_without_asking() {
    let h = harness(Some("unused"));
    let resp = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(
        body,
        json!({
            "status": "ok",
            "providers": ["codex"],
            "codex_available": true,
            "claude_available": false,
            "chatgpt_available": false,
            "openai_available": false,
        })
    );
    assert_eq!(h.codex.count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cors_allows_only_extension_origins() {
    let h = harness(Some("unused"));
    let preflight = |origin: &'static str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/ask")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    };

    let resp = h
        .app
        .clone()
        .oneshot(preflight("chrome-extension://abcdefghijklmnop"))
        .await
        .unwrap();
    assert_eq!(
        resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "chrome-extension://abcdefghijklmnop"
    );

    let resp = h
        .app
        .clone()
        .oneshot(preflight("https://evil.example"))
        .await
        .unwrap();
    assert!(resp
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
