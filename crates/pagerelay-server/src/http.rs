//! HTTP surface for the browser extension.
//!
//! Request bodies are checked against the size limits before anything else runs; violations are
//! 422, like any other schema violation. All errors use a `{"detail": "..."}` body.

use crate::dispatch::Relay;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pagerelay_core::{
    ConversationTurn, Error, PageContext, ProviderKind, MAX_CONTEXT_CHARS, MAX_HISTORY_TURNS,
    MAX_QUESTION_CHARS, MAX_TITLE_CHARS, MAX_URL_CHARS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

const EXTENSION_ORIGIN_PREFIX: &[u8] = b"chrome-extension://";

#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] Error),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{1}")]
    Rejected(StatusCode, String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Relay(e) => match e {
                Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
                Error::SessionNotFound => StatusCode::NOT_FOUND,
                Error::ProviderUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
                Error::AuthExpired(_) | Error::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
                Error::Upstream { status, .. } => status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            },
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Rejected(code, _) => *code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status();
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rej: JsonRejection) -> Self {
        ApiError::Rejected(rej.status(), rej.body_text())
    }
}

fn check_chars(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::Unprocessable(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn check_history(history: &[ConversationTurn]) -> Result<(), ApiError> {
    if history.len() > MAX_HISTORY_TURNS {
        return Err(ApiError::Unprocessable(format!(
            "history must have at most {MAX_HISTORY_TURNS} entries"
        )));
    }
    for turn in history {
        check_chars("history content", &turn.content, MAX_CONTEXT_CHARS)?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub question: String,
    pub context: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

impl AskBody {
    fn validate(&self) -> Result<(), ApiError> {
        check_chars("question", &self.question, MAX_QUESTION_CHARS)?;
        check_chars("context", &self.context, MAX_CONTEXT_CHARS)?;
        check_chars("url", &self.url, MAX_URL_CHARS)?;
        check_chars("title", &self.title, MAX_TITLE_CHARS)?;
        check_history(&self.history)
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionCreateBody {
    pub context: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl SessionCreateBody {
    fn validate(&self) -> Result<(), ApiError> {
        check_chars("context", &self.context, MAX_CONTEXT_CHARS)?;
        check_chars("url", &self.url, MAX_URL_CHARS)?;
        check_chars("title", &self.title, MAX_TITLE_CHARS)
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionAskBody {
    pub session_id: String,
    pub question: String,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
}

async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskBody>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(body) = body?;
    body.validate()?;
    let page = PageContext {
        text: body.context,
        url: body.url,
        title: body.title,
    };
    let answer = state
        .relay
        .ask(&body.question, &page, &body.history, body.provider)
        .await?;
    Ok(Json(AnswerResponse { answer }))
}

async fn session_create(
    State(state): State<AppState>,
    body: Result<Json<SessionCreateBody>, JsonRejection>,
) -> Result<Json<SessionCreateResponse>, ApiError> {
    let Json(body) = body?;
    body.validate()?;
    let session_id = state.relay.create_session(PageContext {
        text: body.context,
        url: body.url,
        title: body.title,
    })?;
    Ok(Json(SessionCreateResponse { session_id }))
}

async fn session_ask(
    State(state): State<AppState>,
    body: Result<Json<SessionAskBody>, JsonRejection>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let Json(body) = body?;
    check_chars("question", &body.question, MAX_QUESTION_CHARS)?;
    let answer = state
        .relay
        .session_ask(&body.session_id, &body.question, body.provider)
        .await?;
    Ok(Json(AnswerResponse { answer }))
}

/// Local probes only; never calls a provider.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let availability = state.relay.providers().availability();
    let up = |k: ProviderKind| availability.iter().any(|(kind, ok)| *kind == k && *ok);
    let providers: Vec<&str> = availability
        .iter()
        .filter(|(_, ok)| *ok)
        .map(|(k, _)| k.as_str())
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "providers": providers,
        "codex_available": up(ProviderKind::Codex),
        "claude_available": up(ProviderKind::Claude),
        "chatgpt_available": up(ProviderKind::Chatgpt),
        "openai_available": up(ProviderKind::Openai),
    }))
}

/// Only browser-extension pages may call the relay from a browser.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin.as_bytes().starts_with(EXTENSION_ORIGIN_PREFIX)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/session/create", post(session_create))
        .route("/session/ask", post(session_ask))
        .route("/health", get(health))
        .with_state(AppState { relay })
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_status_passes_through_only_for_errors() {
        let e = |s| ApiError::from(Error::upstream(ProviderKind::Openai, s, "x")).status();
        assert_eq!(e(Some(429)), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(e(Some(502)), StatusCode::BAD_GATEWAY);
        assert_eq!(e(Some(200)), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e(Some(302)), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e(None), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn core_errors_map_to_statuses() {
        let s = |e: Error| ApiError::from(e).status();
        assert_eq!(s(Error::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(s(Error::SessionNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            s(Error::ProviderUnavailable("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(s(Error::AuthExpired("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(s(Error::InvalidCredential("x".into())), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn limits_count_chars_not_bytes() {
        assert!(check_chars("title", &"é".repeat(MAX_TITLE_CHARS), MAX_TITLE_CHARS).is_ok());
        assert!(check_chars("title", &"é".repeat(MAX_TITLE_CHARS + 1), MAX_TITLE_CHARS).is_err());
    }

    #[test]
    fn history_limits_are_enforced() {
        let turns = vec![ConversationTurn::user("q"); MAX_HISTORY_TURNS + 1];
        assert!(matches!(check_history(&turns), Err(ApiError::Unprocessable(_))));
        let turns = vec![ConversationTurn::assistant("a".repeat(MAX_CONTEXT_CHARS + 1))];
        assert!(check_history(&turns).is_err());
    }
}
