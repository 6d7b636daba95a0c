//! ChatGPT subscription backend, authenticated with the credential file written by `codex login`.
//!
//! The credential file is read on every call and nothing is cached, so a fresh `codex login`
//! takes effect without restarting the relay. The account id falls back to the access token's
//! JWT claims; the token is decoded without signature verification because it was issued to a
//! trusted local CLI and is only forwarded back to its issuer.

use crate::sse::{text_deltas, SseError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures_util::StreamExt;
use pagerelay_core::{
    answer_or_placeholder, responses_input, AskProvider, ConversationTurn, Error, ProviderKind,
    Result,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const DEFAULT_CHATGPT_ENDPOINT: &str = "https://chatgpt.com/backend-api/codex/responses";
pub const DEFAULT_CHATGPT_MODEL: &str = "gpt-5";

const AUTH_CLAIM: &str = "https://api.openai.com/auth";

/// `PAGERELAY_CODEX_AUTH_FILE`, else `$CODEX_HOME/auth.json`, else `~/.codex/auth.json`.
pub fn auth_file_from_env() -> Option<PathBuf> {
    if let Some(p) = crate::env("PAGERELAY_CODEX_AUTH_FILE") {
        return Some(PathBuf::from(p));
    }
    if let Some(home) = crate::env("CODEX_HOME") {
        return Some(PathBuf::from(home).join("auth.json"));
    }
    dirs::home_dir().map(|h| h.join(".codex").join("auth.json"))
}

#[derive(Deserialize)]
struct AuthFile {
    #[serde(default)]
    tokens: Option<AuthTokens>,
}

#[derive(Deserialize)]
struct AuthTokens {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub account_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("account_id", &"<redacted>")
            .finish()
    }
}

/// Parse the auth file contents. `None` on any structural problem.
pub fn parse_credentials(raw: &str) -> Option<Credentials> {
    let file: AuthFile = serde_json::from_str(raw).ok()?;
    let tokens = file.tokens?;
    let access_token = tokens
        .access_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())?;
    let account_id = tokens
        .account_id
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .or_else(|| account_id_from_jwt(&access_token))?;
    Some(Credentials {
        access_token,
        account_id,
    })
}

/// Read `["https://api.openai.com/auth"]["chatgpt_account_id"]` from an unverified JWT payload.
pub fn account_id_from_jwt(jwt: &str) -> Option<String> {
    let payload_b64 = jwt.split('.').nth(1)?;
    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&payload).ok()?;
    claims
        .get(AUTH_CLAIM)
        .and_then(|auth| auth.get("chatgpt_account_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn unavailable() -> Error {
    Error::ProviderUnavailable(
        "ChatGPT credentials not found. Run `codex login` to sign in with your ChatGPT account."
            .to_string(),
    )
}

#[derive(Debug, Clone)]
pub struct ChatgptClient {
    client: reqwest::Client,
    auth_file: Option<PathBuf>,
    endpoint: String,
}

impl ChatgptClient {
    pub fn new(client: reqwest::Client, auth_file: Option<PathBuf>, endpoint: String) -> Self {
        Self {
            client,
            auth_file,
            endpoint,
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        let endpoint = crate::env("PAGERELAY_CHATGPT_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_CHATGPT_ENDPOINT.to_string());
        Self::new(client, auth_file_from_env(), endpoint)
    }

    pub fn auth_file(&self) -> Option<&Path> {
        self.auth_file.as_deref()
    }

    fn load_credentials(&self) -> Result<Credentials> {
        let path = self.auth_file.as_deref().ok_or_else(unavailable)?;
        let raw = std::fs::read_to_string(path).map_err(|_| unavailable())?;
        parse_credentials(&raw).ok_or_else(unavailable)
    }

    fn transport_error(e: reqwest::Error) -> Error {
        if e.is_timeout() {
            return Error::upstream(ProviderKind::Chatgpt, None, "request timed out");
        }
        Error::upstream(ProviderKind::Chatgpt, None, e.to_string())
    }
}

#[async_trait::async_trait]
impl AskProvider for ChatgptClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Chatgpt
    }

    fn is_available(&self) -> bool {
        self.load_credentials().is_ok()
    }

    async fn send(
        &self,
        system: &str,
        user_message: &str,
        history: &[ConversationTurn],
        model: Option<&str>,
    ) -> Result<String> {
        let creds = self.load_credentials()?;
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_CHATGPT_MODEL);
        let input = responses_input(user_message, history);
        let body = json!({
            "model": model,
            "instructions": system,
            "input": input,
            "stream": true,
            "store": false,
        });

        let t0 = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", creds.access_token),
            )
            .header("chatgpt-account-id", &creds.account_id)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header("OpenAI-Beta", "responses=experimental")
            .header("originator", "codex_cli_rs")
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::AuthExpired(
                "ChatGPT session expired. Re-authenticate with `codex login`.".to_string(),
            ));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                ProviderKind::Chatgpt,
                Some(status.as_u16()),
                text,
            ));
        }

        let mut deltas = Box::pin(text_deltas(Box::pin(resp.bytes_stream())));
        let mut answer = String::new();
        while let Some(item) = deltas.next().await {
            match item {
                Ok(t) => answer.push_str(&t),
                Err(SseError::Failed(m)) => {
                    return Err(Error::upstream(ProviderKind::Chatgpt, None, m))
                }
                Err(SseError::Transport(m)) => {
                    return Err(Error::upstream(ProviderKind::Chatgpt, None, m))
                }
            }
        }
        tracing::debug!(
            provider = "chatgpt",
            model,
            input_items = input.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "stream finished"
        );
        Ok(answer_or_placeholder(&answer))
    }
}
