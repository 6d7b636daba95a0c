use pagerelay_core::{
    answer_or_placeholder, chat_messages, AskProvider, ChatMessage, ConversationTurn, Error,
    ProviderKind, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

fn openai_api_key_from_env() -> Option<String> {
    crate::env("PAGERELAY_OPENAI_API_KEY").or_else(|| crate::env("OPENAI_API_KEY"))
}

/// OpenAI Chat Completions with a static API key. The key is re-read from the environment on
/// every call.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        // Override for testing/debugging (do not include secrets here).
        let endpoint = crate::env("PAGERELAY_OPENAI_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string());
        Self::new(client, endpoint)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl AskProvider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    fn is_available(&self) -> bool {
        openai_api_key_from_env().is_some()
    }

    async fn send(
        &self,
        system: &str,
        user_message: &str,
        history: &[ConversationTurn],
        model: Option<&str>,
    ) -> Result<String> {
        let api_key = openai_api_key_from_env().ok_or_else(|| {
            Error::ProviderUnavailable(
                "OpenAI API key not configured. Set PAGERELAY_OPENAI_API_KEY (or OPENAI_API_KEY)."
                    .to_string(),
            )
        })?;
        let req = ChatCompletionsRequest {
            model: model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_OPENAI_MODEL),
            messages: chat_messages(system, user_message, history),
        };

        let t0 = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {api_key}"))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                let body = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                Error::upstream(ProviderKind::Openai, None, body)
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredential(
                "OpenAI rejected the API key. Check PAGERELAY_OPENAI_API_KEY (or OPENAI_API_KEY)."
                    .to_string(),
            ));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(
                ProviderKind::Openai,
                Some(status.as_u16()),
                text,
            ));
        }

        let parsed: ChatCompletionsResponse = resp
            .json()
            .await
            .map_err(|e| Error::upstream(ProviderKind::Openai, None, e.to_string()))?;
        tracing::debug!(
            provider = "openai",
            model = req.model,
            messages = req.messages.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "chat.completions finished"
        );
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(answer_or_placeholder(&content))
    }
}
