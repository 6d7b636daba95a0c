use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod prompt;
pub mod truncate;

pub use prompt::{
    build_cli_prompt, build_user_message, chat_messages, responses_input, ChatMessage, InputContent,
    InputItem, SYSTEM_INSTRUCTION, UNTRUSTED_BEGIN, UNTRUSTED_END,
};
pub use truncate::{truncate, ELLIPSIS};

/// Cap on page text (and on each history entry) accepted at the boundary and forwarded upstream.
pub const MAX_CONTEXT_CHARS: usize = 50_000;
pub const MAX_QUESTION_CHARS: usize = 2_000;
pub const MAX_URL_CHARS: usize = 2_000;
pub const MAX_TITLE_CHARS: usize = 500;
pub const MAX_HISTORY_TURNS: usize = 50;

/// Answer returned when a backend succeeds but produces no text.
pub const NO_RESPONSE: &str = "No response generated.";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Session not found or expired")]
    SessionNotFound,
    #[error("{0}")]
    ProviderUnavailable(String),
    #[error("{0}")]
    AuthExpired(String),
    #[error("{0}")]
    InvalidCredential(String),
    #[error("{label} error: {body}", label = .provider.label())]
    Upstream {
        provider: ProviderKind,
        /// HTTP status for HTTP backends; `None` for subprocess failures and transport errors.
        status: Option<u16>,
        body: String,
    },
}

impl Error {
    pub fn upstream(provider: ProviderKind, status: Option<u16>, body: impl Into<String>) -> Self {
        let body = body.into();
        let body = if body.trim().is_empty() {
            "unknown error".to_string()
        } else {
            body.trim().to_string()
        };
        Error::Upstream {
            provider,
            status,
            body,
        }
    }

    /// Stable, secret-free name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::SessionNotFound => "session_not_found",
            Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::AuthExpired(_) => "auth_expired",
            Error::InvalidCredential(_) => "invalid_credential",
            Error::Upstream { .. } => "upstream_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Untrusted page material. `url` and `title` are metadata only; empty means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub text: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `codex exec` subprocess, prompt on stdin.
    #[default]
    Codex,
    /// `claude -p` subprocess, prompt as an argument.
    Claude,
    /// ChatGPT subscription via the Codex OAuth credential file (streaming HTTP).
    Chatgpt,
    /// OpenAI API key (non-streaming HTTP).
    Openai,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Codex,
        ProviderKind::Claude,
        ProviderKind::Chatgpt,
        ProviderKind::Openai,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Codex => "codex",
            ProviderKind::Claude => "claude",
            ProviderKind::Chatgpt => "chatgpt",
            ProviderKind::Openai => "openai",
        }
    }

    /// Human-facing name used in error details.
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Codex => "Codex CLI",
            ProviderKind::Claude => "Claude CLI",
            ProviderKind::Chatgpt => "ChatGPT",
            ProviderKind::Openai => "OpenAI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown provider: {s} (allowed: codex, claude, chatgpt, openai)"
                ))
            })
    }
}

/// A backend that turns a system instruction plus a user message (and prior turns) into answer text.
///
/// Implementations read credentials fresh on every call and hold no per-call mutable state.
#[async_trait::async_trait]
pub trait AskProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Cheap local probe (PATH lookup, credential presence). Never calls the backend.
    fn is_available(&self) -> bool;

    async fn send(
        &self,
        system: &str,
        user_message: &str,
        history: &[ConversationTurn],
        model: Option<&str>,
    ) -> Result<String>;
}

/// Trim an answer and substitute the placeholder when nothing is left.
pub fn answer_or_placeholder(s: &str) -> String {
    let s = s.trim();
    if s.is_empty() {
        NO_RESPONSE.to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!(" Claude ".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::Openai);
        assert!(matches!(
            "gemini".parse::<ProviderKind>(),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(ProviderKind::default(), ProviderKind::Codex);
    }

    #[test]
    fn provider_kind_serde_uses_wire_names() {
        let v = serde_json::to_value(ProviderKind::Chatgpt).unwrap();
        assert_eq!(v, serde_json::json!("chatgpt"));
        let k: ProviderKind = serde_json::from_value(serde_json::json!("codex")).unwrap();
        assert_eq!(k, ProviderKind::Codex);
    }

    #[test]
    fn role_rejects_unknown_values() {
        let bad = serde_json::from_value::<ConversationTurn>(
            serde_json::json!({ "role": "system", "content": "x" }),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn upstream_error_formats_label_and_defaults_empty_body() {
        let e = Error::upstream(ProviderKind::Codex, None, "  \n");
        assert_eq!(e.to_string(), "Codex CLI error: unknown error");
        let e = Error::upstream(ProviderKind::Openai, Some(500), "boom\n");
        assert_eq!(e.to_string(), "OpenAI error: boom");
        assert_eq!(e.kind(), "upstream_error");
    }

    #[test]
    fn empty_answers_become_placeholder() {
        assert_eq!(answer_or_placeholder(" \n\t"), NO_RESPONSE);
        assert_eq!(answer_or_placeholder(" Blue.\n"), "Blue.");
    }
}
