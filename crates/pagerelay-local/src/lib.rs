use std::time::Duration;

pub mod chatgpt;
pub mod claude_cli;
pub mod codex_cli;
pub mod openai_api;
pub mod registry;
pub mod session;
pub mod shellout;
pub mod sse;

pub use chatgpt::ChatgptClient;
pub use claude_cli::ClaudeCli;
pub use codex_cli::CodexCli;
pub use openai_api::OpenAiClient;
pub use registry::ProviderRegistry;
pub use reqwest;
pub use session::{Session, SessionGuard, SessionStore, DEFAULT_SESSION_TTL_S};

/// Default upstream ceiling for both HTTP calls and subprocesses.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Trimmed env var; blank is treated as missing.
pub fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Shared HTTP client for the HTTP adapters: fixed connect timeout, caller-chosen ceiling.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .user_agent(concat!("pagerelay/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) struct EnvGuard {
    k: &'static str,
    prev: Option<String>,
}

#[cfg(test)]
impl EnvGuard {
    pub(crate) fn set(k: &'static str, v: &str) -> Self {
        let prev = std::env::var(k).ok();
        std::env::set_var(k, v);
        Self { k, prev }
    }

    pub(crate) fn unset(k: &'static str) -> Self {
        let prev = std::env::var(k).ok();
        std::env::remove_var(k);
        Self { k, prev }
    }
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        if let Some(v) = self.prev.take() {
            std::env::set_var(self.k, v);
        } else {
            std::env::remove_var(self.k);
        }
    }
}
