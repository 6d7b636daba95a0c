use crate::shellout;
use pagerelay_core::{
    answer_or_placeholder, build_cli_prompt, AskProvider, ConversationTurn, Error, ProviderKind,
    Result,
};
use std::time::{Duration, Instant};
use tokio::process::Command;

const NOT_FOUND: &str =
    "Claude CLI not found. Install Claude Code and ensure 'claude' is on PATH.";

/// `claude -p <prompt>`; stdout is the answer.
///
/// The prompt travels as a single argv entry, so it is bounded by the OS argument limit.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    bin: String,
    timeout: Duration,
}

impl ClaudeCli {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    /// `PAGERELAY_CLAUDE_BIN` (default `claude`).
    pub fn from_env(timeout: Duration) -> Self {
        Self::new(
            crate::env("PAGERELAY_CLAUDE_BIN").unwrap_or_else(|| "claude".to_string()),
            timeout,
        )
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }
}

#[async_trait::async_trait]
impl AskProvider for ClaudeCli {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn is_available(&self) -> bool {
        shellout::has(&self.bin)
    }

    async fn send(
        &self,
        system: &str,
        user_message: &str,
        history: &[ConversationTurn],
        model: Option<&str>,
    ) -> Result<String> {
        if !self.is_available() {
            return Err(Error::ProviderUnavailable(NOT_FOUND.to_string()));
        }
        let prompt = build_cli_prompt(system, user_message, history);

        let mut cmd = Command::new(&self.bin);
        cmd.arg("-p").arg(&prompt);
        if let Some(m) = model.map(str::trim).filter(|m| !m.is_empty()) {
            cmd.arg("--model").arg(m);
        }

        let t0 = Instant::now();
        let out = shellout::run(cmd, None, self.timeout)
            .await
            .map_err(|e| {
                shellout::classify(e, ProviderKind::Claude, self.timeout, NOT_FOUND)
            })?;
        tracing::debug!(
            provider = "claude",
            exit_code = ?out.code,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "cli finished"
        );

        if !out.success {
            return Err(Error::upstream(ProviderKind::Claude, None, out.error_text()));
        }
        Ok(answer_or_placeholder(&out.stdout))
    }
}
