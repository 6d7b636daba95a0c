use crate::shellout;
use pagerelay_core::{
    answer_or_placeholder, build_cli_prompt, AskProvider, ConversationTurn, Error, ProviderKind,
    Result,
};
use std::time::{Duration, Instant};
use tokio::process::Command;

const NOT_FOUND: &str = "Codex CLI not found. Install Codex and ensure 'codex' is on PATH.";

/// `codex exec` in non-interactive mode. The flattened prompt goes in on stdin and the final
/// message comes back through `--output-last-message`.
#[derive(Debug, Clone)]
pub struct CodexCli {
    bin: String,
    timeout: Duration,
}

impl CodexCli {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    /// `PAGERELAY_CODEX_BIN` (default `codex`).
    pub fn from_env(timeout: Duration) -> Self {
        Self::new(
            crate::env("PAGERELAY_CODEX_BIN").unwrap_or_else(|| "codex".to_string()),
            timeout,
        )
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    fn command(&self, model: Option<&str>, last_message: &std::path::Path) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("exec").arg("--skip-git-repo-check");
        if let Some(m) = model.map(str::trim).filter(|m| !m.is_empty()) {
            cmd.arg("-m").arg(m);
        }
        cmd.arg("--output-last-message").arg(last_message).arg("-");
        cmd
    }
}

#[async_trait::async_trait]
impl AskProvider for CodexCli {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Codex
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

        // Removed on drop, whichever way this function exits.
        let last_message = tempfile::Builder::new()
            .prefix("codex-last-message-")
            .tempfile()
            .map_err(|e| Error::upstream(ProviderKind::Codex, None, e.to_string()))?
            .into_temp_path();

        let t0 = Instant::now();
        let out = shellout::run(
            self.command(model, &last_message),
            Some(prompt.as_bytes()),
            self.timeout,
        )
        .await
        .map_err(|e| shellout::classify(e, ProviderKind::Codex, self.timeout, NOT_FOUND))?;
        tracing::debug!(
            provider = "codex",
            exit_code = ?out.code,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "cli finished"
        );

        if !out.success {
            return Err(Error::upstream(ProviderKind::Codex, None, out.error_text()));
        }

        let written = tokio::fs::read_to_string(&last_message)
            .await
            .unwrap_or_default();
        if !written.trim().is_empty() {
            return Ok(written.trim().to_string());
        }
        Ok(answer_or_placeholder(&out.stdout))
    }
}
