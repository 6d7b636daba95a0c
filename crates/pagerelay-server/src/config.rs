//! Relay configuration that is not a CLI flag: per-provider models and the optional env file.

use pagerelay_core::ProviderKind;
use pagerelay_local::chatgpt::DEFAULT_CHATGPT_MODEL;
use pagerelay_local::openai_api::DEFAULT_OPENAI_MODEL;
use pagerelay_local::{env, DEFAULT_SESSION_TTL_S, DEFAULT_TIMEOUT_MS};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub default_provider: ProviderKind,
    pub session_ttl_s: u64,
    pub timeout: Duration,
    /// Model per provider; a missing entry lets the backend pick its own default.
    pub models: BTreeMap<ProviderKind, String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::default(),
            session_ttl_s: DEFAULT_SESSION_TTL_S,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            models: BTreeMap::new(),
        }
    }
}

fn model_env_key(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Codex => "PAGERELAY_CODEX_MODEL",
        ProviderKind::Claude => "PAGERELAY_CLAUDE_MODEL",
        ProviderKind::Chatgpt => "PAGERELAY_CHATGPT_MODEL",
        ProviderKind::Openai => "PAGERELAY_OPENAI_MODEL",
    }
}

/// `PAGERELAY_<KIND>_MODEL`, falling back to the HTTP backends' defaults.
pub fn models_from_env() -> BTreeMap<ProviderKind, String> {
    ProviderKind::ALL
        .into_iter()
        .filter_map(|k| {
            let fallback = match k {
                ProviderKind::Chatgpt => Some(DEFAULT_CHATGPT_MODEL),
                ProviderKind::Openai => Some(DEFAULT_OPENAI_MODEL),
                ProviderKind::Codex | ProviderKind::Claude => None,
            };
            env(model_env_key(k))
                .or_else(|| fallback.map(str::to_string))
                .map(|m| (k, m))
        })
        .collect()
}

/// Load `PAGERELAY_ENV_FILE` if set, else `./.env` unless `PAGERELAY_DOTENV=0`.
///
/// Variables already present in the process environment always win. A missing `./.env` is not
/// an error; a missing explicit file is.
pub fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    if let Some(p) = env("PAGERELAY_ENV_FILE") {
        let path = PathBuf::from(p);
        dotenvy::from_path(&path)?;
        return Ok(Some(path));
    }
    if env("PAGERELAY_DOTENV").as_deref() == Some("0") {
        return Ok(None);
    }
    // Working directory only; parents are never searched.
    let path = PathBuf::from(".env");
    match dotenvy::from_path(&path) {
        Ok(()) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
