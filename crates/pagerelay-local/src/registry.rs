use crate::{ChatgptClient, ClaudeCli, CodexCli, OpenAiClient};
use pagerelay_core::{AskProvider, Error, ProviderKind, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Provider adapters keyed by [`ProviderKind`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderKind, Arc<dyn AskProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own kind, replacing any previous one. Returns `self` for
    /// chaining.
    pub fn register<P: AskProvider + 'static>(self, provider: P) -> Self {
        self.register_arc(Arc::new(provider))
    }

    pub fn register_arc(mut self, provider: Arc<dyn AskProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Every adapter, configured from the environment.
    pub fn from_env(timeout: Duration) -> Result<Self> {
        let client = crate::http_client(timeout).map_err(|e| {
            Error::ProviderUnavailable(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self::new()
            .register(CodexCli::from_env(timeout))
            .register(ClaudeCli::from_env(timeout))
            .register(ChatgptClient::from_env(client.clone()))
            .register(OpenAiClient::from_env(client)))
    }

    /// Look up a provider. An unregistered kind is reported like a missing backend.
    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn AskProvider>> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            Error::ProviderUnavailable(format!("{} provider is not configured", kind.label()))
        })
    }

    /// Availability of every known kind, in [`ProviderKind::ALL`] order. Probes are local only.
    pub fn availability(&self) -> Vec<(ProviderKind, bool)> {
        ProviderKind::ALL
            .into_iter()
            .map(|k| {
                let up = self.providers.get(&k).is_some_and(|p| p.is_available());
                (k, up)
            })
            .collect()
    }

    pub fn available(&self) -> Vec<ProviderKind> {
        self.availability()
            .into_iter()
            .filter_map(|(k, up)| up.then_some(k))
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
