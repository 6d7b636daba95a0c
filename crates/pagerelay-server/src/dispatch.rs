use crate::config::RelayConfig;
use pagerelay_core::{
    build_user_message, truncate, AskProvider, ConversationTurn, Error, PageContext, ProviderKind,
    Result, MAX_CONTEXT_CHARS, SYSTEM_INSTRUCTION,
};
use pagerelay_local::{ProviderRegistry, SessionStore};
use std::sync::Arc;
use std::time::Instant;

/// Validates asks, builds prompts, routes them to a provider, and keeps session history.
pub struct Relay {
    providers: ProviderRegistry,
    sessions: SessionStore,
    config: RelayConfig,
}

impl Relay {
    pub fn new(providers: ProviderRegistry, config: RelayConfig) -> Self {
        Self {
            providers,
            sessions: SessionStore::new(config.session_ttl_s),
            config,
        }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.config.default_provider
    }

    fn select(&self, requested: Option<ProviderKind>) -> Result<(ProviderKind, Arc<dyn AskProvider>)> {
        let kind = requested.unwrap_or(self.config.default_provider);
        Ok((kind, self.providers.get(kind)?))
    }

    fn model_for(&self, kind: ProviderKind) -> Option<&str> {
        self.config.models.get(&kind).map(String::as_str)
    }

    async fn send(
        &self,
        kind: ProviderKind,
        provider: &dyn AskProvider,
        user_message: &str,
        history: &[ConversationTurn],
    ) -> Result<String> {
        let t0 = Instant::now();
        let out = provider
            .send(SYSTEM_INSTRUCTION, user_message, history, self.model_for(kind))
            .await;
        let elapsed_ms = t0.elapsed().as_millis() as u64;
        match &out {
            Ok(answer) => tracing::info!(
                provider = %kind,
                history_turns = history.len(),
                answer_chars = answer.chars().count(),
                elapsed_ms,
                "ask completed"
            ),
            Err(e) => tracing::warn!(
                provider = %kind,
                error_kind = e.kind(),
                elapsed_ms,
                "ask failed"
            ),
        }
        out
    }

    /// Stateless ask: the caller supplies page text and any prior turns.
    pub async fn ask(
        &self,
        question: &str,
        page: &PageContext,
        history: &[ConversationTurn],
        provider: Option<ProviderKind>,
    ) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question cannot be empty".to_string()));
        }
        if page.text.trim().is_empty() {
            return Err(Error::InvalidInput("Context cannot be empty".to_string()));
        }
        let context = truncate(&page.text, MAX_CONTEXT_CHARS);
        tracing::debug!(
            question_chars = question.chars().count(),
            context_chars = page.text.chars().count(),
            truncated = context.len() != page.text.len(),
            "stateless ask"
        );
        let user_message = build_user_message(question, &context, &page.url, &page.title);
        let (kind, p) = self.select(provider)?;
        self.send(kind, p.as_ref(), &user_message, history).await
    }

    /// Store the (truncated) page and return a new session id.
    pub fn create_session(&self, page: PageContext) -> Result<String> {
        if page.text.trim().is_empty() {
            return Err(Error::InvalidInput("Context cannot be empty".to_string()));
        }
        let page = PageContext {
            text: truncate(&page.text, MAX_CONTEXT_CHARS),
            ..page
        };
        let context_chars = page.text.chars().count();
        let id = self.sessions.create(page);
        tracing::info!(session_id = %id, context_chars, "session created");
        Ok(id)
    }

    /// Ask against a stored session. History grows by one user and one assistant turn, and only
    /// when the provider succeeds. Asks on one session run one at a time.
    pub async fn session_ask(
        &self,
        session_id: &str,
        question: &str,
        provider: Option<ProviderKind>,
    ) -> Result<String> {
        let mut session = self.sessions.lock(session_id).await?;
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question cannot be empty".to_string()));
        }
        let user_message = build_user_message(
            question,
            &session.context.text,
            &session.context.url,
            &session.context.title,
        );
        let (kind, p) = self.select(provider)?;
        tracing::debug!(
            session_id,
            question_chars = question.chars().count(),
            history_turns = session.history.len(),
            "session ask"
        );
        let answer = self
            .send(kind, p.as_ref(), &user_message, &session.history)
            .await?;
        session.append_turns(
            ConversationTurn::user(question),
            ConversationTurn::assistant(answer.clone()),
        );
        Ok(answer)
    }
}
