//! The per-turn routing pipeline.
//!
//! utterance → embed → query → decide → lookup → compose
//!
//! Embedding and the index query run on a blocking worker; the session state
//! is only touched under the session lock, and only if the turn has not been
//! superseded in the meantime. Every failure short of a misconfigured
//! catalog degrades to the default fragment.

use crate::catalog::PromptCatalog;
use crate::policy::{RoutingDecision, TopicRouter};
use crate::session::RoutingSession;
use crate::synthesizer::PromptSynthesizer;
use chrono::Utc;
use mindchat_config::{AppConfig, RoutingPolicy};
use mindchat_core::{
    CatalogError, ChatMode, ComposedPrompt, DecisionReason, EventBus, Message, RoutingCandidate,
    RoutingError, RoutingEvent, TieBreak, TopicSearch, message::last_user_utterance,
};
use mindchat_embeddings::EmbeddingProvider;
use mindchat_index::{AnchorBuilder, TopicIndex};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// A turn whose decision was applied to the session.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedTurn {
    pub turn: u64,
    pub decision: RoutingDecision,
    pub prompt: ComposedPrompt,
}

/// Result of [`CounselingRouter::route_turn`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Applied(RoutedTurn),
    /// A newer turn was issued while this one was in flight. Nothing applied.
    Superseded { turn: u64, latest: u64 },
}

impl TurnOutcome {
    pub fn applied(self) -> Option<RoutedTurn> {
        match self {
            TurnOutcome::Applied(routed) => Some(routed),
            TurnOutcome::Superseded { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<RoutedTurn, RoutingError> {
        match self {
            TurnOutcome::Applied(routed) => Ok(routed),
            TurnOutcome::Superseded { turn, latest } => Err(RoutingError::Superseded { turn, latest }),
        }
    }
}

/// Owns the shared routing components; one instance serves every session.
pub struct CounselingRouter {
    provider: Arc<EmbeddingProvider>,
    index: Arc<dyn TopicSearch>,
    catalog: Arc<PromptCatalog>,
    router: TopicRouter,
    synthesizer: PromptSynthesizer,
    recent_messages: usize,
    events: Arc<EventBus>,
    disabled_logged: AtomicBool,
}

impl CounselingRouter {
    pub fn new(
        provider: Arc<EmbeddingProvider>,
        index: Arc<dyn TopicSearch>,
        catalog: Arc<PromptCatalog>,
        policy: RoutingPolicy,
        synthesizer: PromptSynthesizer,
    ) -> Self {
        Self {
            provider,
            index,
            catalog,
            router: TopicRouter::new(policy),
            synthesizer,
            recent_messages: mindchat_config::DEFAULT_RECENT_MESSAGES,
            events: Arc::new(EventBus::default()),
            disabled_logged: AtomicBool::new(false),
        }
    }

    /// Wire everything from configuration. Fails only on a bad catalog.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<EmbeddingProvider>,
    ) -> Result<Self, CatalogError> {
        let catalog = PromptCatalog::from_config(config)?;
        let policy = config.routing.policy();
        let anchors_path = config.anchors_path();
        let index = build_topic_index(&catalog, &provider, Some(&anchors_path), policy.tie_break);
        let synthesizer = PromptSynthesizer::new(
            config.persona.base_prompt.clone(),
            config.prompt.max_length(),
        );

        Ok(Self::new(provider, Arc::new(index), Arc::new(catalog), policy, synthesizer)
            .with_recent_messages(config.prompt.recent_messages()))
    }

    /// [`CounselingRouter::from_config`] on a blocking worker. Building the
    /// index embeds every catalog exemplar, which must stay off the async
    /// runtime's threads.
    pub async fn load(
        config: &AppConfig,
        provider: Arc<EmbeddingProvider>,
    ) -> Result<Self, RoutingError> {
        let config = config.clone();
        let router = tokio::task::spawn_blocking(move || Self::from_config(&config, provider))
            .await
            .map_err(|e| RoutingError::Unavailable(format!("index builder failed: {e}")))??;
        Ok(router)
    }

    /// Publish routing events on an existing bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    /// Size of the message window handed to the synthesizer.
    pub fn with_recent_messages(mut self, recent_messages: usize) -> Self {
        self.recent_messages = recent_messages;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    pub fn index(&self) -> &dyn TopicSearch {
        self.index.as_ref()
    }

    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    pub fn policy(&self) -> &RoutingPolicy {
        self.router.policy()
    }

    pub fn new_session(&self, mode: ChatMode) -> RoutingSession {
        RoutingSession::new(mode)
    }

    /// Change a session's mode under the configured stickiness policy.
    pub async fn switch_mode(&self, session: &RoutingSession, mode: ChatMode) {
        session
            .set_mode(mode, self.router.policy().reset_on_mode_switch)
            .await;
    }

    /// Route one turn and compose its system prompt.
    ///
    /// `recent` is the conversation in chronological order, ending with the
    /// user message being answered. The routed utterance is the last user
    /// message in all of `recent`; only the prompt's transcript is limited to
    /// the configured window.
    pub async fn route_turn(&self, session: &RoutingSession, recent: &[Message]) -> TurnOutcome {
        let turn = session.begin_turn();
        let mode = session.mode().await;
        let window = &recent[recent.len().saturating_sub(self.recent_messages)..];

        let candidates = match mode {
            ChatMode::PlainChat => None,
            ChatMode::Counseling => Some(self.candidates_for(recent).await),
        };

        let mut inner = session.lock().await;
        let latest = session.latest_turn();
        if latest != turn {
            debug!(session = %session.id(), turn, latest, "Discarding superseded routing result");
            return TurnOutcome::Superseded { turn, latest };
        }
        let decision = match candidates {
            None => RoutingDecision::no_topic(DecisionReason::ModeInactive),
            Some(Ok(candidates)) => self.router.decide(&mut inner.state, &candidates),
            Some(Err(reason)) => self.router.fail_open(&mut inner.state, reason),
        };
        drop(inner);

        let prompt = match mode {
            ChatMode::PlainChat => self.synthesizer.compose(None, window),
            ChatMode::Counseling => {
                let fragment = self.catalog.lookup(decision.topic_id.as_deref());
                self.synthesizer.compose(Some(fragment), window)
            }
        };

        if decision.reason == DecisionReason::Switched {
            info!(
                session = %session.id(),
                turn,
                topic = decision.topic_id.as_deref(),
                similarity = decision.similarity,
                "Counseling topic selected"
            );
        } else {
            debug!(
                session = %session.id(),
                turn,
                topic = decision.topic_id.as_deref(),
                similarity = decision.similarity,
                reason = decision.reason.as_str(),
                truncated = prompt.truncated,
                "Routing decision"
            );
        }

        self.events.publish(RoutingEvent {
            session_id: session.id().to_string(),
            turn,
            topic_id: decision.topic_id.clone(),
            similarity: decision.similarity,
            reason: decision.reason,
            truncated: prompt.truncated,
            timestamp: Utc::now(),
        });

        TurnOutcome::Applied(RoutedTurn {
            turn,
            decision,
            prompt,
        })
    }

    /// Candidates for the latest user utterance, restricted to catalog topics.
    async fn candidates_for(
        &self,
        recent: &[Message],
    ) -> Result<Vec<RoutingCandidate>, DecisionReason> {
        let Some(utterance) = last_user_utterance(recent) else {
            return Ok(Vec::new());
        };

        if let EmbeddingProvider::Unavailable { reason } = self.provider.as_ref() {
            if !self.disabled_logged.swap(true, Ordering::Relaxed) {
                warn!(reason = %reason, "Topic routing disabled");
            }
            return Err(DecisionReason::Disabled);
        }

        let provider = Arc::clone(&self.provider);
        let index = Arc::clone(&self.index);
        let text = utterance.to_string();
        let k = self.router.policy().top_k;

        let result = tokio::task::spawn_blocking(move || {
            let embedding = provider.embed(&text)?;
            if embedding.empty_input {
                return Ok(Vec::new());
            }
            index.query(&embedding.vector, k)
        })
        .await
        .unwrap_or_else(|e| Err(RoutingError::Unavailable(format!("routing worker failed: {e}"))));

        match result {
            Ok(candidates) => Ok(candidates
                .into_iter()
                .filter(|c| self.catalog.contains(&c.topic_id))
                .collect()),
            Err(e) => {
                warn!(error = %e, "Topic query failed, using default prompt");
                Err(DecisionReason::Disabled)
            }
        }
    }
}

/// Build the topic index for `catalog`: persisted anchors when they still
/// match, freshly computed ones otherwise. Degrades to an empty index.
pub fn build_topic_index(
    catalog: &PromptCatalog,
    provider: &EmbeddingProvider,
    anchors_path: Option<&Path>,
    tie_break: TieBreak,
) -> TopicIndex {
    if !provider.is_available() {
        return TopicIndex::empty();
    }

    let anchors = match AnchorBuilder::new(provider).load_or_build(&catalog.exemplars(), anchors_path)
    {
        Ok(anchors) => anchors,
        Err(e) => {
            warn!(error = %e, "Could not compute topic anchors, routing without topics");
            return TopicIndex::empty();
        }
    };
    let anchors = anchors
        .into_iter()
        .filter(|a| catalog.contains(&a.topic_id))
        .collect();

    TopicIndex::new(anchors, tie_break).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid topic anchors, routing without topics");
        TopicIndex::empty()
    })
}
