//! Request handling for debate turns.
//!
//! [`DebateService`] validates an incoming message, opens a conversation when
//! none is given, runs the debate core against the stored history and
//! persists the resulting turn.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::config::DebateSettings;
use crate::debate::{window, DebateContext, ProviderHandle};
use crate::error::{DebateError, DebateResult};
use crate::metrics::{MetricsCollector, TurnKind};
use crate::storage::{Conversation, Database, StoredMessage};

/// An incoming user message.
#[derive(Debug, Clone, Default)]
pub struct DebateRequest {
    /// Existing conversation to continue; `None` opens a new one.
    pub conversation_id: Option<Uuid>,
    pub user_message: String,
    /// Messages to echo back; defaults to the configured `max_messages`.
    pub max_messages: Option<usize>,
}

impl DebateRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Self::default()
        }
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }
}

/// Result of a handled turn.
#[derive(Debug, Clone, Serialize)]
pub struct DebateTurn {
    pub conversation_id: Uuid,
    pub topic: String,
    pub bot_stance: String,
    pub user_message: String,
    pub bot_response: String,
    /// Most recent messages, oldest first, including this turn.
    pub messages: Vec<StoredMessage>,
}

/// Read-only view of a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct DebateSnapshot {
    pub conversation_id: Uuid,
    pub topic: String,
    pub bot_stance: String,
    pub is_active: bool,
    /// Latest user message, or empty when there is none.
    pub user_message: String,
    /// First messages of the conversation, oldest first.
    pub messages: Vec<StoredMessage>,
}

/// Handles debate turns against a provider and a conversation store.
///
/// Turns for the same conversation are serialized so that history reads and
/// the two message writes of one turn never interleave with another turn's.
pub struct DebateService {
    provider: Arc<ProviderHandle>,
    store: Database,
    settings: DebateSettings,
    turn_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    metrics: MetricsCollector,
}

impl std::fmt::Debug for DebateService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebateService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DebateService {
    pub fn new(provider: Arc<ProviderHandle>, store: Database) -> Self {
        let settings = provider.config().debate.clone();
        Self {
            provider,
            store,
            settings,
            turn_locks: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn store(&self) -> &Database {
        &self.store
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    /// Handles one user message, opening a conversation if needed.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty message, before anything else happens
    /// - `ConversationNotFound` for an unknown or inactive conversation
    /// - `Provider` when the provider cannot be built or generation fails
    /// - `Storage` on database failures
    pub async fn post_message(&self, request: DebateRequest) -> DebateResult<DebateTurn> {
        let user_message = request.user_message.trim();
        if user_message.is_empty() {
            return Err(DebateError::InvalidRequest(
                "user_message must not be empty".to_string(),
            ));
        }

        let kind = if request.conversation_id.is_some() {
            TurnKind::Continuation
        } else {
            TurnKind::Opening
        };

        let result = self
            .handle_turn(request.conversation_id, user_message, request.max_messages)
            .await;
        self.metrics.record_turn(kind, result.is_ok());

        if let Err(err) = &result {
            tracing::error!(kind = kind.as_str(), error = %err, "Debate turn failed");
        }
        result
    }

    async fn handle_turn(
        &self,
        conversation_id: Option<Uuid>,
        user_message: &str,
        max_messages: Option<usize>,
    ) -> DebateResult<DebateTurn> {
        let conversation = match conversation_id {
            Some(id) => self.active_conversation(id).await?,
            None => self.open_conversation(user_message).await?,
        };

        let claim = TurnClaim::new(self, conversation.id);
        let _turn = claim.lock.lock().await;
        self.run_turn(&conversation, user_message, max_messages)
            .await
    }

    async fn run_turn(
        &self,
        conversation: &Conversation,
        user_message: &str,
        max_messages: Option<usize>,
    ) -> DebateResult<DebateTurn> {
        let provider = self.provider.get()?;

        let stored = self
            .store
            .recent_messages(conversation.id, self.settings.history_window)
            .await?;
        let context = DebateContext::new(
            conversation.topic.as_str(),
            conversation.bot_stance.as_str(),
            user_message,
        )
        .with_history(window(&stored, self.settings.history_window));

        let bot_response = provider.generate_response(&context).await?;

        self.store
            .append_turn(conversation.id, user_message, &bot_response)
            .await?;

        let messages = self
            .store
            .recent_messages(
                conversation.id,
                max_messages.unwrap_or(self.settings.max_messages),
            )
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            history_len = context.conversation_history.len(),
            response_chars = bot_response.chars().count(),
            "Debate turn completed"
        );

        Ok(DebateTurn {
            conversation_id: conversation.id,
            topic: conversation.topic.clone(),
            bot_stance: conversation.bot_stance.clone(),
            user_message: user_message.to_string(),
            bot_response,
            messages,
        })
    }

    async fn active_conversation(&self, id: Uuid) -> DebateResult<Conversation> {
        match self.store.get_conversation(id).await? {
            Some(conversation) if conversation.is_active => Ok(conversation),
            _ => Err(DebateError::ConversationNotFound(id)),
        }
    }

    async fn open_conversation(&self, user_message: &str) -> DebateResult<Conversation> {
        let provider = self.provider.get()?;

        let extraction = match provider.extract_topic_and_stance(user_message).await {
            Ok(extraction) => extraction,
            Err(err) => {
                self.metrics.record_extraction("error");
                return Err(err.into());
            }
        };
        self.metrics.record_extraction(extraction.outcome());

        let pair = extraction.into_topic_stance();
        let conversation = self
            .store
            .create_conversation(&pair.topic, &pair.stance)
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            topic = %conversation.topic,
            "Opened conversation"
        );
        Ok(conversation)
    }

    /// Reads a conversation with its first `max_messages` messages.
    pub async fn get_debate(
        &self,
        conversation_id: Uuid,
        max_messages: Option<usize>,
    ) -> DebateResult<DebateSnapshot> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(DebateError::ConversationNotFound(conversation_id))?;

        let user_message = self
            .store
            .last_user_message(conversation_id)
            .await?
            .unwrap_or_default();
        let messages = self
            .store
            .list_messages(
                conversation_id,
                Some(max_messages.unwrap_or(self.settings.max_messages)),
            )
            .await?;

        Ok(DebateSnapshot {
            conversation_id,
            topic: conversation.topic,
            bot_stance: conversation.bot_stance,
            is_active: conversation.is_active,
            user_message,
            messages,
        })
    }

    fn turn_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.turn_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(id).or_default())
    }
}

/// One turn's hold on a conversation lock.
///
/// Dropping the claim forgets the map entry when no other turn holds one.
/// This also runs when the turn future is dropped mid-await.
struct TurnClaim<'a> {
    service: &'a DebateService,
    id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> TurnClaim<'a> {
    fn new(service: &'a DebateService, id: Uuid) -> Self {
        Self {
            service,
            id,
            lock: service.turn_lock(id),
        }
    }
}

impl Drop for TurnClaim<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .service
            .turn_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        // Claims clone under the map lock, so a count of 2 is the map plus us
        let unclaimed = locks
            .get(&self.id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if unclaimed {
            locks.remove(&self.id);
        }
    }
}

/// Parses a conversation id supplied by a caller.
pub fn parse_conversation_id(raw: &str) -> DebateResult<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DebateError::InvalidConversationId(
            "UUID required".to_string(),
        ));
    }
    Uuid::parse_str(raw).map_err(|_| DebateError::InvalidConversationId("Invalid UUID".to_string()))
}
