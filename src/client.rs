//! Conversation sync and streaming client
//!
//! [`ConversationClient`] keeps a [`SessionContext`]'s message log consistent
//! with the remote turn history and drives the send, stream, and append
//! cycle for new user input. The client itself is shared state (remote
//! handles, caches, the in-flight set) and is safe to put behind an `Arc`;
//! everything that belongs to one user lives in the caller's context.

use crate::auth::{AuthClient, Authenticator};
use crate::backend::{CompletionBackend, HttpCompletionBackend};
use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{CloverError, Result};
use crate::history::{flatten_turns, placeholder_log, sort_by_recency};
use crate::models::{AgentConfig, Conversation, ConversationLog, Message};
use crate::naming::random_conversation_name;
use crate::session::SessionContext;
use crate::store::{ConversationStore, HttpConversationStore};
use chrono::Utc;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Marker appended to partial output when the user cancels a reply
pub const CANCELLED_MARKER: &str = "[cancelled]";

/// How a send ended once the user message was appended
#[derive(Debug)]
pub enum SendOutcome {
    /// The reply streamed to the end
    Completed {
        /// Full reply text
        text: String,
    },
    /// The request or the stream failed
    Failed {
        /// What went wrong
        error: CloverError,
        /// Reply text received before the failure
        partial: String,
    },
    /// The caller cancelled the reply
    Cancelled {
        /// Reply text received before cancellation
        partial: String,
    },
}

impl SendOutcome {
    /// Returns `true` for [`SendOutcome::Completed`]
    pub fn is_completed(&self) -> bool {
        matches!(self, SendOutcome::Completed { .. })
    }
}

/// Receives a reply as it streams in
///
/// `on_partial` is called once per fragment with everything received so
/// far. `on_finish` is called exactly once per accepted send, after the
/// session's log has been updated.
///
/// Any `FnMut(&str)` closure is an observer that ignores the finish call.
pub trait StreamObserver: Send {
    /// The accumulated reply after another fragment arrived
    fn on_partial(&mut self, accumulated: &str);

    /// The send is over
    fn on_finish(&mut self, _outcome: &SendOutcome) {}
}

impl<F> StreamObserver for F
where
    F: FnMut(&str) + Send,
{
    fn on_partial(&mut self, accumulated: &str) {
        self(accumulated)
    }
}

/// Tunables of a [`ConversationClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Time-to-live of cached conversation lists
    pub list_ttl: Duration,
    /// Time-to-live of cached histories
    pub history_ttl: Duration,
    /// Agent configuration for conversations created without one
    pub default_agent_config: AgentConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            list_ttl: Duration::from_secs(30),
            history_ttl: Duration::from_secs(30),
            default_agent_config: crate::config::default_agent_config(),
        }
    }
}

/// Key of a cached history: (user id, conversation id)
type HistoryKey = (String, String);

/// Conversation operations shared by every session
///
/// # Examples
///
/// ```no_run
/// use clover::client::ConversationClient;
/// use clover::config::Config;
///
/// # async fn example(config: Config) -> clover::error::Result<()> {
/// let client = ConversationClient::from_config(&config)?;
/// let mut ctx = client.sign_in("sam@example.com", "secret").await?;
/// let conversation = client.create_conversation(&mut ctx, None, None).await?;
/// let outcome = client
///     .send_message(&mut ctx, "Hello!", &mut |partial: &str| print!("\r{}", partial), None)
///     .await?;
/// assert!(outcome.is_completed() || !ctx.messages().is_empty());
/// # let _ = conversation;
/// # Ok(())
/// # }
/// ```
pub struct ConversationClient {
    store: Arc<dyn ConversationStore>,
    backend: Arc<dyn CompletionBackend>,
    auth: Arc<dyn Authenticator>,
    list_cache: TtlCache<String, Vec<Conversation>>,
    history_cache: TtlCache<HistoryKey, Vec<Message>>,
    in_flight: Mutex<HashSet<String>>,
    default_agent_config: RwLock<AgentConfig>,
}

impl std::fmt::Debug for ConversationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationClient")
            .field("list_ttl", &self.list_cache.ttl())
            .field("history_ttl", &self.history_cache.ttl())
            .finish_non_exhaustive()
    }
}

/// Removes a conversation id from the in-flight set when dropped
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    conversation_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(|p| p.into_inner());
        set.remove(&self.conversation_id);
    }
}

impl ConversationClient {
    /// Assemble a client from its remote seams
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn CompletionBackend>,
        auth: Arc<dyn Authenticator>,
        options: ClientOptions,
    ) -> Self {
        Self {
            store,
            backend,
            auth,
            list_cache: TtlCache::new(options.list_ttl),
            history_cache: TtlCache::new(options.history_ttl),
            in_flight: Mutex::new(HashSet::new()),
            default_agent_config: RwLock::new(options.default_agent_config),
        }
    }

    /// Build the HTTP-backed client described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = HttpConversationStore::new(&config.supabase)?;
        let backend = HttpCompletionBackend::new(&config.backend)?;
        let auth = AuthClient::new(&config.supabase)?;
        Ok(Self::new(
            Arc::new(store),
            Arc::new(backend),
            Arc::new(auth),
            ClientOptions {
                list_ttl: Duration::from_secs(config.cache.list_ttl_seconds),
                history_ttl: Duration::from_secs(config.cache.history_ttl_seconds),
                default_agent_config: config.agent.clone(),
            },
        ))
    }

    /// Agent configuration used for conversations created without one
    pub fn default_agent_config(&self) -> AgentConfig {
        self.default_agent_config
            .read()
            .map(|config| config.clone())
            .unwrap_or_default()
    }

    /// Replace the defaults for conversations created from now on
    ///
    /// Existing conversations keep the configuration they were created with.
    pub fn set_default_agent_config(&self, config: AgentConfig) {
        match self.default_agent_config.write() {
            Ok(mut guard) => *guard = config,
            Err(_) => tracing::warn!("Failed to acquire write lock on default agent config"),
        }
    }

    /// Sign in and start a fresh session
    ///
    /// # Errors
    ///
    /// Returns [`CloverError::Authentication`] for rejected credentials, or a
    /// network error when the auth service is unreachable
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionContext> {
        let session = self.auth.sign_in(email, password).await?;
        Ok(SessionContext::new(session))
    }

    /// End a session
    ///
    /// The user's cached data is dropped whatever the outcome; the remote
    /// invalidation result is returned so the caller can report it.
    pub async fn sign_out(&self, ctx: SessionContext) -> Result<()> {
        self.drop_user_caches(ctx.user_id());
        self.auth.sign_out(ctx.auth()).await
    }

    /// Conversations of the signed-in user, most recently updated first
    ///
    /// Served from cache while the cached list is younger than the list TTL.
    ///
    /// # Errors
    ///
    /// Returns the store's error; nothing is cached on failure
    pub async fn list_conversations(&self, ctx: &SessionContext) -> Result<Vec<Conversation>> {
        let user = ctx.user_id().to_string();
        if let Some(cached) = self.list_cache.get(&user) {
            tracing::debug!("Conversation list cache hit for {}", user);
            return Ok(cached);
        }

        tracing::debug!("Conversation list cache miss for {}", user);
        let mut conversations = self.store.list_conversations(ctx.token()).await?;
        sort_by_recency(&mut conversations);
        self.list_cache.insert(user, conversations.clone());
        Ok(conversations)
    }

    /// Like [`list_conversations`](Self::list_conversations), degrading to
    /// an empty list and handing back the error
    pub async fn list_conversations_or_empty(
        &self,
        ctx: &SessionContext,
    ) -> (Vec<Conversation>, Option<CloverError>) {
        match self.list_conversations(ctx).await {
            Ok(conversations) => (conversations, None),
            Err(e) => {
                tracing::warn!("Showing empty conversation list: {}", e);
                (Vec::new(), Some(e))
            }
        }
    }

    /// Message log of a conversation, derived from its turns
    ///
    /// # Errors
    ///
    /// Returns the store's error; see
    /// [`fetch_history_or_placeholder`](Self::fetch_history_or_placeholder)
    /// for the degraded variant
    pub async fn fetch_history(
        &self,
        ctx: &SessionContext,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let key = (ctx.user_id().to_string(), conversation_id.to_string());
        if let Some(cached) = self.history_cache.get(&key) {
            tracing::debug!("History cache hit for {}", conversation_id);
            return Ok(cached);
        }

        let turns = self.store.list_turns(ctx.token(), conversation_id).await?;
        let messages = flatten_turns(&turns);
        self.history_cache.insert(key, messages.clone());
        Ok(messages)
    }

    /// Message log of a conversation, or the placeholder greeting plus the
    /// error when it cannot be loaded
    pub async fn fetch_history_or_placeholder(
        &self,
        ctx: &SessionContext,
        conversation_id: &str,
    ) -> (Vec<Message>, Option<CloverError>) {
        match self.fetch_history(ctx, conversation_id).await {
            Ok(messages) => (messages, None),
            Err(e) => {
                tracing::warn!(
                    "Falling back to placeholder history for {}: {}",
                    conversation_id,
                    e
                );
                (placeholder_log(), Some(e))
            }
        }
    }

    /// Make `conversation` the session's selection and load its history
    ///
    /// Returns the error that forced the placeholder log, if any. When the
    /// store no longer knows the conversation the selection is cleared
    /// instead.
    pub async fn select_conversation(
        &self,
        ctx: &mut SessionContext,
        conversation: Conversation,
    ) -> Option<CloverError> {
        let (messages, error) = self.fetch_history_or_placeholder(ctx, &conversation.id).await;
        if let Some(CloverError::NotFound(id)) = &error {
            self.forget_conversation(ctx, id);
            ctx.clear_selection();
            return error;
        }
        tracing::info!("Selected conversation {}", conversation.id);
        ctx.select(conversation, messages);
        error
    }

    /// Create a conversation and select it with an empty log
    ///
    /// # Arguments
    ///
    /// * `name` - Display name; a random one is generated when `None` or blank
    /// * `agent_config` - Configuration to fix for the conversation; the
    ///   client's defaults when `None`
    ///
    /// # Errors
    ///
    /// Returns the store's error; the session is left untouched on failure
    pub async fn create_conversation(
        &self,
        ctx: &mut SessionContext,
        name: Option<String>,
        agent_config: Option<AgentConfig>,
    ) -> Result<Conversation> {
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(random_conversation_name);
        let agent_config = agent_config.unwrap_or_else(|| self.default_agent_config());

        let conversation = self
            .store
            .create_conversation(ctx.token(), &name, &agent_config)
            .await?;
        tracing::info!(
            "Created conversation {} ({})",
            conversation.name,
            conversation.id
        );

        self.list_cache.invalidate(&ctx.user_id().to_string());
        ctx.select(conversation.clone(), Vec::new());
        Ok(conversation)
    }

    /// Change a conversation's display name
    ///
    /// # Errors
    ///
    /// Returns the store's error. A [`CloverError::NotFound`] also drops the
    /// conversation from the session when it was selected.
    pub async fn rename_conversation(
        &self,
        ctx: &mut SessionContext,
        conversation_id: &str,
        new_name: &str,
    ) -> Result<Conversation> {
        let updated = match self
            .store
            .rename_conversation(ctx.token(), conversation_id, new_name)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if matches!(e, CloverError::NotFound(_)) {
                    self.forget_conversation(ctx, conversation_id);
                    if ctx.is_selected(conversation_id) {
                        ctx.clear_selection();
                    }
                }
                return Err(e);
            }
        };

        tracing::info!("Renamed conversation {} to {}", conversation_id, updated.name);
        self.list_cache.invalidate(&ctx.user_id().to_string());
        if let Some(selected) = ctx.selected_mut() {
            if selected.id == conversation_id {
                selected.name = updated.name.clone();
            }
        }
        Ok(updated)
    }

    /// Delete a conversation and its turns
    ///
    /// Confirmation is the caller's job. A conversation the store no longer
    /// knows counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns the store's error; local state is kept on failure
    pub async fn delete_conversation(
        &self,
        ctx: &mut SessionContext,
        conversation_id: &str,
    ) -> Result<()> {
        match self
            .store
            .delete_conversation(ctx.token(), conversation_id)
            .await
        {
            Ok(()) => {}
            Err(CloverError::NotFound(_)) => {
                tracing::info!("Conversation {} was already deleted", conversation_id);
            }
            Err(e) => return Err(e),
        }

        self.forget_conversation(ctx, conversation_id);
        if ctx.is_selected(conversation_id) {
            ctx.clear_selection();
        }
        Ok(())
    }

    /// Send `text` to the selected conversation and stream the reply
    ///
    /// The user message is appended before any network call and stays in
    /// the log whatever happens next. Each fragment is appended to the
    /// accumulator and the accumulated text is handed to `observer`. At the
    /// end one assistant message is appended: the full reply, or the
    /// partial reply marked incomplete followed by an error message, or the
    /// partial reply with a cancellation marker.
    ///
    /// # Errors
    ///
    /// Errors are returned only when the send is refused before anything
    /// changed: [`CloverError::NoSelection`] without a selection and
    /// [`CloverError::Busy`] while another send to the same conversation is
    /// in flight. Failures after that are reported in the [`SendOutcome`].
    ///
    /// A [`CloverError::NotFound`] from the backend arrives as
    /// [`SendOutcome::Failed`] and leaves the selection in place, so the log
    /// stays readable. Callers that see it should re-list conversations
    /// before sending again.
    pub async fn send_message(
        &self,
        ctx: &mut SessionContext,
        text: &str,
        observer: &mut dyn StreamObserver,
        cancel: Option<&CancellationToken>,
    ) -> Result<SendOutcome> {
        let conversation = ctx.selected().cloned().ok_or(CloverError::NoSelection)?;
        let _guard = self.begin_send(&conversation.id)?;

        ctx.push_message(Message::user(text));
        let cancel = cancel.cloned().unwrap_or_default();
        let outcome = self
            .stream_reply(ctx.token(), &conversation, text, observer, &cancel)
            .await;

        match &outcome {
            SendOutcome::Completed { text } => {
                ctx.push_message(Message::assistant(text.as_str()));
                if let Some(selected) = ctx.selected_mut() {
                    if selected.id == conversation.id {
                        selected.updated_at = Utc::now();
                    }
                }
                tracing::info!("Reply for {} completed", conversation.id);
            }
            SendOutcome::Failed { error, partial } => {
                if !partial.is_empty() {
                    ctx.push_message(Message::incomplete(partial.as_str()));
                }
                ctx.push_message(Message::error(format!("**Error:** {}", error)));
                tracing::error!("Reply for {} failed: {}", conversation.id, error);
            }
            SendOutcome::Cancelled { partial } => {
                let content = if partial.is_empty() {
                    CANCELLED_MARKER.to_string()
                } else {
                    format!("{}\n\n{}", partial, CANCELLED_MARKER)
                };
                ctx.push_message(Message::incomplete(content));
                tracing::info!("Reply for {} cancelled", conversation.id);
            }
        }

        // The store may hold a new (possibly partial) turn whatever the outcome
        self.list_cache.invalidate(&ctx.user_id().to_string());
        self.history_cache
            .invalidate(&(ctx.user_id().to_string(), conversation.id.clone()));

        observer.on_finish(&outcome);
        Ok(outcome)
    }

    /// Fetch a conversation's full log for export
    ///
    /// Render it with [`crate::format::render_transcript`].
    ///
    /// # Errors
    ///
    /// Returns the store's error
    pub async fn export_log(
        &self,
        ctx: &SessionContext,
        conversation_id: &str,
    ) -> Result<ConversationLog> {
        self.store.fetch_log(ctx.token(), conversation_id).await
    }

    fn begin_send(&self, conversation_id: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !set.insert(conversation_id.to_string()) {
            tracing::warn!("Rejected concurrent send to {}", conversation_id);
            return Err(CloverError::Busy(conversation_id.to_string()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            conversation_id: conversation_id.to_string(),
        })
    }

    async fn stream_reply(
        &self,
        token: &str,
        conversation: &Conversation,
        text: &str,
        observer: &mut dyn StreamObserver,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let mut accumulated = String::new();

        let request = self
            .backend
            .send_turn(token, &conversation.id, text, &conversation.agent_config);
        let mut fragments = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SendOutcome::Cancelled { partial: accumulated },
            result = request => match result {
                Ok(stream) => stream,
                Err(error) => return SendOutcome::Failed { error, partial: accumulated },
            },
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return SendOutcome::Cancelled { partial: accumulated };
                }
                next = fragments.next() => match next {
                    Some(Ok(fragment)) => {
                        accumulated.push_str(&fragment);
                        observer.on_partial(&accumulated);
                    }
                    Some(Err(error)) => {
                        return SendOutcome::Failed { error, partial: accumulated };
                    }
                    None => return SendOutcome::Completed { text: accumulated },
                },
            }
        }
    }

    /// Drop every cache entry that mentions `conversation_id`
    fn forget_conversation(&self, ctx: &SessionContext, conversation_id: &str) {
        let user = ctx.user_id().to_string();
        self.list_cache.invalidate(&user);
        self.history_cache
            .invalidate(&(user, conversation_id.to_string()));
    }

    fn drop_user_caches(&self, user_id: &str) {
        self.list_cache.invalidate(&user_id.to_string());
        self.history_cache.invalidate_where(|(user, _)| user == user_id);
    }
}
