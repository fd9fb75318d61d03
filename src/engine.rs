//! High-level messaging engine
//!
//! This module wires the socket session, the REST collaborators, the local
//! cache, and the state container into the public actions the UI layer
//! invokes. The engine is an explicitly constructed service object: every
//! collaborator is injected, and its lifetime is tied to the active identity
//! rather than the process.
//!
//! # Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use triptalk::auth::{StaticAuth, UserProfile};
//! use triptalk::engine::{ChatEngine, EngineConfig};
//! use triptalk::rest::RestApi;
//! use triptalk::socket::SocketClient;
//! use triptalk::storage::CacheStore;
//!
//! # async fn example() -> triptalk::Result<()> {
//! let auth = Arc::new(StaticAuth::new(UserProfile::bare("u1")).with_token("secret"));
//! let transport = Arc::new(SocketClient::new("wss://chat.example.com/ws"));
//! let api = Arc::new(RestApi::new("https://api.example.com", auth.clone())?);
//! let cache = Arc::new(CacheStore::open("triptalk_cache.db")?);
//! let engine = ChatEngine::new(transport, api, auth, cache, EngineConfig::default());
//!
//! engine.connect().await?;
//! engine.open_chat_with("u2").await?;
//! engine.send_message("u2", "hi").await?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{AuthContext, UserProfile};
use crate::protocol::{SendPayload, WireMessage};
use crate::rest::ChatApi;
use crate::socket::{ConnectionState, FrameHandler, MessageTransport, SubscriptionHandle};
use crate::storage::cache::{CacheStore, CONVERSATIONS_TTL_MS, DIRECTORY_TTL_MS};
use crate::storage::conversation::ConversationPreview;
use crate::storage::message::Message;
use crate::storage::state::ChatState;
use crate::storage::thread::{DedupPolicy, InsertOutcome};
use crate::{Error, Result};
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// History page size
    pub page_size: u32,
    /// Near-duplicate detection policy
    pub dedup: DedupPolicy,
    /// Delay before the post-send conversation-list reconciliation
    pub refresh_delay_ms: u64,
    /// Freshness window for the directory snapshot
    pub directory_ttl_ms: i64,
    /// Freshness window for the conversation-preview snapshot
    pub conversations_ttl_ms: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            dedup: DedupPolicy::default(),
            refresh_delay_ms: 500,
            directory_ttl_ms: DIRECTORY_TTL_MS,
            conversations_ttl_ms: CONVERSATIONS_TTL_MS,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The messaging core's service object
pub struct ChatEngine {
    transport: Arc<dyn MessageTransport>,
    api: Arc<dyn ChatApi>,
    auth: Arc<dyn AuthContext>,
    cache: Arc<CacheStore>,
    state: Arc<Mutex<ChatState>>,
    config: EngineConfig,
    subscription: SyncMutex<Option<SubscriptionHandle>>,
    pump: SyncMutex<Option<JoinHandle<()>>>,
}

impl ChatEngine {
    /// Create an engine from its injected collaborators
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        api: Arc<dyn ChatApi>,
        auth: Arc<dyn AuthContext>,
        cache: Arc<CacheStore>,
        config: EngineConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(ChatState::new()));

        // Keep the connection flag in the state container current. The
        // callbacks fire from runtime contexts (connect calls, the socket
        // reader task); outside a runtime they degrade to a no-op.
        let connected_state = state.clone();
        transport.on_connected(Arc::new(move || {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let state = connected_state.clone();
                handle.spawn(async move {
                    state.lock().await.connection = ConnectionState::Connected;
                });
            }
        }));
        let disconnected_state = state.clone();
        transport.on_disconnected(Arc::new(move || {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let state = disconnected_state.clone();
                handle.spawn(async move {
                    state.lock().await.connection = ConnectionState::Disconnected;
                });
            }
        }));

        Self {
            transport,
            api,
            auth,
            cache,
            state,
            config,
            subscription: SyncMutex::new(None),
            pump: SyncMutex::new(None),
        }
    }

    fn require_user(&self) -> Result<UserProfile> {
        self.auth
            .current_user()
            .ok_or_else(|| Error::Auth("no authenticated user".to_string()))
    }

    /// A point-in-time copy of the state for the UI layer
    pub async fn snapshot(&self) -> ChatState {
        let mut snapshot = self.state.lock().await.clone();
        snapshot.connection = self.transport.state();
        snapshot
    }

    /// Establish the socket session and subscribe the current user's inbox
    ///
    /// Inbound frames are applied to the state one at a time, in arrival
    /// order, through a single pump task; each frame is a discrete mutation.
    pub async fn connect(&self) -> Result<()> {
        let me = self.require_user()?;
        self.transport.connect(&me.id).await?;
        self.state.lock().await.connection = ConnectionState::Connected;

        let (tx, mut rx) = mpsc::unbounded_channel::<WireMessage>();
        let auth = self.auth.clone();
        let state = self.state.clone();
        let cache = self.cache.clone();
        let policy = self.config.dedup;
        let pump = tokio::spawn(async move {
            while let Some(wire) = rx.recv().await {
                apply_inbound(auth.as_ref(), &state, &cache, policy, wire).await;
            }
        });
        let handler: FrameHandler = Arc::new(move |wire| {
            let _ = tx.send(wire);
        });

        let subscription = self.transport.subscribe(&me.id, handler).ok_or_else(|| {
            Error::Socket("inbox subscription rejected: session not connected".to_string())
        })?;
        if let Some(previous) = self.subscription.lock().replace(subscription) {
            previous.release();
        }
        if let Some(previous) = self.pump.lock().replace(pump) {
            previous.abort();
        }
        info!("Messaging session ready for {}", me.id);
        Ok(())
    }

    /// Tear down the socket session
    pub async fn disconnect(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.release();
        }
        self.transport.disconnect();
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.state.lock().await.connection = ConnectionState::Disconnected;
    }

    /// Send a message to a counterpart
    ///
    /// Optimistic-insert first, socket transport when available, REST
    /// fallback otherwise. A failed fallback marks the optimistic message
    /// in place; it is never silently dropped or automatically retried.
    pub async fn send_message(&self, counterpart_id: &str, content: &str) -> Result<()> {
        let me = self.require_user()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(Error::Invalid("message content is empty".to_string()));
        }
        let counterpart = self.resolve_counterpart(counterpart_id).await?;

        let pending = Message::outgoing(&me.id, counterpart_id, trimmed);
        let payload = SendPayload {
            sender_id: me.id.clone(),
            receiver_id: counterpart_id.to_string(),
            content: trimmed.to_string(),
        };

        let now = now_ms();
        {
            let mut st = self.state.lock().await;
            if let Some(active) = st.active.as_mut() {
                if active.is_with(counterpart_id) {
                    active.thread.insert(pending.clone(), self.config.dedup);
                }
            }
            let mut preview = ConversationPreview::from_message(counterpart.clone(), &pending);
            preview.unread = false;
            st.conversations.upsert(preview);
        }
        self.persist_conversations(now).await;

        if self.transport.is_connected() && self.transport.publish(&payload) {
            debug!("Message to {} dispatched over socket", counterpart_id);
            self.schedule_refresh();
            return Ok(());
        }

        debug!("Socket unavailable, sending to {} over REST", counterpart_id);
        match self.api.send_message(&payload).await {
            Ok(wire) => {
                let now = now_ms();
                if let Some(confirmed) = wire.normalize(&me.id) {
                    let mut st = self.state.lock().await;
                    if let Some(active) = st.active.as_mut() {
                        if active.is_with(counterpart_id)
                            && !active.thread.replace(&pending.id, confirmed.clone())
                        {
                            active.thread.insert(confirmed.clone(), self.config.dedup);
                        }
                    }
                    let mut preview =
                        ConversationPreview::from_message(counterpart.clone(), &confirmed);
                    preview.unread = false;
                    st.conversations.upsert(preview);
                }
                self.persist_conversations(now).await;
                self.schedule_refresh();
                Ok(())
            }
            Err(e) => {
                warn!("Fallback send to {} failed: {}", counterpart_id, e);
                let mut st = self.state.lock().await;
                if let Some(active) = st.active.as_mut() {
                    if let Some(slot) = active.thread.get_mut(&pending.id) {
                        slot.mark_failed();
                    }
                }
                Ok(())
            }
        }
    }

    /// Open a conversation, parking any different active one first
    ///
    /// Activation always resets the pagination cursor and the
    /// history-exhausted flag, clears the unread indicator, and fetches the
    /// first history page.
    pub async fn open_chat_with(&self, counterpart_id: &str) -> Result<()> {
        self.require_user()?;
        let counterpart = self.resolve_counterpart(counterpart_id).await?;
        let now = now_ms();
        {
            let mut st = self.state.lock().await;
            if let Some(active) = &st.active {
                if !active.is_with(counterpart_id) {
                    if active.thread.is_empty() {
                        st.active = None;
                    } else {
                        st.park_active(now);
                    }
                }
            }
            st.bubbles.remove(counterpart_id);
            st.activate(counterpart);
        }
        self.persist_session(now).await;
        self.persist_conversations(now).await;
        self.load_more_messages().await
    }

    /// Park the active conversation into the bubble set
    pub async fn minimize_active(&self) -> Result<()> {
        let now = now_ms();
        let parked = { self.state.lock().await.park_active(now) };
        if let Some(counterpart_id) = parked {
            debug!("Minimized conversation with {}", counterpart_id);
            self.persist_session(now).await;
        }
        Ok(())
    }

    /// Pop a minimized conversation back to active
    ///
    /// Bubbles persist no message bodies, so restoring triggers a fresh
    /// page-0 history fetch.
    pub async fn restore_bubble(&self, counterpart_id: &str) -> Result<()> {
        {
            let st = self.state.lock().await;
            if !st.bubbles.contains(counterpart_id) {
                return Err(Error::Invalid(format!(
                    "no minimized conversation for {}",
                    counterpart_id
                )));
            }
        }
        self.open_chat_with(counterpart_id).await
    }

    /// Remove a conversation from the minimized set
    ///
    /// Message history is untouched; only the visible bubble goes away.
    pub async fn close_bubble(&self, counterpart_id: &str) -> Result<()> {
        let now = now_ms();
        let removed = {
            self.state
                .lock()
                .await
                .bubbles
                .remove(counterpart_id)
                .is_some()
        };
        if removed {
            self.persist_session(now).await;
        }
        Ok(())
    }

    /// Fetch the next (older) history page for the active conversation
    ///
    /// No-op when a load is in flight, no conversation is active, or a prior
    /// page came back empty.
    pub async fn load_more_messages(&self) -> Result<()> {
        let me = self.require_user()?;
        let (counterpart_id, page) = {
            let mut st = self.state.lock().await;
            let Some(active) = st.active.as_mut() else {
                return Ok(());
            };
            if active.loading_history || active.history_exhausted {
                return Ok(());
            }
            active.loading_history = true;
            (active.counterpart.id.clone(), active.page)
        };

        let result = self
            .api
            .fetch_history(&me.id, &counterpart_id, page, self.config.page_size)
            .await;

        let mut st = self.state.lock().await;
        let Some(active) = st.active.as_mut() else {
            return Ok(());
        };
        if !active.is_with(&counterpart_id) {
            // conversation switched while the page was in flight
            return Ok(());
        }
        active.loading_history = false;
        match result {
            Ok(wires) => {
                if wires.is_empty() {
                    active.history_exhausted = true;
                    debug!("History exhausted for {}", counterpart_id);
                } else {
                    let older: Vec<Message> =
                        wires.iter().filter_map(|w| w.normalize(&me.id)).collect();
                    active.page += 1;
                    let merged = active.thread.prepend_history(older, self.config.dedup);
                    debug!("Merged {} older messages for {}", merged, counterpart_id);
                }
                st.error = None;
            }
            Err(e) => {
                warn!("History fetch for {} failed: {}", counterpart_id, e);
                st.error = Some(format!("history fetch failed: {}", e));
            }
        }
        Ok(())
    }

    /// Reconcile the conversation list: cache paint, then server replace
    pub async fn refresh_conversations(&self) -> Result<()> {
        self.require_user()?;
        refresh_conversations_with(
            self.api.as_ref(),
            self.auth.as_ref(),
            &self.state,
            &self.cache,
            self.config.conversations_ttl_ms,
        )
        .await;
        Ok(())
    }

    /// The counterpart directory, excluding the current user
    ///
    /// Served from cache inside its freshness window; otherwise fetched (with
    /// retries) and re-cached. A failed fetch falls back to the stale
    /// last-known-good snapshot, else an empty list, never an error.
    pub async fn load_directory(&self) -> Result<Vec<UserProfile>> {
        let me = self.require_user()?;
        let now = now_ms();
        if let Ok(Some(entry)) = self.cache.get_directory().await {
            if entry.is_fresh(self.config.directory_ttl_ms, now) {
                debug!("Serving directory from fresh cache");
                return Ok(exclude_self(entry.value, &me.id));
            }
        }
        match self.api.fetch_directory().await {
            Ok(wires) => {
                let profiles: Vec<UserProfile> =
                    wires.iter().filter_map(|w| w.normalize()).collect();
                if let Err(e) = self.cache.put_directory(&profiles, now_ms()).await {
                    warn!("Failed to persist directory snapshot: {}", e);
                }
                Ok(exclude_self(profiles, &me.id))
            }
            Err(e) => {
                warn!("Directory fetch failed, falling back to cache: {}", e);
                self.state.lock().await.error = Some(format!("directory fetch failed: {}", e));
                match self.cache.get_directory().await {
                    Ok(Some(entry)) => Ok(exclude_self(entry.value, &me.id)),
                    _ => Ok(Vec::new()),
                }
            }
        }
    }

    /// Restore persisted session shape after a reload
    ///
    /// Bubbles are restored unconditionally (metadata only), conversation
    /// previews paint when fresh, and a persisted active-conversation pointer
    /// re-opens that conversation.
    pub async fn hydrate(&self) -> Result<()> {
        self.require_user()?;
        let now = now_ms();
        if let Ok(Some(entry)) = self.cache.get_bubbles().await {
            self.state.lock().await.bubbles = entry.value;
        }
        if let Ok(Some(entry)) = self.cache.get_conversations().await {
            if entry.is_fresh(self.config.conversations_ttl_ms, now) {
                let mut st = self.state.lock().await;
                if st.conversations.is_empty() {
                    st.conversations.replace_all(entry.value);
                }
            }
        }
        let restored = match self.cache.get_active_conversation().await {
            Ok(Some(entry)) => Some(entry.value),
            _ => None,
        };
        if let Some(counterpart_id) = restored {
            if let Err(e) = self.open_chat_with(&counterpart_id).await {
                warn!(
                    "Could not restore active conversation {}: {}",
                    counterpart_id, e
                );
            }
        }
        Ok(())
    }

    /// Record whether the conversation list is visible
    ///
    /// Opening the list clears the global unread indicator.
    pub async fn set_list_open(&self, open: bool) {
        let mut st = self.state.lock().await;
        st.list_open = open;
        if open {
            st.has_unread = false;
        }
    }

    /// Record whether the active chat view is visible
    pub async fn set_chat_open(&self, open: bool) {
        let mut st = self.state.lock().await;
        st.chat_open = open;
        if open {
            if let Some(counterpart_id) = st.active.as_ref().map(|a| a.counterpart.id.clone()) {
                st.conversations.mark_read(&counterpart_id);
            }
        }
    }

    /// Resolve a counterpart profile: local state, cached directory, then a
    /// live directory fetch as the last resort
    async fn resolve_counterpart(&self, counterpart_id: &str) -> Result<UserProfile> {
        if counterpart_id.trim().is_empty() {
            return Err(Error::Invalid("counterpart identity is empty".to_string()));
        }
        let known = { self.state.lock().await.known_profile(counterpart_id) };
        if let Some(profile) = known {
            return Ok(profile);
        }
        // A stale directory snapshot is still a usable profile hint.
        if let Ok(Some(entry)) = self.cache.get_directory().await {
            if let Some(profile) = entry.value.into_iter().find(|p| p.id == counterpart_id) {
                return Ok(profile);
            }
        }
        match self.api.fetch_directory().await {
            Ok(wires) => {
                let profiles: Vec<UserProfile> =
                    wires.iter().filter_map(|w| w.normalize()).collect();
                if let Err(e) = self.cache.put_directory(&profiles, now_ms()).await {
                    warn!("Failed to persist directory snapshot: {}", e);
                }
                profiles
                    .into_iter()
                    .find(|p| p.id == counterpart_id)
                    .ok_or_else(|| {
                        Error::Invalid(format!("unknown counterpart {}", counterpart_id))
                    })
            }
            Err(e) => {
                warn!("Directory fetch during resolution failed: {}", e);
                Err(Error::Invalid(format!(
                    "unknown counterpart {}",
                    counterpart_id
                )))
            }
        }
    }

    /// Persist the conversation-preview snapshot with a fresh write timestamp
    async fn persist_conversations(&self, now: i64) {
        let snapshot = { self.state.lock().await.conversations.list().to_vec() };
        if let Err(e) = self.cache.put_conversations(&snapshot, now).await {
            warn!("Failed to persist conversation previews: {}", e);
        }
    }

    /// Persist the bubble metadata and the active-conversation pointer
    async fn persist_session(&self, now: i64) {
        let (bubbles, active_id) = {
            let st = self.state.lock().await;
            (
                st.bubbles.clone(),
                st.active.as_ref().map(|a| a.counterpart.id.clone()),
            )
        };
        if let Err(e) = self.cache.put_bubbles(&bubbles, now).await {
            warn!("Failed to persist bubble set: {}", e);
        }
        if let Err(e) = self
            .cache
            .put_active_conversation(active_id.as_deref(), now)
            .await
        {
            warn!("Failed to persist active-conversation pointer: {}", e);
        }
    }

    /// Schedule the deferred post-send conversation-list reconciliation
    fn schedule_refresh(&self) {
        let api = self.api.clone();
        let auth = self.auth.clone();
        let state = self.state.clone();
        let cache = self.cache.clone();
        let delay = self.config.refresh_delay_ms;
        let ttl = self.config.conversations_ttl_ms;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            refresh_conversations_with(api.as_ref(), auth.as_ref(), &state, &cache, ttl).await;
        });
    }
}

/// Apply one inbound frame to the state
///
/// The current user is re-derived at frame time; an unusable frame is
/// dropped with a warning and affects nothing else.
async fn apply_inbound(
    auth: &dyn AuthContext,
    state: &Mutex<ChatState>,
    cache: &CacheStore,
    policy: DedupPolicy,
    wire: WireMessage,
) {
    let Some(me) = auth.current_user() else {
        warn!("Dropping inbound frame: no authenticated user");
        return;
    };
    let Some(message) = wire.normalize(&me.id) else {
        warn!("Dropping unusable inbound frame");
        return;
    };
    let now = now_ms();
    let snapshot = {
        let mut st = state.lock().await;
        if message.is_own {
            apply_own_echo(&mut st, message, policy);
        } else {
            apply_incoming(&mut st, message, policy);
        }
        st.conversations.list().to_vec()
    };
    if let Err(e) = cache.put_conversations(&snapshot, now).await {
        warn!("Failed to persist conversation previews: {}", e);
    }
}

/// The server echoed one of our own sends: reconcile the optimistic entry
fn apply_own_echo(st: &mut ChatState, message: Message, policy: DedupPolicy) {
    let counterpart_id = message.receiver_id.clone();
    if let Some(active) = st.active.as_mut() {
        if active.is_with(&counterpart_id) {
            match active.thread.find_pending_match(&message, policy) {
                Some(pending_id) => {
                    active.thread.replace(&pending_id, message.clone());
                }
                None => {
                    // echo without a local pending entry (e.g. after reload)
                    active.thread.insert(message.clone(), policy);
                }
            }
        }
    }
    let profile = st
        .known_profile(&counterpart_id)
        .unwrap_or_else(|| UserProfile::bare(&counterpart_id));
    let mut preview = ConversationPreview::from_message(profile, &message);
    preview.unread = false;
    st.conversations.upsert(preview);
}

/// A counterpart's message arrived: insert and decide the unread flip
fn apply_incoming(st: &mut ChatState, message: Message, policy: DedupPolicy) {
    let counterpart_id = message.sender_id.clone();
    let viewing = st.viewing(&counterpart_id);
    let mut accepted = true;
    if let Some(active) = st.active.as_mut() {
        if active.is_with(&counterpart_id) {
            accepted = active.thread.insert(message.clone(), policy) == InsertOutcome::Inserted;
        }
    }
    if !accepted {
        debug!("Duplicate inbound message from {} rejected", counterpart_id);
        return;
    }
    if !viewing && !st.list_open {
        st.has_unread = true;
    }
    let profile = st
        .known_profile(&counterpart_id)
        .unwrap_or_else(|| UserProfile::bare(&counterpart_id));
    let mut preview = ConversationPreview::from_message(profile, &message);
    preview.unread = !viewing;
    st.conversations.upsert(preview);
}

/// Conversation-list reconciliation: cache-first paint, server replace
async fn refresh_conversations_with(
    api: &dyn ChatApi,
    auth: &dyn AuthContext,
    state: &Mutex<ChatState>,
    cache: &CacheStore,
    ttl_ms: i64,
) {
    let Some(me) = auth.current_user() else {
        return;
    };
    let now = now_ms();
    if let Ok(Some(entry)) = cache.get_conversations().await {
        if entry.is_fresh(ttl_ms, now) {
            let mut st = state.lock().await;
            if st.conversations.is_empty() {
                st.conversations.replace_all(entry.value);
            }
        }
    }
    match api.fetch_conversations(&me.id).await {
        Ok(wires) => {
            let entries: Vec<ConversationPreview> =
                wires.iter().filter_map(|w| w.normalize(&me.id)).collect();
            let now = now_ms();
            let snapshot = {
                let mut st = state.lock().await;
                st.conversations.replace_all(entries);
                st.error = None;
                st.conversations.list().to_vec()
            };
            if let Err(e) = cache.put_conversations(&snapshot, now).await {
                warn!("Failed to persist conversation previews: {}", e);
            }
        }
        Err(e) => {
            warn!(
                "Conversation list fetch failed, keeping last known good: {}",
                e
            );
            state.lock().await.error = Some(format!("conversation refresh failed: {}", e));
        }
    }
}

fn exclude_self(profiles: Vec<UserProfile>, me: &str) -> Vec<UserProfile> {
    profiles.into_iter().filter(|p| p.id != me).collect()
}
