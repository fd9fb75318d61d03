//! Socket session management
//!
//! This module owns the lifetime of the one persistent bidirectional socket
//! session per authenticated identity:
//! - Connection establishment with a bounded handshake timeout
//! - Per-topic inbox subscriptions with in-order frame delivery
//! - Fire-and-forget publishing with a boolean failure signal
//! - Connection-state observers
//!
//! There is no automatic reconnect loop here; reconnection is re-triggered
//! externally (for example on identity change).

use crate::protocol::{inbox_topic, ClientFrame, SendPayload, ServerFrame, WireMessage, SEND_DESTINATION};
use crate::{Error, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, info, warn};

/// Default bound on connection establishment
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// Session establishment in progress
    Connecting,
    /// Session established and usable
    Connected,
}

/// Callback receiving one inbound frame at a time, in arrival order
pub type FrameHandler = Arc<dyn Fn(WireMessage) + Send + Sync>;

/// Callback fired on connection-state transitions
pub type ConnectionHandler = Arc<dyn Fn() + Send + Sync>;

type SubscriptionMap = HashMap<String, FrameHandler>;

/// Handle for one inbox subscription
pub struct SubscriptionHandle {
    topic: String,
    registry: std::sync::Weak<Mutex<SubscriptionMap>>,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(
        topic: String,
        registry: std::sync::Weak<Mutex<SubscriptionMap>>,
        outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    ) -> Self {
        Self {
            topic,
            registry,
            outbound,
        }
    }

    /// Topic this subscription listens on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Release the subscription
    ///
    /// Removes the handler so no further frames are delivered, and tells the
    /// server to stop routing the topic if the session is still up.
    pub fn release(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.topic);
        }
        if let Some(outbound) = &self.outbound {
            let frame = ClientFrame::Unsubscribe {
                topic: self.topic.clone(),
            };
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = outbound.send(WsMessage::Text(json));
            }
        }
    }
}

/// Transport seam the engine is built against
///
/// [`SocketClient`] is the production implementation; tests inject mocks.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Establish the session for an identity; idempotent when connected
    async fn connect(&self, user_id: &str) -> Result<()>;

    /// Tear down the session, releasing every subscription first
    fn disconnect(&self);

    /// Current session state
    fn state(&self) -> ConnectionState;

    /// Whether the session is established
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Fire-and-forget publish; `false` when the session cannot carry it
    fn publish(&self, payload: &SendPayload) -> bool;

    /// Subscribe to an identity's inbox; `None` unless connected
    fn subscribe(&self, user_id: &str, handler: FrameHandler) -> Option<SubscriptionHandle>;

    /// Register a connection observer
    fn on_connected(&self, handler: ConnectionHandler);

    /// Register a disconnection observer
    fn on_disconnected(&self, handler: ConnectionHandler);
}

/// WebSocket implementation of the transport seam
#[derive(Clone)]
pub struct SocketClient {
    url: String,
    connect_timeout: Duration,
    state: Arc<Mutex<ConnectionState>>,
    subscriptions: Arc<Mutex<SubscriptionMap>>,
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<WsMessage>>>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    connected_handlers: Arc<Mutex<Vec<ConnectionHandler>>>,
    disconnected_handlers: Arc<Mutex<Vec<ConnectionHandler>>>,
}

impl SocketClient {
    /// Create a client for the given socket endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, CONNECT_TIMEOUT)
    }

    /// Create a client with a custom connection timeout
    pub fn with_timeout(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            outbound: Arc::new(Mutex::new(None)),
            tasks: Arc::new(Mutex::new(Vec::new())),
            connected_handlers: Arc::new(Mutex::new(Vec::new())),
            disconnected_handlers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Serialize and enqueue a frame on the writer
    fn send_frame(&self, frame: &ClientFrame) -> bool {
        let json = match serde_json::to_string(frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize outbound frame: {}", e);
                return false;
            }
        };
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(WsMessage::Text(json)).is_ok(),
            None => false,
        }
    }

    /// Release subscriptions, stop the session tasks, flip to disconnected
    ///
    /// Subscriptions are cleared before the transport goes away so a late
    /// frame can never reach a handler of a torn-down session.
    fn teardown(&self, notify: bool) {
        self.subscriptions.lock().clear();
        *self.outbound.lock() = None;
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, ConnectionState::Disconnected)
        };
        if notify && previous == ConnectionState::Connected {
            self.notify_disconnected();
        }
    }

    fn notify_connected(&self) {
        let handlers: Vec<ConnectionHandler> = self.connected_handlers.lock().clone();
        for handler in handlers {
            handler();
        }
    }

    fn notify_disconnected(&self) {
        let handlers: Vec<ConnectionHandler> = self.disconnected_handlers.lock().clone();
        for handler in handlers {
            handler();
        }
    }

    /// Called by the reader task when the server side goes away
    fn handle_stream_end(&self) {
        info!("Socket session ended");
        self.teardown(true);
    }
}

#[async_trait]
impl MessageTransport for SocketClient {
    async fn connect(&self, user_id: &str) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            debug!("Socket already connected, connect is a no-op");
            return Ok(());
        }
        // A stale half-open session is torn down before a new attempt.
        self.teardown(false);
        *self.state.lock() = ConnectionState::Connecting;

        let attempt = connect_async(self.url.clone());
        let (stream, _response) = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                *self.state.lock() = ConnectionState::Disconnected;
                self.notify_disconnected();
                return Err(Error::Socket(format!(
                    "Failed to connect to {}: {}",
                    self.url, e
                )));
            }
            Err(_) => {
                *self.state.lock() = ConnectionState::Disconnected;
                self.notify_disconnected();
                return Err(Error::Socket(format!(
                    "Connection attempt to {} timed out",
                    self.url
                )));
            }
        };

        let (mut sink, mut source) = stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        *self.outbound.lock() = Some(tx);

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    debug!("Socket writer closed");
                    break;
                }
            }
        });

        self.tasks.lock().push(writer);
        *self.state.lock() = ConnectionState::Connected;
        self.notify_connected();

        // The reader starts after the session is fully registered, so a
        // server that closes immediately tears down a consistent session.
        let subscriptions = self.subscriptions.clone();
        let client = self.clone();
        let reader = tokio::spawn(async move {
            while let Some(next) = source.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => route_frame(&subscriptions, &text),
                    Ok(WsMessage::Close(_)) => {
                        debug!("Server sent close frame");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Socket error: {}", e);
                        break;
                    }
                }
            }
            client.handle_stream_end();
        });
        self.tasks.lock().push(reader);

        info!("Socket session established for {}", user_id);
        Ok(())
    }

    fn disconnect(&self) {
        self.teardown(true);
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn publish(&self, payload: &SendPayload) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        self.send_frame(&ClientFrame::Send {
            destination: SEND_DESTINATION.to_string(),
            payload: payload.clone(),
        })
    }

    fn subscribe(&self, user_id: &str, handler: FrameHandler) -> Option<SubscriptionHandle> {
        if self.state() != ConnectionState::Connected {
            warn!("Cannot subscribe while not connected");
            return None;
        }
        let topic = inbox_topic(user_id);
        if !self.send_frame(&ClientFrame::Subscribe {
            topic: topic.clone(),
        }) {
            return None;
        }
        self.subscriptions.lock().insert(topic.clone(), handler);
        let outbound = self.outbound.lock().clone();
        Some(SubscriptionHandle::new(
            topic,
            Arc::downgrade(&self.subscriptions),
            outbound,
        ))
    }

    fn on_connected(&self, handler: ConnectionHandler) {
        self.connected_handlers.lock().push(handler);
    }

    fn on_disconnected(&self, handler: ConnectionHandler) {
        self.disconnected_handlers.lock().push(handler);
    }
}

/// Parse one inbound text frame and hand it to the owning subscription
///
/// A malformed frame is dropped with a warning; it affects neither other
/// frames nor the subscription itself.
fn route_frame(subscriptions: &Mutex<SubscriptionMap>, text: &str) {
    let frame: ServerFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping malformed inbound frame: {}", e);
            return;
        }
    };
    match frame {
        ServerFrame::Message { topic, message } => {
            let handler = subscriptions.lock().get(&topic).cloned();
            match handler {
                Some(handler) => handler(message),
                None => debug!("No subscription for topic {}", topic),
            }
        }
    }
}
