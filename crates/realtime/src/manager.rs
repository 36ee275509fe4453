//! Realtime connection manager.
//!
//! [`RealtimeManager`] owns one WebSocket to Supabase Realtime and
//! multiplexes any number of channel subscriptions over it. A background
//! task runs the connect -> join -> process -> reconnect loop and keeps
//! the socket alive with Phoenix heartbeats. Every live [`Subscription`]
//! is rejoined after a reconnect.
//!
//! Connection-level events are broadcast; call
//! [`RealtimeManager::subscribe_events`] to receive them.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::{RealtimeClient, RealtimeStream};
use crate::config::RealtimeConfig;
use crate::events::RealtimeEvent;
use crate::messages::{
    heartbeat_message, join_message, leave_message, ChangeFilter, PhoenixMessage, PostgresChange,
};
use crate::processor::{handle_text, Control};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Broadcast channel capacity for connection events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long [`RealtimeManager::shutdown`] waits for the socket task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Work queued for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Join(String),
    Leave(String),
}

struct ChannelEntry {
    filters: Vec<ChangeFilter>,
    sender: mpsc::UnboundedSender<PostgresChange>,
    join_ref: String,
}

/// State shared between the manager handle, subscriptions and the socket task.
pub(crate) struct Shared {
    channels: RwLock<HashMap<String, ChannelEntry>>,
    commands: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<RealtimeEvent>,
    access_token: Option<String>,
    next_ref: AtomicU64,
    next_topic: AtomicU64,
}

impl Shared {
    fn new(access_token: Option<String>) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Self {
            channels: RwLock::new(HashMap::new()),
            commands,
            event_tx,
            access_token,
            next_ref: AtomicU64::new(1),
            next_topic: AtomicU64::new(1),
        };
        (shared, command_rx)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> (Self, mpsc::UnboundedReceiver<Command>) {
        Self::new(None)
    }

    pub(crate) fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    pub(crate) fn emit(&self, event: RealtimeEvent) {
        let _ = self.event_tx.send(event);
    }

    pub(crate) fn subscribe_events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.event_tx.subscribe()
    }

    /// Add a channel under a fresh topic and queue its join.
    pub(crate) fn register(
        &self,
        name: &str,
        filters: Vec<ChangeFilter>,
    ) -> (String, mpsc::UnboundedReceiver<PostgresChange>) {
        let n = self.next_topic.fetch_add(1, Ordering::Relaxed);
        let topic = format!("realtime:{name}:{n}");
        let (sender, receiver) = mpsc::unbounded_channel();

        let entry = ChannelEntry {
            filters,
            sender,
            join_ref: self.next_ref(),
        };
        self.write_channels().insert(topic.clone(), entry);
        let _ = self.commands.send(Command::Join(topic.clone()));

        (topic, receiver)
    }

    /// Drop a channel and queue its leave. Returns whether it was present.
    pub(crate) fn unregister(&self, topic: &str) -> bool {
        let removed = self.write_channels().remove(topic).is_some();
        if removed {
            let _ = self.commands.send(Command::Leave(topic.to_string()));
        }
        removed
    }

    pub(crate) fn is_subscribed(&self, topic: &str) -> bool {
        self.read_channels().contains_key(topic)
    }

    #[cfg(test)]
    pub(crate) fn join_ref(&self, topic: &str) -> Option<String> {
        self.read_channels().get(topic).map(|e| e.join_ref.clone())
    }

    pub(crate) fn is_join_ref(&self, topic: &str, msg_ref: Option<&str>) -> bool {
        match (self.read_channels().get(topic), msg_ref) {
            (Some(entry), Some(r)) => entry.join_ref == r,
            _ => false,
        }
    }

    /// Build a join frame for `topic` under a new join ref.
    fn prepare_join(&self, topic: &str) -> Option<PhoenixMessage> {
        let join_ref = self.next_ref();
        let mut channels = self.write_channels();
        let entry = channels.get_mut(topic)?;
        entry.join_ref = join_ref.clone();
        Some(join_message(
            topic,
            &join_ref,
            &entry.filters,
            self.access_token.as_deref(),
        ))
    }

    fn topics(&self) -> Vec<String> {
        self.read_channels().keys().cloned().collect()
    }

    /// Forward a change to the subscription on `topic` if one of its
    /// bindings matches.
    pub(crate) fn dispatch(&self, topic: &str, change: PostgresChange) {
        let channels = self.read_channels();
        let Some(entry) = channels.get(topic) else {
            tracing::debug!(topic = %topic, "Change for unknown channel dropped");
            return;
        };
        if !entry.filters.iter().any(|f| f.matches(&change)) {
            return;
        }
        if entry.sender.send(change).is_err() {
            tracing::debug!(topic = %topic, "Subscriber gone, change dropped");
        }
    }

    // A poisoned lock only means a panic elsewhere mid-update; the map
    // itself stays usable.
    fn read_channels(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_channels(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ChannelEntry>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Shared handle to the Realtime socket.
///
/// Created once at startup via [`RealtimeManager::start`]; the returned
/// `Arc` is cloned into whoever needs subscriptions.
pub struct RealtimeManager {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RealtimeManager {
    /// Spawn the socket task. Must be called inside a Tokio runtime.
    pub fn start(config: RealtimeConfig) -> Arc<Self> {
        Self::start_with(config, ReconnectConfig::default())
    }

    pub fn start_with(config: RealtimeConfig, reconnect: ReconnectConfig) -> Arc<Self> {
        let (shared, command_rx) = Shared::new(config.access_token.clone());
        let shared = Arc::new(shared);
        let cancel = CancellationToken::new();

        let client = RealtimeClient::new(&config);
        let task_shared = Arc::clone(&shared);
        let task_cancel = cancel.clone();
        let heartbeat = config.heartbeat_interval;

        let task = tokio::spawn(async move {
            run_connection_loop(
                client,
                task_shared,
                command_rx,
                heartbeat,
                reconnect,
                task_cancel,
            )
            .await;
            tracing::info!("Realtime connection task exited");
        });

        Arc::new(Self {
            shared,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Subscribe to `postgres_changes` matching `filters`.
    ///
    /// `name` becomes part of the channel topic; each call gets its own
    /// channel even for equal names. Changes arrive on the returned
    /// receiver until the [`Subscription`] is unsubscribed or dropped.
    pub fn subscribe(
        &self,
        name: &str,
        filters: Vec<ChangeFilter>,
    ) -> (Subscription, mpsc::UnboundedReceiver<PostgresChange>) {
        let (topic, receiver) = self.shared.register(name, filters);
        tracing::debug!(topic = %topic, "Realtime subscription added");
        let subscription = Subscription {
            topic,
            shared: Arc::clone(&self.shared),
            active: AtomicBool::new(true),
        };
        (subscription, receiver)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.shared.subscribe_events()
    }

    /// Number of live subscriptions.
    pub fn channel_count(&self) -> usize {
        self.shared.read_channels().len()
    }

    /// Close the socket and wait for the task to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down Realtime manager");
        self.cancel.cancel();

        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await;
        }
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live channel. Leaves the channel on [`unsubscribe`](Self::unsubscribe)
/// or drop, whichever comes first.
pub struct Subscription {
    topic: String,
    shared: Arc<Shared>,
    active: AtomicBool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Leave the channel. Calling it more than once is a no-op.
    pub fn unsubscribe(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.shared.unregister(&self.topic);
            tracing::debug!(topic = %self.topic, "Realtime subscription removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

/// Connect -> serve -> reconnect until cancelled.
async fn run_connection_loop(
    client: RealtimeClient,
    shared: Arc<Shared>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    heartbeat: Duration,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut next = match client.connect().await {
        Ok(conn) => Some(conn),
        Err(e) => {
            tracing::warn!(error = %e, "Realtime connection failed, entering reconnect loop");
            None
        }
    };

    loop {
        let conn = match next.take() {
            Some(conn) => conn,
            None => match reconnect_loop(&client, &reconnect, &cancel).await {
                Some(conn) => conn,
                None => return,
            },
        };

        shared.emit(RealtimeEvent::Connected);
        serve_connection(conn.ws_stream, &shared, &mut command_rx, heartbeat, &cancel).await;
        shared.emit(RealtimeEvent::Disconnected);

        if cancel.is_cancelled() {
            return;
        }
        tracing::info!("Realtime connection lost, entering reconnect loop");
    }
}

/// Run one socket until it drops, misses a heartbeat, or `cancel` fires.
async fn serve_connection(
    ws_stream: RealtimeStream,
    shared: &Shared,
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
    heartbeat: Duration,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut joined: HashSet<String> = HashSet::new();

    for topic in shared.topics() {
        if let Some(join) = shared.prepare_join(&topic) {
            if sink.send(Message::Text(join.to_text())).await.is_err() {
                return;
            }
            joined.insert(topic);
        }
    }

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut pending_heartbeat: Option<String> = None;

    loop {
        let outgoing: Option<PhoenixMessage> = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match handle_text(&text, shared) {
                    Some(Control::HeartbeatAck(r)) => {
                        if pending_heartbeat.as_deref() == Some(r.as_str()) {
                            pending_heartbeat = None;
                        }
                        None
                    }
                    Some(Control::Rejoin(topic)) => {
                        joined.insert(topic.clone());
                        shared.prepare_join(&topic)
                    }
                    None => None,
                },
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Realtime socket closed by server");
                    return;
                }
                Some(Ok(_)) => None,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Realtime receive error");
                    return;
                }
                None => return,
            },

            Some(command) = command_rx.recv() => match command {
                Command::Join(topic) => {
                    if joined.insert(topic.clone()) {
                        shared.prepare_join(&topic)
                    } else {
                        None
                    }
                }
                Command::Leave(topic) => {
                    if joined.remove(&topic) {
                        Some(leave_message(&topic, &shared.next_ref()))
                    } else {
                        None
                    }
                }
            },

            _ = ticker.tick() => {
                if pending_heartbeat.is_some() {
                    tracing::warn!("Realtime heartbeat not acknowledged, reconnecting");
                    return;
                }
                let r = shared.next_ref();
                pending_heartbeat = Some(r.clone());
                Some(heartbeat_message(&r))
            }
        };

        if let Some(message) = outgoing {
            if let Err(e) = sink.send(Message::Text(message.to_text())).await {
                tracing::error!(error = %e, "Realtime send failed");
                return;
            }
        }
    }
}
