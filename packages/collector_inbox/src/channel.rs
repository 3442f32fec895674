//! Realtime Channel
//!
//! One push-channel connection per session. A single connection task owns
//! the socket, the set of joined rooms, and the reconnect loop; registered
//! handlers run inside that task, one at a time, in frame arrival order.
//!
//! ```text
//!  ChannelHandle::join_room ──► [commands] ──► connection task ──► socket
//!                                                   │
//!                     handlers (sequential) ◄───────┘ frames / lifecycle
//! ```
//!
//! Rooms are remembered across reconnects: every reconnection re-sends a
//! join for each room joined so far.

use futures::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{
    self,
    client::IntoClientRequest,
    handshake::client::Request,
    http::{HeaderValue, header::AUTHORIZATION},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::config::ChannelConfig;
use crate::error::SyncError;
use crate::metrics::SyncMetrics;
use crate::protocol::{OutboundCommand, PushEvent};

/// Lifecycle event names, usable with [`RealtimeChannel::on`] alongside the
/// push event names in [`crate::protocol`].
pub const CONNECTED: &str = "connect";
pub const RECONNECTED: &str = "reconnect";
pub const DISCONNECTED: &str = "disconnect";

/// Everything a handler can observe.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Reconnected,
    /// The connection dropped or could not be established. Non-fatal: the
    /// connection task keeps retrying.
    Disconnected { reason: String },
    Push(PushEvent),
}

impl ChannelEvent {
    pub fn name(&self) -> &str {
        match self {
            ChannelEvent::Connected => CONNECTED,
            ChannelEvent::Reconnected => RECONNECTED,
            ChannelEvent::Disconnected { .. } => DISCONNECTED,
            ChannelEvent::Push(push) => push.name(),
        }
    }
}

type Handler = Box<dyn FnMut(&ChannelEvent) + Send>;

#[derive(Default)]
struct Handlers {
    entries: Vec<(String, Handler)>,
}

impl Handlers {
    fn dispatch(&mut self, event: &ChannelEvent) {
        let name = event.name();
        for (_, handler) in self.entries.iter_mut().filter(|(n, _)| n == name) {
            handler(event);
        }
    }
}

type SharedHandlers = Arc<Mutex<Handlers>>;

fn lock(handlers: &SharedHandlers) -> MutexGuard<'_, Handlers> {
    handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Commands accepted by the connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    Join(String),
}

/// Cheap, cloneable sender for room joins.
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<ChannelCommand>,
}

impl ChannelHandle {
    /// Join a conversation room. Idempotent; rooms joined before the
    /// connection is up are joined as soon as it is.
    pub fn join_room(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.commands
            .send(ChannelCommand::Join(conversation_id.to_string()))
            .map_err(|_| SyncError::Closed)
    }

    /// A handle not backed by a connection; the receiver sees every command.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<ChannelCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (Self { commands }, rx)
    }
}

struct Connection {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct RealtimeChannel {
    config: ChannelConfig,
    metrics: Arc<SyncMetrics>,
    handlers: SharedHandlers,
    commands: mpsc::UnboundedSender<ChannelCommand>,
    /// Taken by the connection task on connect
    pending: Option<mpsc::UnboundedReceiver<ChannelCommand>>,
    connection: Option<Connection>,
}

impl RealtimeChannel {
    pub fn new(config: ChannelConfig, metrics: Arc<SyncMetrics>) -> Self {
        let (commands, pending) = mpsc::unbounded_channel();
        Self {
            config,
            metrics,
            handlers: Arc::new(Mutex::new(Handlers::default())),
            commands,
            pending: Some(pending),
            connection: None,
        }
    }

    /// Register a handler for an event name. Handlers for the same name run
    /// in registration order.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: FnMut(&ChannelEvent) + Send + 'static,
    {
        lock(&self.handlers)
            .entries
            .push((event.to_string(), Box::new(handler)));
    }

    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).entries.len()
    }

    /// Handle for joining rooms. Joins made before [`connect`](Self::connect)
    /// are queued and sent once the connection is up.
    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            commands: self.commands.clone(),
        }
    }

    /// Open the connection. Calling this again while connected returns the
    /// existing handle without opening a second connection.
    pub fn connect(&mut self, token: &str) -> Result<ChannelHandle, SyncError> {
        if self.connection.is_some() {
            debug!("push channel already connected");
            return Ok(self.handle());
        }

        // Fail fast on a bad URL or token rather than inside the task
        build_request(&self.config.url, token)?;

        let rx = match self.pending.take() {
            Some(rx) => rx,
            None => {
                // Previous connection was torn down; its handles stay dead
                let (tx, rx) = mpsc::unbounded_channel();
                self.commands = tx;
                rx
            }
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_connection(
            self.config.clone(),
            token.to_string(),
            self.handlers.clone(),
            self.metrics.clone(),
            rx,
            cancel.clone(),
        )
        .in_current_span());

        self.connection = Some(Connection { cancel, task });
        Ok(self.handle())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn join_room(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.handle().join_room(conversation_id)
    }

    /// Close the connection, forget joined rooms, and unregister every
    /// handler. Handles obtained before this call stop working.
    pub async fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.cancel.cancel();
            if let Err(e) = conn.task.await {
                warn!(error = %e, "push channel task ended abnormally");
            }
            info!("push channel disconnected");
        }
        // Drop any queued joins along with the receiver
        self.pending = None;
        lock(&self.handlers).entries.clear();
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(conn) = &self.connection {
            conn.cancel.cancel();
        }
    }
}

fn build_request(url: &str, token: &str) -> Result<Request, SyncError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SyncError::Config(format!("invalid realtime url {url:?}: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| SyncError::Config("session token is not a valid header value".into()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}

fn join_frame(conversation_id: &str) -> Result<tungstenite::Message, SyncError> {
    let text = OutboundCommand::JoinConversation {
        conversation_id: conversation_id.to_string(),
    }
    .encode()?;
    Ok(tungstenite::Message::Text(text.into()))
}

async fn run_connection(
    config: ChannelConfig,
    token: String,
    handlers: SharedHandlers,
    metrics: Arc<SyncMetrics>,
    mut commands: mpsc::UnboundedReceiver<ChannelCommand>,
    cancel: CancellationToken,
) {
    let mut rooms: BTreeSet<String> = BTreeSet::new();
    let mut delay = config.reconnect_initial;
    let mut connected_before = false;

    loop {
        let request = match build_request(&config.url, &token) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "push channel cannot connect");
                return;
            }
        };

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(request) => result,
        };

        let reason = match attempt {
            Err(e) => SyncError::from_tungstenite(e).to_string(),
            Ok((ws, _)) => {
                delay = config.reconnect_initial;
                let event = if connected_before {
                    metrics.reconnected();
                    info!(rooms = rooms.len(), "push channel reconnected");
                    ChannelEvent::Reconnected
                } else {
                    info!(url = %config.url, "push channel connected");
                    ChannelEvent::Connected
                };
                connected_before = true;

                let (mut write, mut read) = ws.split();

                let mut rejoin_failed = None;
                for room in &rooms {
                    let sent = match join_frame(room) {
                        Ok(frame) => write.send(frame).await.map_err(SyncError::from_tungstenite),
                        Err(e) => Err(e),
                    };
                    if let Err(e) = sent {
                        rejoin_failed = Some(e.to_string());
                        break;
                    }
                }

                lock(&handlers).dispatch(&event);

                match rejoin_failed {
                    Some(reason) => reason,
                    None => loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                let _ = write.send(tungstenite::Message::Close(None)).await;
                                return;
                            }

                            cmd = commands.recv() => match cmd {
                                Some(ChannelCommand::Join(id)) => {
                                    if !rooms.insert(id.clone()) {
                                        continue;
                                    }
                                    debug!(conversation_id = %id, "joining room");
                                    let sent = match join_frame(&id) {
                                        Ok(frame) => write.send(frame).await.map_err(SyncError::from_tungstenite),
                                        Err(e) => Err(e),
                                    };
                                    if let Err(e) = sent {
                                        break e.to_string();
                                    }
                                }
                                None => {
                                    let _ = write.send(tungstenite::Message::Close(None)).await;
                                    return;
                                }
                            },

                            frame = read.next() => match frame {
                                Some(Ok(tungstenite::Message::Text(text))) => {
                                    match PushEvent::decode(&text) {
                                        Ok(push) => {
                                            metrics.push_event();
                                            lock(&handlers).dispatch(&ChannelEvent::Push(push));
                                        }
                                        Err(e) => {
                                            metrics.malformed_frame();
                                            warn!(error = %e, "ignoring malformed push frame");
                                        }
                                    }
                                }
                                Some(Ok(tungstenite::Message::Close(_))) | None => {
                                    break "closed by server".to_string();
                                }
                                // Pings are answered by tungstenite itself
                                Some(Ok(_)) => {}
                                Some(Err(e)) => break SyncError::from_tungstenite(e).to_string(),
                            },
                        }
                    },
                }
            }
        };

        metrics.transport_error();
        warn!(reason = %reason, retry_in_ms = delay.as_millis() as u64, "push channel down");
        lock(&handlers).dispatch(&ChannelEvent::Disconnected { reason });

        if !backoff(delay, &cancel, &mut commands, &mut rooms).await {
            return;
        }
        delay = (delay * 2).min(config.reconnect_max);
    }
}

/// Sleep before the next attempt, still recording joins. Returns false if
/// the channel is shutting down.
async fn backoff(
    delay: Duration,
    cancel: &CancellationToken,
    commands: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    rooms: &mut BTreeSet<String>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                Some(ChannelCommand::Join(id)) => {
                    rooms.insert(id);
                }
                None => return false,
            },
        }
    }
}
