//! Sync Engine
//!
//! The single execution context that owns both registries and the active
//! view. Everything that changes them arrives on one of two queues and is
//! applied one item at a time:
//!
//! ```text
//!   SyncHandle ──► Command ──┐
//!                            ├──► SyncEngine::run ──► registries / view ──► badges
//!   channel, REST tasks ──► SyncEvent ──┘        │
//!                                                └──► spawned REST calls ──► SyncEvent
//! ```
//!
//! REST calls never block the loop. They run in spawned tasks and post
//! their results back as [`SyncEvent`]s; after teardown those results are
//! discarded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::api::{ConversationTarget, FirstMessage, InboxApi};
use crate::channel::{ChannelEvent, ChannelHandle};
use crate::config::FeedConfig;
use crate::error::SyncError;
use crate::metrics::{MetricsSnapshot, SyncMetrics};
use crate::model::{Conversation, Message, NotificationItem, WireMessage};
use crate::protocol::PushEvent;
use crate::registry::notifications;
use crate::registry::{
    ConversationEffect, ConversationRegistry, ConversationSignal, NotificationEffect,
    NotificationFeed, NotificationSignal, Route, RoutingContext,
};
use crate::unread::{self, UnreadBadge};
use crate::view::{ActiveConversationView, Append, ViewTicket};

/// User actions.
#[derive(Debug)]
pub enum Command {
    Open {
        conversation_id: String,
        respond_to: oneshot::Sender<()>,
    },
    /// Open the conversation about an article, creating it if needed.
    OpenTarget {
        target: ConversationTarget,
        respond_to: oneshot::Sender<Result<Conversation, SyncError>>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
    /// Send to the open conversation. Answered once the server confirms.
    SendMessage {
        content: String,
        respond_to: oneshot::Sender<Result<Message, SyncError>>,
    },
    /// First message about an article; the server creates the conversation.
    StartConversation {
        target: ConversationTarget,
        content: String,
        respond_to: oneshot::Sender<Result<Conversation, SyncError>>,
    },
    Refresh {
        respond_to: oneshot::Sender<()>,
    },
    MarkNotificationRead {
        id: String,
        respond_to: oneshot::Sender<()>,
    },
    MarkAllNotificationsRead {
        respond_to: oneshot::Sender<()>,
    },
    MarkAllNotificationsUnread {
        respond_to: oneshot::Sender<()>,
    },
    LoadMoreNotifications {
        respond_to: oneshot::Sender<()>,
    },
    /// Mark read, then answer with where the notification leads.
    SelectNotification {
        id: String,
        respond_to: oneshot::Sender<Option<Route>>,
    },
    GetInbox {
        respond_to: oneshot::Sender<InboxSnapshot>,
    },
}

/// Push-channel traffic and REST continuations.
#[derive(Debug)]
pub enum SyncEvent {
    Channel(ChannelEvent),
    ConversationsLoaded {
        as_of: DateTime<Utc>,
        result: Result<Vec<Conversation>, SyncError>,
    },
    NotificationsLoaded {
        as_of: DateTime<Utc>,
        result: Result<Vec<NotificationItem>, SyncError>,
    },
    HistoryLoaded {
        ticket: ViewTicket,
        conversation_id: String,
        result: Result<Vec<Message>, SyncError>,
    },
    ConversationFetched {
        conversation_id: String,
        result: Result<Conversation, SyncError>,
    },
    MessageSent {
        conversation_id: String,
        result: Result<Message, SyncError>,
        respond_to: oneshot::Sender<Result<Message, SyncError>>,
    },
    ConversationStarted {
        result: Result<FirstMessage, SyncError>,
        respond_to: oneshot::Sender<Result<Conversation, SyncError>>,
    },
    ConversationOpened {
        result: Result<Conversation, SyncError>,
        respond_to: oneshot::Sender<Result<Conversation, SyncError>>,
    },
}

/// Point-in-time view of everything the engine owns.
#[derive(Debug, Clone, Serialize)]
pub struct InboxSnapshot {
    pub conversations: Vec<Conversation>,
    pub conversation_unread: usize,
    pub open_conversation: Option<String>,
    pub timeline: Vec<Message>,
    /// The visible notification window, newest first
    pub notifications: Vec<NotificationItem>,
    pub has_more_notifications: bool,
    pub notification_unread: usize,
    /// Conversations known only from a push event so far
    pub pending_details: Vec<String>,
    /// Whether the open conversation's history page has arrived
    pub history_loaded: bool,
}

pub struct SyncEngine<A: InboxApi> {
    api: Arc<A>,
    channel: ChannelHandle,
    self_id: String,
    conversations: ConversationRegistry,
    notifications: NotificationFeed,
    view: ActiveConversationView,
    /// `conversation/message` keys already applied
    delivered: HashSet<String>,
    /// Keys seen only in a history page; the first push for one still
    /// moves its conversation up
    from_history: HashSet<String>,
    conversation_badge: UnreadBadge,
    notification_badge: UnreadBadge,
    metrics: Arc<SyncMetrics>,
    events_tx: mpsc::UnboundedSender<SyncEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    cancel: CancellationToken,
}

impl<A: InboxApi> SyncEngine<A> {
    pub fn new(
        api: Arc<A>,
        channel: ChannelHandle,
        self_id: impl Into<String>,
        feed: &FeedConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            api,
            channel,
            self_id: self_id.into(),
            conversations: ConversationRegistry::new(),
            notifications: NotificationFeed::new(feed),
            view: ActiveConversationView::new(),
            delivered: HashSet::new(),
            from_history: HashSet::new(),
            conversation_badge: UnreadBadge::new(),
            notification_badge: UnreadBadge::new(),
            metrics,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Where channel handlers should post events.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<SyncEvent> {
        self.events_tx.clone()
    }

    /// Cancelling this stops the engine and discards in-flight results.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = SyncHandle {
            commands: tx,
            conversation_unread: self.conversation_badge.subscribe(),
            notification_unread: self.notification_badge.subscribe(),
            metrics: self.metrics.clone(),
        };
        let task = tokio::spawn(self.run(rx).in_current_span());
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut events) = self.events_rx.take() else {
            return;
        };
        let cancel = self.cancel.clone();

        info!(user_id = %self.self_id, "sync engine started");
        self.refresh();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                Some(event) = events.recv() => self.handle_event(event),

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        self.conversation_badge.reset();
        self.notification_badge.reset();
        info!("sync engine stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Open {
                conversation_id,
                respond_to,
            } => {
                self.open(&conversation_id);
                let _ = respond_to.send(());
            }

            Command::OpenTarget { target, respond_to } => {
                let existing = self
                    .conversations
                    .find_by_article(&target.article_id)
                    .map(|c| c.id.clone());
                if let Some(id) = existing {
                    self.open(&id);
                    let opened = self.conversations.get(&id).cloned();
                    let _ = respond_to.send(opened.ok_or(SyncError::NoOpenConversation));
                    return;
                }
                let api = self.api.clone();
                self.spawn_continuation(async move {
                    SyncEvent::ConversationOpened {
                        result: api.open_conversation(&target).await,
                        respond_to,
                    }
                });
            }

            Command::Close { respond_to } => {
                if let Some(id) = self.view.open_id() {
                    debug!(conversation_id = %id, "closing conversation");
                }
                self.view.close();
                let _ = respond_to.send(());
            }

            Command::SendMessage {
                content,
                respond_to,
            } => {
                let Some(conversation_id) = self.view.open_id().map(str::to_string) else {
                    let _ = respond_to.send(Err(SyncError::NoOpenConversation));
                    return;
                };
                if content.trim().is_empty() {
                    let _ = respond_to.send(Err(SyncError::EmptyMessage));
                    return;
                }
                let api = self.api.clone();
                self.spawn_continuation(async move {
                    let result = api.send_message(&conversation_id, &content).await;
                    SyncEvent::MessageSent {
                        conversation_id,
                        result,
                        respond_to,
                    }
                });
            }

            Command::StartConversation {
                target,
                content,
                respond_to,
            } => {
                if content.trim().is_empty() {
                    let _ = respond_to.send(Err(SyncError::EmptyMessage));
                    return;
                }
                let api = self.api.clone();
                self.spawn_continuation(async move {
                    SyncEvent::ConversationStarted {
                        result: api.send_first_message(&target, &content).await,
                        respond_to,
                    }
                });
            }

            Command::Refresh { respond_to } => {
                self.refresh();
                let _ = respond_to.send(());
            }

            Command::MarkNotificationRead { id, respond_to } => {
                self.process_notifications(NotificationSignal::MarkRead { id, at: Utc::now() });
                let _ = respond_to.send(());
            }

            Command::MarkAllNotificationsRead { respond_to } => {
                self.process_notifications(NotificationSignal::MarkAllRead { at: Utc::now() });
                let _ = respond_to.send(());
            }

            Command::MarkAllNotificationsUnread { respond_to } => {
                self.process_notifications(NotificationSignal::MarkAllUnread { at: Utc::now() });
                let _ = respond_to.send(());
            }

            Command::LoadMoreNotifications { respond_to } => {
                self.process_notifications(NotificationSignal::LoadMore);
                let _ = respond_to.send(());
            }

            Command::SelectNotification { id, respond_to } => {
                let route = self.notifications.get(&id).and_then(notifications::route);
                self.process_notifications(NotificationSignal::MarkRead { id, at: Utc::now() });
                let _ = respond_to.send(route);
            }

            Command::GetInbox { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    /// Switch the view first so routing sees the new value, then mark read
    /// and fetch history.
    fn open(&mut self, conversation_id: &str) {
        let ticket = self.view.open(conversation_id);
        info!(conversation_id, "opening conversation");
        self.process_conversations(ConversationSignal::Opened {
            conversation_id: conversation_id.to_string(),
            at: Utc::now(),
        });

        let api = self.api.clone();
        let conversation_id = conversation_id.to_string();
        self.spawn_continuation(async move {
            let result = api.load_messages(&conversation_id).await;
            SyncEvent::HistoryLoaded {
                ticket,
                conversation_id,
                result,
            }
        });
    }

    fn refresh(&mut self) {
        let as_of = Utc::now();
        debug!("requesting snapshots");

        let api = self.api.clone();
        self.spawn_continuation(async move {
            SyncEvent::ConversationsLoaded {
                as_of,
                result: api.list_conversations().await,
            }
        });

        let api = self.api.clone();
        self.spawn_continuation(async move {
            SyncEvent::NotificationsLoaded {
                as_of,
                result: api.list_notifications().await,
            }
        });
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Channel(ChannelEvent::Connected) => {
                debug!("push channel up");
            }
            SyncEvent::Channel(ChannelEvent::Reconnected) => {
                info!("push channel reconnected, refreshing snapshots");
                self.refresh();
            }
            SyncEvent::Channel(ChannelEvent::Disconnected { reason }) => {
                debug!(reason = %reason, "push channel down");
            }
            SyncEvent::Channel(ChannelEvent::Push(push)) => self.handle_push(push),

            SyncEvent::ConversationsLoaded { as_of, result } => match result {
                Ok(conversations) => {
                    self.metrics.snapshot_merged();
                    self.process_conversations(ConversationSignal::Snapshot {
                        conversations,
                        as_of,
                    });
                }
                Err(e) => self.request_failed(&e),
            },

            SyncEvent::NotificationsLoaded { as_of, result } => match result {
                Ok(items) => {
                    self.metrics.snapshot_merged();
                    self.process_notifications(NotificationSignal::Snapshot { items, as_of });
                }
                Err(e) => self.request_failed(&e),
            },

            SyncEvent::HistoryLoaded {
                ticket,
                conversation_id,
                result,
            } => {
                if !self.view.is_current(ticket) {
                    self.metrics.stale_continuation();
                    debug!(conversation_id = %conversation_id, "dropping history for a closed view");
                    return;
                }
                match result {
                    Ok(history) => {
                        for message in &history {
                            let key = delivery_key(&message.conversation_id, &message.id);
                            if !self.delivered.contains(&key) {
                                self.from_history.insert(key);
                            }
                        }
                        debug!(conversation_id = %conversation_id, count = history.len(), "history loaded");
                        self.view.apply_history(ticket, history);
                    }
                    Err(e) => self.request_failed(&e),
                }
            }

            SyncEvent::ConversationFetched {
                conversation_id,
                result,
            } => match result {
                Ok(conversation) => {
                    self.process_conversations(ConversationSignal::Details { conversation });
                }
                Err(e) => {
                    // Entry stays a placeholder until the next snapshot
                    warn!(conversation_id = %conversation_id, error = %e, "could not fetch conversation");
                    self.metrics.request_failed();
                }
            },

            SyncEvent::MessageSent {
                conversation_id,
                result,
                respond_to,
            } => {
                if let Err(e) = &result {
                    self.request_failed(e);
                } else {
                    // The timeline waits for the channel echo
                    self.process_conversations(ConversationSignal::Sent {
                        conversation_id,
                        at: Utc::now(),
                    });
                }
                let _ = respond_to.send(result);
            }

            SyncEvent::ConversationStarted { result, respond_to } => match result {
                Ok(FirstMessage { conversation, .. }) => {
                    let mut conversation = conversation;
                    let now = Utc::now();
                    conversation.last_message_at = Some(
                        conversation
                            .last_message_at
                            .map_or(now, |last| last.max(now)),
                    );
                    let started = self.adopt(conversation, now);
                    let _ = respond_to.send(Ok(started));
                }
                Err(e) => {
                    self.request_failed(&e);
                    let _ = respond_to.send(Err(e));
                }
            },

            SyncEvent::ConversationOpened { result, respond_to } => match result {
                Ok(conversation) => {
                    let opened = self.adopt(conversation, Utc::now());
                    let _ = respond_to.send(Ok(opened));
                }
                Err(e) => {
                    self.request_failed(&e);
                    let _ = respond_to.send(Err(e));
                }
            },
        }
    }

    fn handle_push(&mut self, push: PushEvent) {
        match push {
            PushEvent::NewMessage(wire) => self.on_new_message(wire),
            PushEvent::ArticleInterest(interest) => {
                let id = interest.id.clone();
                match interest.into_notification(Utc::now()) {
                    Some(item) => self.process_notifications(NotificationSignal::Pushed(item)),
                    None => warn!(notification_id = %id, "article interest without article id, dropping"),
                }
            }
            PushEvent::Other { event } => debug!(event = %event, "ignoring push event"),
        }
    }

    fn on_new_message(&mut self, wire: WireMessage) {
        let received_at = Utc::now();
        let message_id = wire.id.clone();
        let Some(message) = wire.resolve(None, received_at) else {
            warn!(message_id = %message_id, "newMessage without a conversation, ignoring");
            return;
        };

        let key = delivery_key(&message.conversation_id, &message.id);
        if !self.delivered.insert(key.clone()) {
            self.metrics.duplicate_message();
            debug!(message_id = %message.id, "duplicate message ignored");
            return;
        }

        let conversation_id = message.conversation_id.clone();
        let sender_id = message.sender_id.clone();
        if self.from_history.remove(&key) {
            // Already on screen and counted by the snapshot; only the
            // ordering timestamp is new.
            self.view.apply_inbound(message);
            debug!(message_id = %key, "push for a message already in history");
            self.process_conversations(ConversationSignal::Sent {
                conversation_id,
                at: received_at,
            });
            return;
        }

        if self.view.apply_inbound(message) == Append::Duplicate {
            self.metrics.duplicate_message();
        }

        let before = self.conversations.state(&conversation_id);
        self.process_conversations(ConversationSignal::Inbound {
            conversation_id: conversation_id.clone(),
            sender_id,
            at: received_at,
        });
        let after = self.conversations.state(&conversation_id);
        if before != after {
            debug!(conversation_id = %conversation_id, ?before, ?after, "unread state changed");
        }
    }

    /// Register a conversation the server just created for us and open it.
    fn adopt(&mut self, conversation: Conversation, at: DateTime<Utc>) -> Conversation {
        let id = conversation.id.clone();
        self.process_conversations(ConversationSignal::Created {
            conversation: conversation.clone(),
            at,
        });
        self.open(&id);
        self.conversations.get(&id).cloned().unwrap_or(conversation)
    }

    // =========================================================================
    // Registry plumbing
    // =========================================================================

    fn process_conversations(&mut self, signal: ConversationSignal) {
        let ctx = RoutingContext {
            self_id: &self.self_id,
            open: self.view.open_id(),
        };
        let effects = self.conversations.process(signal, &ctx);
        self.conversation_badge
            .publish(unread::conversation_unread(&self.conversations));

        for effect in effects {
            match effect {
                ConversationEffect::JoinRoom(id) => {
                    if let Err(e) = self.channel.join_room(&id) {
                        debug!(conversation_id = %id, error = %e, "could not join room");
                    }
                }
                ConversationEffect::MarkRead(id) => {
                    let api = self.api.clone();
                    self.spawn_fire("mark-conversation-read", async move {
                        api.mark_conversation_read(&id).await
                    });
                }
                ConversationEffect::MarkUnread(id) => {
                    let api = self.api.clone();
                    self.spawn_fire("mark-conversation-unread", async move {
                        api.mark_conversation_unread(&id).await
                    });
                }
                ConversationEffect::FetchDetails(id) => {
                    self.metrics.conversation_materialized();
                    debug!(conversation_id = %id, "fetching details for new conversation");
                    let api = self.api.clone();
                    self.spawn_continuation(async move {
                        let result = api.get_conversation(&id).await;
                        SyncEvent::ConversationFetched {
                            conversation_id: id,
                            result,
                        }
                    });
                }
            }
        }
    }

    fn process_notifications(&mut self, signal: NotificationSignal) {
        let effects = self.notifications.process(signal);
        self.notification_badge
            .publish(unread::notification_unread(&self.notifications));

        for effect in effects {
            let api = self.api.clone();
            match effect {
                NotificationEffect::MarkRead(id) => {
                    self.spawn_fire("mark-notification-read", async move {
                        api.mark_notification_read(&id).await
                    });
                }
                NotificationEffect::MarkAllRead => {
                    self.spawn_fire("mark-all-notifications-read", async move {
                        api.mark_all_notifications_read().await
                    });
                }
                NotificationEffect::MarkAllUnread => {
                    self.spawn_fire("mark-all-notifications-unread", async move {
                        api.mark_all_notifications_unread().await
                    });
                }
            }
        }
    }

    fn snapshot(&self) -> InboxSnapshot {
        InboxSnapshot {
            conversations: self.conversations.to_vec(),
            conversation_unread: unread::conversation_unread(&self.conversations),
            open_conversation: self.view.open_id().map(str::to_string),
            timeline: self.view.timeline().to_vec(),
            notifications: self.notifications.visible().into_iter().cloned().collect(),
            has_more_notifications: self.notifications.has_more(),
            notification_unread: unread::notification_unread(&self.notifications),
            pending_details: self.conversations.pending_details(),
            history_loaded: self.view.history_loaded(),
        }
    }

    fn request_failed(&self, e: &SyncError) {
        self.metrics.request_failed();
        if e.is_transport() {
            info!(error = %e, "server unreachable, keeping local state");
        } else {
            warn!(error = %e, "request failed");
        }
    }

    // =========================================================================
    // Spawned work
    // =========================================================================

    /// Run `fut` off the loop and post its event back, unless the engine has
    /// shut down in the meantime.
    fn spawn_continuation<F>(&self, fut: F)
    where
        F: Future<Output = SyncEvent> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        let cancel = self.cancel.clone();
        let metrics = self.metrics.clone();
        let task = async move {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    metrics.stale_continuation();
                    return;
                }
                event = fut => event,
            };
            if tx.send(event).is_err() {
                metrics.stale_continuation();
                debug!("engine gone, discarding result");
            }
        };
        tokio::spawn(task.in_current_span());
    }

    /// Fire-and-forget: failures are logged and counted, never retried, and
    /// local state is left as it is.
    fn spawn_fire<F>(&self, operation: &'static str, fut: F)
    where
        F: Future<Output = Result<(), SyncError>> + Send + 'static,
    {
        let metrics = self.metrics.clone();
        let task = async move {
            if let Err(e) = fut.await {
                metrics.request_failed();
                warn!(operation, error = %e, "request failed, keeping local state");
            }
        };
        tokio::spawn(task.in_current_span());
    }
}

fn delivery_key(conversation_id: &str, message_id: &str) -> String {
    format!("{conversation_id}/{message_id}")
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    conversation_unread: watch::Receiver<usize>,
    notification_unread: watch::Receiver<usize>,
    metrics: Arc<SyncMetrics>,
}

impl SyncHandle {
    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SyncError::Closed)?;
        rx.await.map_err(|_| SyncError::Closed)
    }

    pub async fn open_conversation(&self, conversation_id: &str) -> Result<(), SyncError> {
        let conversation_id = conversation_id.to_string();
        self.call(|respond_to| Command::Open {
            conversation_id,
            respond_to,
        })
        .await
    }

    pub async fn open_target(&self, target: ConversationTarget) -> Result<Conversation, SyncError> {
        self.call(|respond_to| Command::OpenTarget { target, respond_to })
            .await?
    }

    pub async fn close_conversation(&self) -> Result<(), SyncError> {
        self.call(|respond_to| Command::Close { respond_to }).await
    }

    pub async fn send_message(&self, content: &str) -> Result<Message, SyncError> {
        let content = content.to_string();
        self.call(|respond_to| Command::SendMessage {
            content,
            respond_to,
        })
        .await?
    }

    pub async fn start_conversation(
        &self,
        target: ConversationTarget,
        content: &str,
    ) -> Result<Conversation, SyncError> {
        let content = content.to_string();
        self.call(|respond_to| Command::StartConversation {
            target,
            content,
            respond_to,
        })
        .await?
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.call(|respond_to| Command::Refresh { respond_to }).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), SyncError> {
        let id = id.to_string();
        self.call(|respond_to| Command::MarkNotificationRead { id, respond_to })
            .await
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), SyncError> {
        self.call(|respond_to| Command::MarkAllNotificationsRead { respond_to })
            .await
    }

    pub async fn mark_all_notifications_unread(&self) -> Result<(), SyncError> {
        self.call(|respond_to| Command::MarkAllNotificationsUnread { respond_to })
            .await
    }

    pub async fn load_more_notifications(&self) -> Result<(), SyncError> {
        self.call(|respond_to| Command::LoadMoreNotifications { respond_to })
            .await
    }

    pub async fn select_notification(&self, id: &str) -> Result<Option<Route>, SyncError> {
        let id = id.to_string();
        self.call(|respond_to| Command::SelectNotification { id, respond_to })
            .await
    }

    pub async fn inbox(&self) -> Result<InboxSnapshot, SyncError> {
        self.call(|respond_to| Command::GetInbox { respond_to }).await
    }

    /// Conversation badge. Always agrees with the registry as of the last
    /// applied mutation.
    pub fn conversation_unread(&self) -> watch::Receiver<usize> {
        self.conversation_unread.clone()
    }

    pub fn notification_unread(&self) -> watch::Receiver<usize> {
        self.notification_unread.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
