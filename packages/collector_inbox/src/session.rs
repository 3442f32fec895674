//! Session Lifecycle
//!
//! A session is everything that exists while a user is signed in: one push
//! channel, one engine, two badges. Starting wires them together; shutdown
//! tears them down so no handler or in-flight request outlives it.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::HttpInboxApi;
use crate::channel::{self, RealtimeChannel};
use crate::config::{SessionCredentials, SyncConfig};
use crate::engine::{SyncEngine, SyncEvent, SyncHandle};
use crate::error::SyncError;
use crate::metrics::SyncMetrics;
use crate::protocol;

/// Channel events the engine consumes.
const FORWARDED: [&str; 5] = [
    protocol::NEW_MESSAGE,
    protocol::NEW_ARTICLE_INTEREST,
    channel::CONNECTED,
    channel::RECONNECTED,
    channel::DISCONNECTED,
];

pub struct Session {
    id: Uuid,
    handle: SyncHandle,
    channel: RealtimeChannel,
    cancel: CancellationToken,
    engine: Option<JoinHandle<()>>,
}

impl Session {
    /// Connect the push channel and start syncing. The initial snapshots are
    /// requested straight away; their results land asynchronously.
    pub fn start(config: &SyncConfig, credentials: SessionCredentials) -> Result<Self, SyncError> {
        let id = Uuid::new_v4();
        let span = info_span!("session", session_id = %id, user_id = %credentials.user_id);
        let _guard = span.enter();

        let metrics = Arc::new(SyncMetrics::new());
        let api = Arc::new(HttpInboxApi::new(&config.api, credentials.token.clone())?);
        let mut channel = RealtimeChannel::new(config.channel.clone(), metrics.clone());

        let engine = SyncEngine::new(
            api,
            channel.handle(),
            credentials.user_id.clone(),
            &config.feed,
            metrics,
        );

        for event in FORWARDED {
            let events = engine.event_sender();
            channel.on(event, move |ev| {
                // Engine gone means the session is shutting down
                let _ = events.send(SyncEvent::Channel(ev.clone()));
            });
        }

        channel.connect(&credentials.token)?;

        let cancel = engine.cancel_token();
        let (handle, task) = engine.spawn();
        let task = tokio::spawn(
            async move {
                if let Err(e) = task.await {
                    warn!(error = %e, "sync engine ended abnormally");
                }
            }
            .instrument(span.clone()),
        );

        info!("session started");
        Ok(Self {
            id,
            handle,
            channel,
            cancel,
            engine: Some(task),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Stop the engine, close the channel, and reset both badges. Results of
    /// requests still in flight are discarded when they land.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.channel.disconnect().await;
        if let Some(task) = self.engine.take() {
            let _ = task.await;
        }
        info!(session_id = %self.id, "session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiConfig, ChannelConfig, FeedConfig};
    use axum::{
        Json, Router,
        extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn push_new_message(mut socket: WebSocket) {
        // Wait for the join before pushing
        while let Some(Ok(frame)) = socket.recv().await {
            if let WsMessage::Text(text) = frame {
                if text.as_str().contains("joinConversation") {
                    break;
                }
            }
        }
        let frame = json!({
            "event": "newMessage",
            "data": {
                "id": "m1",
                "conversationId": "c1",
                "senderId": "seller",
                "content": "still for sale",
                "createdAt": "2024-05-01T10:00:00Z",
            }
        });
        let _ = socket
            .send(WsMessage::Text(frame.to_string().into()))
            .await;
        while socket.recv().await.is_some() {}
    }

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route(
                "/conversations",
                get(|| async {
                    Json(json!([{
                        "id": "c1",
                        "articleId": "a1",
                        "shopId": "s1",
                        "buyerId": "me",
                        "sellerId": "seller",
                        "hasUnread": false,
                        "lastMessageAt": "2024-04-01T10:00:00Z",
                    }]))
                }),
            )
            .route("/notifications/my", get(|| async { Json(json!([])) }))
            .route("/conversations/{id}/unread", post(|| async { "" }))
            .route(
                "/ws",
                get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(push_new_message) }),
            )
            .fallback(|| async { axum::http::StatusCode::NOT_FOUND.into_response() });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr.to_string()
    }

    fn config(addr: &str) -> SyncConfig {
        SyncConfig {
            api: ApiConfig {
                base_url: format!("http://{addr}"),
                request_timeout: Duration::from_secs(5),
            },
            channel: ChannelConfig {
                url: format!("ws://{addr}/ws"),
                reconnect_initial: Duration::from_millis(50),
                reconnect_max: Duration::from_millis(200),
            },
            feed: FeedConfig::default(),
        }
    }

    fn credentials() -> SessionCredentials {
        SessionCredentials {
            token: "secret".into(),
            user_id: "me".into(),
        }
    }

    #[tokio::test]
    async fn test_session_end_to_end() {
        let addr = spawn_backend().await;
        let session = Session::start(&config(&addr), credentials()).unwrap();
        assert!(session.is_connected());
        let handle = session.handle();

        let mut badge = handle.conversation_unread();
        timeout(Duration::from_secs(5), badge.wait_for(|n| *n == 1))
            .await
            .expect("pushed message never raised the badge")
            .unwrap();

        let inbox = handle.inbox().await.unwrap();
        assert_eq!(inbox.conversations.len(), 1);
        assert!(inbox.conversations[0].has_unread);

        session.shutdown().await;
        assert_eq!(*badge.borrow(), 0);
        assert!(matches!(handle.inbox().await, Err(SyncError::Closed)));
    }

    /// Records each event's message and whether it was emitted inside a
    /// `session` span.
    #[derive(Clone, Default)]
    struct SessionScoped(Arc<std::sync::Mutex<Vec<(String, bool)>>>);

    struct MessageField(String);

    impl tracing::field::Visit for MessageField {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S> tracing_subscriber::Layer<S> for SessionScoped
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, ctx: tracing_subscriber::layer::Context<'_, S>) {
            let mut message = MessageField(String::new());
            event.record(&mut message);
            let in_session = ctx
                .event_scope(event)
                .is_some_and(|mut scope| scope.any(|span| span.name() == "session"));
            self.0.lock().unwrap().push((message.0, in_session));
        }
    }

    impl SessionScoped {
        fn in_session(&self, message: &str) -> Option<bool> {
            let events = self.0.lock().unwrap();
            let mut matching = events.iter().filter(|(m, _)| m == message).peekable();
            matching.peek()?;
            Some(matching.all(|(_, scoped)| *scoped))
        }
    }

    #[tokio::test]
    async fn test_background_tasks_log_inside_session_span() {
        use tracing_subscriber::prelude::*;

        let events = SessionScoped::default();
        let _default =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));

        let addr = spawn_backend().await;
        let session = Session::start(&config(&addr), credentials()).unwrap();
        let mut badge = session.handle().conversation_unread();
        timeout(Duration::from_secs(5), badge.wait_for(|n| *n == 1))
            .await
            .expect("pushed message never raised the badge")
            .unwrap();
        session.shutdown().await;

        assert_eq!(events.in_session("sync engine started"), Some(true));
        assert_eq!(events.in_session("push channel connected"), Some(true));
    }

    #[tokio::test]
    async fn test_bad_channel_url_fails_start() {
        let mut cfg = config("127.0.0.1:9");
        cfg.channel.url = "not a url".into();
        let err = Session::start(&cfg, credentials()).err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
