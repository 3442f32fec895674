use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api::{ConversationTarget, FirstMessage, InboxApi};
use crate::error::SyncError;
use crate::model::{
    Conversation, Message, NotificationItem, NotificationKind, NotificationPayload, WireMessage,
};

/// Fixed test clock: `t(0)` is 2023-11-14T22:13:20Z.
pub fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("timestamp")
}

pub fn conversation(id: &str, has_unread: bool, last: Option<DateTime<Utc>>) -> Conversation {
    Conversation {
        id: id.to_string(),
        article_id: format!("article-{id}"),
        shop_id: "shop-1".into(),
        buyer_id: "me".into(),
        seller_id: "seller-1".into(),
        has_unread,
        last_message_at: last,
        article_title: None,
        shop_name: None,
    }
}

pub fn message(id: &str, conversation_id: &str, sender_id: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        content: format!("content of {id}"),
        created_at: t(secs),
    }
}

/// A `newMessage` payload as the server would push it.
pub fn wire_message(id: &str, conversation_id: &str, sender_id: &str, secs: i64) -> WireMessage {
    serde_json::from_value(json!({
        "id": id,
        "conversationId": conversation_id,
        "senderId": sender_id,
        "content": format!("content of {id}"),
        "createdAt": t(secs),
    }))
    .expect("wire message")
}

pub fn notification(id: &str, secs: i64, is_read: bool) -> NotificationItem {
    NotificationItem {
        id: id.to_string(),
        kind: NotificationKind::NewArticle,
        is_read,
        article_id: Some(format!("article-{id}")),
        created_at: t(secs),
        payload: NotificationPayload {
            article_id: Some(format!("article-{id}")),
            ..Default::default()
        },
    }
}

/// Every call the engine made, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ListConversations,
    LoadMessages(String),
    GetConversation(String),
    SendMessage { conversation_id: String, content: String },
    SendFirstMessage { article_id: String, content: String },
    OpenConversation { article_id: String },
    MarkConversationRead(String),
    MarkConversationUnread(String),
    ListNotifications,
    MarkNotificationRead(String),
    MarkAllNotificationsRead,
    MarkAllNotificationsUnread,
}

/// In-memory [`InboxApi`] that records calls. Operations can be made to
/// fail, or held behind a gate until the test releases them.
#[derive(Default)]
pub struct MockInboxApi {
    pub conversations: Mutex<Vec<Conversation>>,
    pub notifications: Mutex<Vec<NotificationItem>>,
    pub histories: Mutex<HashMap<String, Vec<Message>>>,
    pub details: Mutex<HashMap<String, Conversation>>,
    calls: Mutex<Vec<ApiCall>>,
    failing: Mutex<HashSet<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    next_id: AtomicU64,
}

impl MockInboxApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(self, conversations: Vec<Conversation>) -> Self {
        *self.conversations.lock().expect("lock") = conversations;
        self
    }

    pub fn with_notifications(self, notifications: Vec<NotificationItem>) -> Self {
        *self.notifications.lock().expect("lock") = notifications;
        self
    }

    pub fn with_history(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.histories
            .lock()
            .expect("lock")
            .insert(conversation_id.to_string(), messages);
        self
    }

    pub fn with_details(self, conversation: Conversation) -> Self {
        self.details
            .lock()
            .expect("lock")
            .insert(conversation.id.clone(), conversation);
        self
    }

    /// Make `operation` return a 500.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().expect("lock").insert(operation);
    }

    /// Hold `operation` until the returned gate is notified.
    pub fn gate(&self, operation: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("lock")
            .insert(operation, gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn count(&self, call: &ApiCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    async fn enter(&self, operation: &'static str, call: ApiCall) -> Result<(), SyncError> {
        self.calls.lock().expect("lock").push(call);
        let gate = self.gates.lock().expect("lock").get(operation).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().expect("lock").contains(operation) {
            return Err(SyncError::Status {
                operation,
                status: 500,
            });
        }
        Ok(())
    }
}

impl InboxApi for MockInboxApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, SyncError> {
        self.enter("list-my-conversations", ApiCall::ListConversations)
            .await?;
        Ok(self.conversations.lock().expect("lock").clone())
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, SyncError> {
        self.enter(
            "load-messages",
            ApiCall::LoadMessages(conversation_id.to_string()),
        )
        .await?;
        Ok(self
            .histories
            .lock()
            .expect("lock")
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, SyncError> {
        self.enter(
            "get-conversation",
            ApiCall::GetConversation(conversation_id.to_string()),
        )
        .await?;
        self.details
            .lock()
            .expect("lock")
            .get(conversation_id)
            .cloned()
            .ok_or(SyncError::Status {
                operation: "get-conversation",
                status: 404,
            })
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message, SyncError> {
        self.enter(
            "send-message",
            ApiCall::SendMessage {
                conversation_id: conversation_id.to_string(),
                content: content.to_string(),
            },
        )
        .await?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Message {
            id: format!("sent-{n}"),
            conversation_id: conversation_id.to_string(),
            sender_id: "me".into(),
            content: content.to_string(),
            created_at: Utc::now(),
        })
    }

    async fn send_first_message(
        &self,
        target: &ConversationTarget,
        content: &str,
    ) -> Result<FirstMessage, SyncError> {
        self.enter(
            "send-first-message",
            ApiCall::SendFirstMessage {
                article_id: target.article_id.clone(),
                content: content.to_string(),
            },
        )
        .await?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let conversation = Conversation {
            id: format!("new-{n}"),
            article_id: target.article_id.clone(),
            shop_id: target.shop_id.clone(),
            buyer_id: "me".into(),
            seller_id: target.seller_id.clone(),
            has_unread: false,
            last_message_at: None,
            article_title: None,
            shop_name: None,
        };
        let message = Message {
            id: format!("first-{n}"),
            conversation_id: conversation.id.clone(),
            sender_id: "me".into(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        Ok(FirstMessage {
            message,
            conversation,
        })
    }

    async fn open_conversation(&self, target: &ConversationTarget) -> Result<Conversation, SyncError> {
        self.enter(
            "open-conversation",
            ApiCall::OpenConversation {
                article_id: target.article_id.clone(),
            },
        )
        .await?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(Conversation {
            id: format!("opened-{n}"),
            article_id: target.article_id.clone(),
            shop_id: target.shop_id.clone(),
            buyer_id: "me".into(),
            seller_id: target.seller_id.clone(),
            has_unread: false,
            last_message_at: None,
            article_title: None,
            shop_name: None,
        })
    }

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.enter(
            "mark-conversation-read",
            ApiCall::MarkConversationRead(conversation_id.to_string()),
        )
        .await
    }

    async fn mark_conversation_unread(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.enter(
            "mark-conversation-unread",
            ApiCall::MarkConversationUnread(conversation_id.to_string()),
        )
        .await
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationItem>, SyncError> {
        self.enter("list-my-notifications", ApiCall::ListNotifications)
            .await?;
        Ok(self.notifications.lock().expect("lock").clone())
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), SyncError> {
        self.enter(
            "mark-notification-read",
            ApiCall::MarkNotificationRead(notification_id.to_string()),
        )
        .await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), SyncError> {
        self.enter(
            "mark-all-notifications-read",
            ApiCall::MarkAllNotificationsRead,
        )
        .await
    }

    async fn mark_all_notifications_unread(&self) -> Result<(), SyncError> {
        self.enter(
            "mark-all-notifications-unread",
            ApiCall::MarkAllNotificationsUnread,
        )
        .await
    }
}
