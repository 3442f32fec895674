//! REST client for the conversation and notification endpoints.
//!
//! [`InboxApi`] is the seam the engine talks to; [`HttpInboxApi`] is the
//! reqwest implementation. Every call carries the session's bearer token.

use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::future::Future;

use crate::config::ApiConfig;
use crate::error::SyncError;
use crate::model::{Conversation, Message, NotificationItem, WireMessage};

/// Identifies an article conversation before it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTarget {
    pub article_id: String,
    pub shop_id: String,
    pub seller_id: String,
}

/// Result of `send-first-message`: the message plus the conversation the
/// server created for it.
#[derive(Debug, Clone)]
pub struct FirstMessage {
    pub message: Message,
    pub conversation: Conversation,
}

/// Consumed REST operations.
pub trait InboxApi: Send + Sync + 'static {
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<Conversation>, SyncError>> + Send;

    fn load_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, SyncError>> + Send;

    fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Conversation, SyncError>> + Send;

    fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<Message, SyncError>> + Send;

    fn send_first_message(
        &self,
        target: &ConversationTarget,
        content: &str,
    ) -> impl Future<Output = Result<FirstMessage, SyncError>> + Send;

    fn open_conversation(
        &self,
        target: &ConversationTarget,
    ) -> impl Future<Output = Result<Conversation, SyncError>> + Send;

    fn mark_conversation_read(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn mark_conversation_unread(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn list_notifications(
        &self,
    ) -> impl Future<Output = Result<Vec<NotificationItem>, SyncError>> + Send;

    fn mark_notification_read(
        &self,
        notification_id: &str,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;

    fn mark_all_notifications_read(&self)
    -> impl Future<Output = Result<(), SyncError>> + Send;

    fn mark_all_notifications_unread(
        &self,
    ) -> impl Future<Output = Result<(), SyncError>> + Send;
}

#[derive(Clone, Debug)]
pub struct HttpInboxApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpInboxApi {
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SyncError::from_reqwest("build-client", e))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, SyncError> {
        builder
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::from_reqwest(operation, e))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, SyncError> {
        self.send(operation, builder)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::from_reqwest(operation, e))
    }

    async fn fire(&self, operation: &'static str, builder: RequestBuilder) -> Result<(), SyncError> {
        self.send(operation, builder).await.map(|_| ())
    }
}

impl InboxApi for HttpInboxApi {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, SyncError> {
        self.fetch(
            "list-my-conversations",
            self.request(Method::GET, "/conversations"),
        )
        .await
    }

    async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, SyncError> {
        let wire: Vec<WireMessage> = self
            .fetch(
                "load-messages",
                self.request(Method::POST, "/conversations/load-messages")
                    .json(&json!({ "conversationId": conversation_id })),
            )
            .await?;
        let now = Utc::now();
        Ok(wire
            .into_iter()
            .filter_map(|m| m.resolve(Some(conversation_id), now))
            .collect())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, SyncError> {
        self.fetch(
            "get-conversation",
            self.request(Method::GET, &format!("/conversations/{conversation_id}")),
        )
        .await
    }

    async fn send_message(&self, conversation_id: &str, content: &str) -> Result<Message, SyncError> {
        let wire: WireMessage = self
            .fetch(
                "send-message",
                self.request(Method::POST, "/conversations/messages")
                    .json(&json!({ "conversationId": conversation_id, "content": content })),
            )
            .await?;
        wire.resolve(Some(conversation_id), Utc::now())
            .ok_or_else(|| SyncError::Transport("send-message returned no conversation".into()))
    }

    async fn send_first_message(
        &self,
        target: &ConversationTarget,
        content: &str,
    ) -> Result<FirstMessage, SyncError> {
        let mut body = serde_json::to_value(target)?;
        body["content"] = Value::String(content.to_string());
        let value: Value = self
            .fetch(
                "send-first-message",
                self.request(Method::POST, "/conversations/messages/first")
                    .json(&body),
            )
            .await?;
        parse_first_message(value, target)
    }

    async fn open_conversation(&self, target: &ConversationTarget) -> Result<Conversation, SyncError> {
        self.fetch(
            "open-conversation",
            self.request(Method::POST, "/conversations/open").json(target),
        )
        .await
    }

    async fn mark_conversation_read(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.fire(
            "mark-conversation-read",
            self.request(Method::POST, &format!("/conversations/{conversation_id}/read")),
        )
        .await
    }

    async fn mark_conversation_unread(&self, conversation_id: &str) -> Result<(), SyncError> {
        self.fire(
            "mark-conversation-unread",
            self.request(Method::POST, &format!("/conversations/{conversation_id}/unread")),
        )
        .await
    }

    async fn list_notifications(&self) -> Result<Vec<NotificationItem>, SyncError> {
        self.fetch(
            "list-my-notifications",
            self.request(Method::GET, "/notifications/my"),
        )
        .await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), SyncError> {
        self.fire(
            "mark-notification-read",
            self.request(Method::PATCH, &format!("/notifications/read/{notification_id}")),
        )
        .await
    }

    async fn mark_all_notifications_read(&self) -> Result<(), SyncError> {
        self.fire(
            "mark-all-notifications-read",
            self.request(Method::PATCH, "/notifications/read-all"),
        )
        .await
    }

    async fn mark_all_notifications_unread(&self) -> Result<(), SyncError> {
        self.fire(
            "mark-all-notifications-unread",
            self.request(Method::PATCH, "/notifications/unread-all"),
        )
        .await
    }
}

/// The first-message response is the message's own fields with the new
/// conversation embedded under `conversation`.
fn parse_first_message(mut value: Value, target: &ConversationTarget) -> Result<FirstMessage, SyncError> {
    let embedded = match value.get_mut("conversation") {
        Some(obj) if obj.is_object() => Some(obj.take()),
        _ => None,
    };
    let wire: WireMessage = serde_json::from_value(value)?;

    let conversation = match embedded {
        Some(obj) => serde_json::from_value::<Conversation>(obj)?,
        None => {
            let id = wire
                .conversation_id()
                .ok_or_else(|| SyncError::Transport("send-first-message returned no conversation".into()))?;
            let mut conversation = Conversation::placeholder(id);
            conversation.article_id = target.article_id.clone();
            conversation.shop_id = target.shop_id.clone();
            conversation.seller_id = target.seller_id.clone();
            conversation
        }
    };

    let message = wire
        .resolve(Some(&conversation.id), Utc::now())
        .ok_or_else(|| SyncError::Transport("send-first-message returned no conversation".into()))?;

    Ok(FirstMessage {
        message,
        conversation,
    })
}
