//! Domain types for conversations, messages, and notifications.
//!
//! Server payloads are loose about field naming (`conversationId` vs
//! `conversation_id`, `createdAt` vs `created_at`, nested vs flat
//! conversation references), so each type deserializes through a private
//! wire struct that absorbs the variations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A buyer/seller thread about one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "WireConversation")]
pub struct Conversation {
    pub id: String,
    pub article_id: String,
    pub shop_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub has_unread: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_name: Option<String>,
}

impl Conversation {
    /// Entry created for an id seen only in a push event. The participant
    /// fields stay empty until the details are fetched.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            article_id: String::new(),
            shop_id: String::new(),
            buyer_id: String::new(),
            seller_id: String::new(),
            has_unread: false,
            last_message_at: None,
            article_title: None,
            shop_name: None,
        }
    }

    /// The participant on the other side of the thread from `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> &str {
        if self.buyer_id == user_id {
            &self.seller_id
        } else {
            &self.buyer_id
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireConversation {
    id: String,
    #[serde(default, alias = "article_id")]
    article_id: String,
    #[serde(default, alias = "shop_id")]
    shop_id: String,
    #[serde(default, alias = "buyer_id")]
    buyer_id: String,
    #[serde(default, alias = "seller_id")]
    seller_id: String,
    #[serde(default)]
    has_unread: Option<bool>,
    #[serde(default)]
    unread_count: Option<u32>,
    #[serde(default, alias = "last_message_at")]
    last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    article_title: Option<String>,
    #[serde(default)]
    shop_name: Option<String>,
}

impl From<WireConversation> for Conversation {
    fn from(w: WireConversation) -> Self {
        let has_unread = w.has_unread.unwrap_or(false) || w.unread_count.unwrap_or(0) > 0;
        Self {
            id: w.id,
            article_id: w.article_id,
            shop_id: w.shop_id,
            buyer_id: w.buyer_id,
            seller_id: w.seller_id,
            has_unread,
            last_message_at: w.last_message_at,
            article_title: w.article_title,
            shop_name: w.shop_name,
        }
    }
}

/// One immutable message in a conversation timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// `conversation` may arrive as a bare id or as an embedded object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ConversationRef {
    Id(String),
    Object { id: String },
}

/// A message as the server sends it, before its conversation is resolved.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    conversation: Option<ConversationRef>,
    #[serde(default, rename = "conversation_id")]
    conversation_id_snake: Option<String>,
    /// Empty when the server leaves it out, which reads as a counterpart
    /// message
    #[serde(default, alias = "sender_id")]
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// The conversation this message belongs to, from whichever field the
    /// server filled in.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .or(match &self.conversation {
                Some(ConversationRef::Id(id)) => Some(id.as_str()),
                Some(ConversationRef::Object { id }) => Some(id.as_str()),
                None => None,
            })
            .or(self.conversation_id_snake.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Resolve into a [`Message`]. `fallback_conversation` covers history
    /// responses that omit the id; `received_at` covers a missing timestamp.
    pub fn resolve(
        self,
        fallback_conversation: Option<&str>,
        received_at: DateTime<Utc>,
    ) -> Option<Message> {
        let conversation_id = self
            .conversation_id()
            .or(fallback_conversation)?
            .to_string();
        Some(Message {
            id: self.id,
            conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            created_at: self.created_at.unwrap_or(received_at),
        })
    }
}

/// Article-lifecycle notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "NEW_ARTICLE")]
    NewArticle,
    #[serde(rename = "ARTICLE_UPDATED")]
    ArticleUpdated,
    #[serde(rename = "ARTICLE_REJECTED")]
    ArticleRejected,
    // Server spelling
    #[serde(rename = "ARTICLE_APPROUVED")]
    ArticleApproved,
    #[default]
    #[serde(other, rename = "UNKNOWN")]
    Unknown,
}

/// Type-specific notification fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireNotification")]
pub struct NotificationItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub is_read: bool,
    pub article_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub payload: NotificationPayload,
}

#[derive(Deserialize)]
struct WireNotification {
    id: String,
    #[serde(default, rename = "type")]
    kind: NotificationKind,
    #[serde(default, alias = "isRead")]
    is_read: bool,
    #[serde(default, alias = "articleId")]
    article_id: Option<String>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    payload: NotificationPayload,
}

impl From<WireNotification> for NotificationItem {
    fn from(w: WireNotification) -> Self {
        let article_id = w.article_id.or_else(|| w.payload.article_id.clone());
        Self {
            id: w.id,
            kind: w.kind,
            is_read: w.is_read,
            article_id,
            // Undated items count as just received
            created_at: w.created_at.unwrap_or_else(Utc::now),
            payload: w.payload,
        }
    }
}
