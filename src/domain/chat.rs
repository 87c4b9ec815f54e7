use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ids::{ConversationId, UserId};

/// The non-self participant of a conversation, or a user search hit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<UserId>,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub is_online: bool,
}

impl Participant {
    /// Full name when the profile has one, the username otherwise.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}

/// Preview of the newest message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LastMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub is_own: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub other_user: Participant,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Presence of the other participant; the list serializer reports it
    /// beside `other_user` rather than inside it.
    pub fn is_other_online(&self) -> bool {
        self.is_online.unwrap_or(self.other_user.is_online)
    }
}

/// Incremental change to one conversation in the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatListDelta {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_increment: u32,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatListUpdate {
    /// Full replacement of the list.
    Snapshot(Vec<Conversation>),
    Deltas(Vec<ChatListDelta>),
}
