use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{MessageId, UserId, TEMP_ID_PREFIX};

/// Delivery status of a message as reported by the server or set locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// True for statuses that still need a read acknowledgement.
    pub fn is_unread(self) -> bool {
        matches!(self, Self::Sent | Self::Delivered)
    }

    pub fn as_label(self) -> &'static str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

/// Normalized sender identity. At least one field is expected, neither is
/// guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderRef {
    pub id: Option<UserId>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireMessage")]
pub struct Message {
    pub id: MessageId,
    pub sender: SenderRef,
    pub text: Option<String>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub is_temp: bool,
    pub is_deleted: bool,
}

impl Message {
    /// Builds the local placeholder shown while a send awaits confirmation.
    pub fn optimistic(
        temp_id: MessageId,
        sender: SenderRef,
        text: Option<String>,
        image: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: temp_id,
            sender,
            text,
            image,
            created_at,
            status: MessageStatus::Sending,
            is_temp: true,
            is_deleted: false,
        }
    }

    /// Returns the display content: image label + text, or just text.
    pub fn display_content(&self) -> String {
        let text = self.text.as_deref().unwrap_or_default();
        match (self.image.is_some(), text.is_empty()) {
            (true, true) => "[Image]".to_owned(),
            (true, false) => format!("[Image] {text}"),
            (false, _) => text.to_owned(),
        }
    }
}

/// A message frame received on the direct chat channel. `temp_id` is echoed
/// back by the server when the frame confirms one of this client's sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: Message,
    pub temp_id: Option<MessageId>,
}

/// Produces `temp-<millis>` ids that stay strictly increasing even when two
/// sends land in the same millisecond.
#[derive(Debug, Clone, Default)]
pub struct TempIdGenerator {
    last_millis: i64,
}

impl TempIdGenerator {
    pub fn next_id(&mut self, now: DateTime<Utc>) -> MessageId {
        let millis = now.timestamp_millis().max(self.last_millis + 1);
        self.last_millis = millis;
        MessageId::Temp(format!("{TEMP_ID_PREFIX}{millis}"))
    }
}

#[derive(Debug, Deserialize, Default)]
struct WireSender {
    id: Option<UserId>,
    username: Option<String>,
}

/// Ingestion shape covering both the REST serializer and the socket payloads.
#[derive(Debug, Deserialize)]
struct WireMessage {
    id: MessageId,
    #[serde(default)]
    sender: Option<WireSender>,
    #[serde(default)]
    sender_id: Option<UserId>,
    #[serde(default)]
    sender_username: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    status: Option<MessageStatus>,
    #[serde(default)]
    is_deleted: Option<bool>,
    #[serde(default)]
    is_deleted_for_current_user: Option<bool>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let nested = wire.sender.unwrap_or_default();
        let sender = SenderRef {
            id: nested.id.or(wire.sender_id),
            username: non_empty(nested.username).or_else(|| non_empty(wire.sender_username)),
        };

        let is_temp = wire.id.is_temp();
        Self {
            id: wire.id,
            sender,
            text: non_empty(wire.text),
            image: non_empty(wire.image).or_else(|| non_empty(wire.image_url)),
            created_at: wire.created_at,
            status: wire.status.unwrap_or_default(),
            is_temp,
            is_deleted: wire.is_deleted.unwrap_or(false)
                || wire.is_deleted_for_current_user.unwrap_or(false),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}
