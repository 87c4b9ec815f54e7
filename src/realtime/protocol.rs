//! Wire frames of the chat, chat-list and status channels.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    chat::{ChatListDelta, ChatListUpdate, Conversation},
    ids::{MessageId, UserId},
    message::{InboundMessage, Message},
};

use super::connection::InboundFrame;

/// Encodes an image body the way the chat channel expects it in `image`.
pub fn image_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Frames this client sends. Serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message {
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        image: Option<String>,
        temp_id: MessageId,
    },
    Typing {
        is_typing: bool,
    },
    ReadReceipt {
        message_ids: Vec<MessageId>,
    },
    DeleteMessage {
        message_id: MessageId,
        delete_for_everyone: bool,
    },
    UpdateMessage {
        message_id: MessageId,
        new_text: String,
    },
    RefreshChatlist {
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatFrame {
    Message(InboundMessage),
    RecentMessages(Vec<Message>),
    /// Older history the server pages out over the socket.
    MessagesLoaded {
        messages: Vec<Message>,
        has_more: bool,
    },
    /// A participant joined or left the chat channel.
    ParticipantPresence {
        user_id: Option<UserId>,
        online: bool,
    },
    Typing {
        user_id: Option<UserId>,
        is_typing: bool,
    },
    ReadReceipt {
        user_id: Option<UserId>,
        message_ids: Vec<MessageId>,
    },
    MessageDeleted {
        message_id: MessageId,
        delete_for_everyone: bool,
    },
    MessageUpdated {
        message_id: MessageId,
        new_text: String,
    },
    ServerError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserStatus {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub username: String,
    pub is_online: bool,
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: Value,
    #[serde(default)]
    temp_id: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
struct TypingBody {
    #[serde(default)]
    user_id: Option<UserId>,
    is_typing: bool,
}

#[derive(Debug, Deserialize)]
struct ReadReceiptBody {
    #[serde(default)]
    user_id: Option<UserId>,
    message_ids: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct MessageDeletedBody {
    message_id: MessageId,
    #[serde(default)]
    delete_for_everyone: bool,
}

#[derive(Debug, Deserialize)]
struct MessageUpdatedBody {
    message_id: MessageId,
    new_text: String,
}

#[derive(Debug, Deserialize)]
struct ParticipantBody {
    #[serde(default)]
    user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Decodes a direct-chat frame. Unknown types and malformed bodies yield `None`.
pub fn decode_chat_frame(frame: &InboundFrame) -> Option<ChatFrame> {
    let body = &frame.body;
    let decoded = match frame.frame_type.as_str() {
        "message" => decode_message(body).map(ChatFrame::Message),
        "chat_message" => body
            .get("message")
            .and_then(|message| decode::<Message>(message))
            .map(|message| {
                ChatFrame::Message(InboundMessage {
                    message,
                    temp_id: None,
                })
            }),
        "recent_messages" => Some(ChatFrame::RecentMessages(decode_message_list(
            body.get("messages"),
        ))),
        "messages_loaded" => Some(ChatFrame::MessagesLoaded {
            messages: decode_message_list(body.get("messages")),
            has_more: body.get("has_more").and_then(Value::as_bool).unwrap_or(false),
        }),
        "user_connected" | "user_disconnected" => {
            decode::<ParticipantBody>(body).map(|participant| ChatFrame::ParticipantPresence {
                user_id: participant.user_id,
                online: frame.frame_type == "user_connected",
            })
        }
        "typing" => decode::<TypingBody>(body).map(|typing| ChatFrame::Typing {
            user_id: typing.user_id,
            is_typing: typing.is_typing,
        }),
        "read_receipt" => decode::<ReadReceiptBody>(body).map(|receipt| ChatFrame::ReadReceipt {
            user_id: receipt.user_id,
            message_ids: receipt.message_ids,
        }),
        "message_deleted" => {
            decode::<MessageDeletedBody>(body).map(|deleted| ChatFrame::MessageDeleted {
                message_id: deleted.message_id,
                delete_for_everyone: deleted.delete_for_everyone,
            })
        }
        "message_updated" => {
            decode::<MessageUpdatedBody>(body).map(|updated| ChatFrame::MessageUpdated {
                message_id: updated.message_id,
                new_text: updated.new_text,
            })
        }
        "error" => decode::<ErrorBody>(body).map(|error| {
            ChatFrame::ServerError(error.message.unwrap_or_else(|| "unknown error".to_owned()))
        }),
        _ => return None,
    };

    if decoded.is_none() {
        tracing::debug!(frame_type = %frame.frame_type, "ignoring malformed chat frame");
    }

    decoded
}

/// Decodes a `chatlist_update` frame: either a `chats` array (full snapshot or
/// a batch of deltas) or a single flat delta.
pub fn decode_chat_list_frame(frame: &InboundFrame) -> Option<ChatListUpdate> {
    if frame.frame_type != "chatlist_update" {
        return None;
    }

    let decoded = match frame.body.get("chats") {
        Some(chats) => decode::<Vec<Conversation>>(chats)
            .map(ChatListUpdate::Snapshot)
            .or_else(|| decode::<Vec<ChatListDelta>>(chats).map(ChatListUpdate::Deltas)),
        None => decode::<ChatListDelta>(&frame.body).map(|delta| ChatListUpdate::Deltas(vec![delta])),
    };

    if decoded.is_none() {
        tracing::debug!("ignoring malformed chat list frame");
    }

    decoded
}

pub fn decode_status_frame(frame: &InboundFrame) -> Option<UserStatus> {
    if frame.frame_type != "user_status" {
        return None;
    }

    decode(&frame.body)
}

fn decode_message(body: &Value) -> Option<InboundMessage> {
    if body.get("message").is_some_and(Value::is_object) {
        let envelope = decode::<MessageEnvelope>(body)?;
        let message = decode::<Message>(&envelope.message)?;
        return Some(InboundMessage {
            message,
            temp_id: envelope.temp_id,
        });
    }

    let message = decode::<Message>(body)?;
    let temp_id = body.get("temp_id").and_then(decode::<MessageId>);
    Some(InboundMessage { message, temp_id })
}

fn decode_message_list(messages: Option<&Value>) -> Vec<Message> {
    messages
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(decode::<Message>).collect())
        .unwrap_or_default()
}

fn decode<T: DeserializeOwned>(value: &Value) -> Option<T> {
    T::deserialize(value).ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::ids::ConversationId;

    fn frame(body: Value) -> InboundFrame {
        InboundFrame {
            frame_type: body["type"].as_str().unwrap_or_default().to_owned(),
            body,
        }
    }

    #[test]
    fn outbound_frames_carry_type_discriminator() {
        let message = OutboundFrame::Message {
            text: Some("hi".to_owned()),
            image: None,
            temp_id: MessageId::parse("temp-1"),
        };
        let refresh = OutboundFrame::RefreshChatlist {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
        };

        assert_eq!(
            serde_json::to_value(&message).expect("serialize"),
            json!({"type": "message", "text": "hi", "temp_id": "temp-1"})
        );
        assert_eq!(
            serde_json::to_value(OutboundFrame::Typing { is_typing: true }).expect("serialize"),
            json!({"type": "typing", "is_typing": true})
        );
        assert_eq!(
            serde_json::to_value(OutboundFrame::ReadReceipt {
                message_ids: vec![MessageId::server(1), MessageId::parse("a-uuid")],
            })
            .expect("serialize"),
            json!({"type": "read_receipt", "message_ids": [1, "a-uuid"]})
        );
        assert_eq!(
            serde_json::to_value(&refresh).expect("serialize")["type"],
            json!("refresh_chatlist")
        );
    }

    #[test]
    fn wrapped_message_confirmation_keeps_temp_id() {
        let decoded = decode_chat_frame(&frame(json!({
            "type": "message",
            "message": {"id": 42, "text": "hi", "sender_id": 1,
                        "created_at": "2024-05-01T10:00:00Z", "status": "sent"},
            "temp_id": "temp-1"
        })));

        let Some(ChatFrame::Message(inbound)) = decoded else {
            panic!("expected message frame");
        };
        assert_eq!(inbound.message.id, MessageId::server(42));
        assert_eq!(inbound.temp_id, Some(MessageId::parse("temp-1")));
    }

    #[test]
    fn flat_message_frame_decodes_without_temp_id() {
        let decoded = decode_chat_frame(&frame(json!({
            "type": "message", "id": "7", "text": "yo", "sender_id": "2",
            "created_at": "2024-05-01T10:00:00Z"
        })));

        let Some(ChatFrame::Message(inbound)) = decoded else {
            panic!("expected message frame");
        };
        assert_eq!(inbound.temp_id, None);
        assert_eq!(inbound.message.text.as_deref(), Some("yo"));
    }

    #[test]
    fn recent_messages_skip_invalid_entries() {
        let decoded = decode_chat_frame(&frame(json!({
            "type": "recent_messages",
            "messages": [
                {"id": 1, "text": "a", "created_at": "2024-05-01T10:00:00Z"},
                {"id": 2, "text": "missing timestamp"}
            ]
        })));

        let Some(ChatFrame::RecentMessages(messages)) = decoded else {
            panic!("expected recent messages frame");
        };
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn messages_loaded_carries_string_ids_and_has_more() {
        let decoded = decode_chat_frame(&frame(json!({
            "type": "messages_loaded",
            "messages": [
                {"id": "31", "text": "older", "image": null, "sender_id": "2",
                 "status": "read", "created_at": "2024-05-01T09:00:00Z"}
            ],
            "has_more": true
        })));

        let Some(ChatFrame::MessagesLoaded { messages, has_more }) = decoded else {
            panic!("expected messages loaded frame");
        };
        assert!(has_more);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::server(31));
        assert_eq!(messages[0].sender.id, Some(UserId::new("2")));
    }

    #[test]
    fn participant_join_and_leave_decode() {
        let joined = decode_chat_frame(&frame(json!({
            "type": "user_connected", "user_id": 2, "timestamp": "2024-05-01T09:00:00Z"
        })));
        let left = decode_chat_frame(&frame(json!({"type": "user_disconnected", "user_id": "2"})));

        assert_eq!(
            joined,
            Some(ChatFrame::ParticipantPresence {
                user_id: Some(UserId::new("2")),
                online: true,
            })
        );
        assert_eq!(
            left,
            Some(ChatFrame::ParticipantPresence {
                user_id: Some(UserId::new("2")),
                online: false,
            })
        );
    }

    #[test]
    fn unknown_and_malformed_frames_are_ignored() {
        assert_eq!(decode_chat_frame(&frame(json!({"type": "sticker"}))), None);
        assert_eq!(decode_chat_frame(&frame(json!({"type": "typing"}))), None);
        assert_eq!(decode_chat_list_frame(&frame(json!({"type": "typing"}))), None);
    }

    #[test]
    fn read_receipt_and_typing_keep_actor_ids() {
        let receipt = decode_chat_frame(&frame(json!({
            "type": "read_receipt", "user_id": "2", "message_ids": ["10", 11]
        })));
        let typing = decode_chat_frame(&frame(json!({
            "type": "typing", "user_id": 2, "is_typing": true, "timestamp": "x"
        })));

        assert_eq!(
            receipt,
            Some(ChatFrame::ReadReceipt {
                user_id: Some(UserId::new("2")),
                message_ids: vec![MessageId::server(10), MessageId::server(11)],
            })
        );
        assert_eq!(
            typing,
            Some(ChatFrame::Typing {
                user_id: Some(UserId::new("2")),
                is_typing: true,
            })
        );
    }

    #[test]
    fn edit_delete_and_error_frames_decode() {
        assert_eq!(
            decode_chat_frame(&frame(json!({
                "type": "message_deleted", "message_id": "5", "delete_for_everyone": true
            }))),
            Some(ChatFrame::MessageDeleted {
                message_id: MessageId::server(5),
                delete_for_everyone: true,
            })
        );
        assert_eq!(
            decode_chat_frame(&frame(json!({
                "type": "message_updated", "message_id": 5, "new_text": "fixed"
            }))),
            Some(ChatFrame::MessageUpdated {
                message_id: MessageId::server(5),
                new_text: "fixed".to_owned(),
            })
        );
        assert_eq!(
            decode_chat_frame(&frame(json!({"type": "error", "message": "nope"}))),
            Some(ChatFrame::ServerError("nope".to_owned()))
        );
    }

    #[test]
    fn flat_chat_list_delta_decodes() {
        let decoded = decode_chat_list_frame(&frame(json!({
            "type": "chatlist_update", "conversation_id": 7,
            "last_message": {"text": "hi", "sender_id": "2", "is_own": false,
                             "created_at": "2024-05-01T10:00:00Z"},
            "updated_at": "2024-05-01T10:00:00Z", "action": "new_message",
            "unread_increment": 1
        })));

        let Some(ChatListUpdate::Deltas(deltas)) = decoded else {
            panic!("expected deltas");
        };
        assert_eq!(deltas[0].conversation_id, ConversationId::new("7"));
        assert_eq!(deltas[0].unread_increment, 1);
    }

    #[test]
    fn chats_array_decodes_as_snapshot_or_deltas() {
        let snapshot = decode_chat_list_frame(&frame(json!({
            "type": "chatlist_update",
            "chats": [{"id": 1, "other_user": {"username": "bob"}, "unread_count": 0}]
        })));
        let deltas = decode_chat_list_frame(&frame(json!({
            "type": "chatlist_update",
            "chats": [{"conversation_id": 1, "unread_increment": 2}]
        })));

        assert!(matches!(snapshot, Some(ChatListUpdate::Snapshot(ref chats)) if chats.len() == 1));
        assert!(matches!(deltas, Some(ChatListUpdate::Deltas(ref items)) if items[0].unread_increment == 2));
    }

    #[test]
    fn status_frame_decodes_presence() {
        let status = decode_status_frame(&frame(json!({
            "type": "user_status", "user_id": "3", "username": "bob",
            "is_online": true, "timestamp": "2024-05-01T10:00:00Z"
        })));

        assert_eq!(
            status,
            Some(UserStatus {
                user_id: Some(UserId::new("3")),
                username: "bob".to_owned(),
                is_online: true,
            })
        );
    }
}
