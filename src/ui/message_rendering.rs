//! Line formatting for the terminal chat.
//!
//! Every notice becomes zero or more plain lines:
//! - messages as `[HH:MM] #id sender: content`, own messages with their status
//! - date separators between history rows from different days
//! - chat list entries with presence and unread counts

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::{
    domain::{
        chat::{Conversation, Participant},
        conversation_view::RenderedMessage,
        events::ConnectionState,
        message::MessageStatus,
    },
    usecases::chat_session::Notice,
};

const OWN_SENDER_LABEL: &str = "you";

/// Turns notices into lines. Remembers the open conversation's peer so
/// socket messages without a sender name still read naturally.
#[derive(Debug, Clone)]
pub struct NoticeRenderer {
    offset: FixedOffset,
    peer: Option<String>,
}

impl NoticeRenderer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset, peer: None }
    }

    pub fn render(&mut self, notice: &Notice) -> Vec<String> {
        match notice {
            Notice::Connection {
                channel,
                state,
                detail,
            } => vec![format!(
                "[{channel}] {}",
                connection_label(*state, detail.as_deref())
            )],
            Notice::ConversationOpened { peer, online } => {
                self.peer = Some(peer.clone());
                vec![format!(
                    "Chatting with {peer}{}. Type a message, /more for older ones, /quit to leave.",
                    presence_suffix(*online)
                )]
            }
            Notice::History { messages, has_more } => {
                let mut lines = Vec::new();
                if *has_more {
                    lines.push("--- older messages: /more ---".to_owned());
                }
                lines.extend(self.history_lines(messages));
                lines
            }
            Notice::HistoryEnd => vec!["--- start of conversation ---".to_owned()],
            Notice::Message(rendered) => vec![self.message_line(rendered)],
            Notice::Confirmed {
                temp_id,
                message_id,
            } => vec![format!("  {temp_id} delivered as #{message_id}")],
            Notice::PeerTyping(true) => vec![format!("  {} is typing...", self.peer_name())],
            Notice::PeerTyping(false) => Vec::new(),
            Notice::ReadByPeer(count) => vec![format!("  read by {}: {count} message(s)", self.peer_name())],
            Notice::Deleted(message_id) => vec![format!("  #{message_id} was deleted")],
            Notice::Edited { message_id, text } => vec![format!("  #{message_id} edited: {text}")],
            Notice::ChatList(chats) if chats.is_empty() => vec!["No conversations yet.".to_owned()],
            Notice::ChatList(chats) => {
                let mut lines = vec!["Chats:".to_owned()];
                lines.extend(chats.iter().map(|chat| format!("  {}", format_conversation(chat))));
                lines
            }
            Notice::ChatUpdated(chat) => vec![format!("* {}", format_conversation(chat))],
            Notice::Presence { username, online } => vec![format!(
                "  {username} is {}",
                if *online { "online" } else { "offline" }
            )],
            Notice::ServerError(message) => vec![format!("server: {message}")],
            Notice::Info(message) => vec![message.clone()],
            Notice::Error(message) => vec![format!("error: {message}")],
        }
    }

    fn history_lines(&self, messages: &[RenderedMessage]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut previous_date: Option<NaiveDate> = None;

        for rendered in messages {
            let date = self.local(rendered.message.created_at).date_naive();
            if previous_date != Some(date) {
                lines.push(format!("--- {} ---", date.format("%d %b %Y")));
            }
            lines.push(self.message_line(rendered));
            previous_date = Some(date);
        }

        lines
    }

    fn message_line(&self, rendered: &RenderedMessage) -> String {
        let message = &rendered.message;
        let time = self.local(message.created_at).format("%H:%M");
        let sender = if rendered.is_own {
            OWN_SENDER_LABEL.to_owned()
        } else {
            message
                .sender
                .username
                .clone()
                .unwrap_or_else(|| self.peer_name().to_owned())
        };
        let id = if message.is_temp {
            message.id.to_string()
        } else {
            format!("#{}", message.id)
        };

        let mut line = format!("[{time}] {id} {sender}: {}", message.display_content());
        if rendered.is_own {
            line.push_str(&format!(" ({})", status_label(message.status)));
        }
        line
    }

    fn peer_name(&self) -> &str {
        self.peer.as_deref().unwrap_or("peer")
    }

    fn local(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset)
    }
}

/// `bob (online) [2 unread]: last text`
pub fn format_conversation(chat: &Conversation) -> String {
    let mut line = format!(
        "{}{}",
        chat.other_user.display_name(),
        presence_suffix(chat.is_other_online())
    );
    if chat.unread_count > 0 {
        line.push_str(&format!(" [{} unread]", chat.unread_count));
    }
    if let Some(text) = chat
        .last_message
        .as_ref()
        .and_then(|last| last.text.as_deref())
        .filter(|text| !text.trim().is_empty())
    {
        line.push_str(&format!(": {}", preview(text)));
    }
    line
}

pub fn format_participant(user: &Participant) -> String {
    let name = user.display_name();
    let mut line = format!("@{}", user.username);
    if name != user.username {
        line.push_str(&format!(" ({name})"));
    }
    line.push_str(presence_suffix(user.is_online));
    line
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 48;

    let single_line = text.lines().next().unwrap_or_default();
    if single_line.chars().count() > MAX_CHARS || single_line.len() < text.len() {
        let cut: String = single_line.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        single_line.to_owned()
    }
}

fn presence_suffix(online: bool) -> &'static str {
    if online {
        " (online)"
    } else {
        ""
    }
}

fn status_label(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Failed => "failed, /retry to resend",
        other => other.as_label(),
    }
}

fn connection_label(state: ConnectionState, detail: Option<&str>) -> String {
    match detail.filter(|detail| !detail.is_empty()) {
        Some(detail) => format!("{} ({detail})", state.as_label()),
        None => state.as_label().to_owned(),
    }
}
