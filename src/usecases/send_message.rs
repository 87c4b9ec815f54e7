//! Use case for sending a message into the open conversation.
//!
//! Sends are optimistic: the message is shown as `sending` before the frame
//! goes out and is marked `failed` when the socket rejects it. The server's
//! echo later replaces the placeholder in place.

use chrono::{DateTime, Utc};

use crate::{
    domain::{
        conversation_view::ConversationView,
        ids::MessageId,
        message::{Message, TempIdGenerator},
        profile::LocalProfile,
    },
    realtime::{
        connection::{ConnectionManager, SocketConnector},
        direct_chat::DirectChatSession,
    },
};

/// Content of one outgoing message. `image` is a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendMessageCommand {
    pub text: String,
    pub image: Option<String>,
}

impl SendMessageCommand {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMessageError {
    /// Neither text (after trimming) nor an image was given.
    EmptyMessage,
    ConversationNotOpen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Dispatched(MessageId),
    /// The socket was not open; the placeholder is now `failed`.
    Failed(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryReport {
    pub dispatched: usize,
    pub still_failed: usize,
}

/// Puts one message frame on the wire.
pub trait MessageDispatcher {
    /// `false` when the frame could not be dispatched.
    fn dispatch(&mut self, message: &Message) -> bool;
}

/// The direct chat socket seen from the use cases.
pub struct ChatSocket<'a, C> {
    session: &'a DirectChatSession,
    conn: &'a mut ConnectionManager<C>,
}

impl<'a, C> ChatSocket<'a, C> {
    pub fn new(session: &'a DirectChatSession, conn: &'a mut ConnectionManager<C>) -> Self {
        Self { session, conn }
    }

    pub(crate) fn parts(&mut self) -> (&DirectChatSession, &mut ConnectionManager<C>) {
        (self.session, &mut *self.conn)
    }
}

impl<C: SocketConnector> MessageDispatcher for ChatSocket<'_, C> {
    fn dispatch(&mut self, message: &Message) -> bool {
        match (&message.image, &message.text) {
            (Some(image), caption) => {
                self.session
                    .send_image(self.conn, image, caption.as_deref(), &message.id)
            }
            (None, Some(text)) => self.session.send_message(self.conn, text, &message.id),
            (None, None) => false,
        }
    }
}

pub fn send_message(
    dispatcher: &mut dyn MessageDispatcher,
    view: &mut ConversationView,
    profile: &LocalProfile,
    temp_ids: &mut TempIdGenerator,
    command: SendMessageCommand,
    now: DateTime<Utc>,
) -> Result<SendOutcome, SendMessageError> {
    let text = command.text.trim();
    if text.is_empty() && command.image.is_none() {
        return Err(SendMessageError::EmptyMessage);
    }
    if !view.is_open() {
        return Err(SendMessageError::ConversationNotOpen);
    }

    let temp_id = temp_ids.next_id(now);
    let message = Message::optimistic(
        temp_id.clone(),
        profile.sender_ref(),
        (!text.is_empty()).then(|| text.to_owned()),
        command.image,
        now,
    );
    view.push_optimistic(message.clone());

    if dispatcher.dispatch(&message) {
        Ok(SendOutcome::Dispatched(temp_id))
    } else {
        view.mark_failed(&temp_id);
        Ok(SendOutcome::Failed(temp_id))
    }
}

/// Re-dispatches every failed placeholder under its original temp id.
pub fn retry_failed(
    dispatcher: &mut dyn MessageDispatcher,
    view: &mut ConversationView,
) -> RetryReport {
    let mut report = RetryReport::default();

    for temp_id in view.failed_ids() {
        let Some(message) = view.begin_retry(&temp_id) else {
            continue;
        };

        if dispatcher.dispatch(&message) {
            report.dispatched += 1;
        } else {
            view.mark_failed(&temp_id);
            report.still_failed += 1;
        }
    }

    report
}
