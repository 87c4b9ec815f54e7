use crate::domain::{chat::Conversation, chat_list_state::ChatListState, profile::LocalProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    UserNotFound,
}

pub trait ConversationStarter {
    /// Returns the existing conversation with `username` or creates one.
    fn start_conversation(&self, username: &str) -> Result<Conversation, ConversationSourceError>;
}

impl<T> ConversationStarter for &T
where
    T: ConversationStarter + ?Sized,
{
    fn start_conversation(&self, username: &str) -> Result<Conversation, ConversationSourceError> {
        (*self).start_conversation(username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartConversationError {
    EmptyUsername,
    CannotChatWithSelf,
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    UserNotFound,
}

/// Resolves the conversation with `username`, preferring an entry already in
/// the loaded chat list over a round trip.
pub fn open_conversation(
    starter: &dyn ConversationStarter,
    chats: &ChatListState,
    profile: &LocalProfile,
    username: &str,
) -> Result<Conversation, StartConversationError> {
    let username = username.trim().trim_start_matches('@');
    if username.is_empty() {
        return Err(StartConversationError::EmptyUsername);
    }
    if username == profile.username {
        return Err(StartConversationError::CannotChatWithSelf);
    }

    if let Some(existing) = chats.find_by_username(username) {
        return Ok(existing.clone());
    }

    starter
        .start_conversation(username)
        .map_err(map_source_error)
}

fn map_source_error(error: ConversationSourceError) -> StartConversationError {
    match error {
        ConversationSourceError::Unauthorized => StartConversationError::Unauthorized,
        ConversationSourceError::Unavailable => StartConversationError::TemporarilyUnavailable,
        ConversationSourceError::InvalidData => StartConversationError::DataContractViolation,
        ConversationSourceError::UserNotFound => StartConversationError::UserNotFound,
    }
}
