use crate::domain::{
    conversation_view::{ConversationView, PageApplied},
    ids::ConversationId,
    message::Message,
};

/// One page of conversation history as the REST collaborator returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagesSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
    ConversationNotFound,
    /// The page number is past the end of the history.
    PageOutOfRange,
}

pub trait MessagesSource {
    fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
    ) -> Result<MessagePage, MessagesSourceError>;
}

impl<T> MessagesSource for &T
where
    T: MessagesSource + ?Sized,
{
    fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
    ) -> Result<MessagePage, MessagesSourceError> {
        (*self).fetch_page(conversation_id, page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadMessagesError {
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
    ConversationNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOlderOutcome {
    Loaded(PageApplied),
    EndOfHistory,
    /// The page belongs to a conversation that is no longer open.
    Stale,
}

/// A history page claimed for fetching. Page 1 is the initial load; later
/// pages are older messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub conversation_id: ConversationId,
    pub page: u32,
}

/// Claims the next page of the open conversation. `None` while a load is in
/// flight, once history is exhausted, or when nothing is open.
pub fn begin_page_request(view: &mut ConversationView) -> Option<PageRequest> {
    let conversation_id = view.conversation_id().cloned()?;
    let page = view.begin_page_load()?;
    Some(PageRequest {
        conversation_id,
        page,
    })
}

/// Merges a fetched page into the view and releases the claim taken by
/// `begin_page_request`.
pub fn apply_fetched_page(
    view: &mut ConversationView,
    request: &PageRequest,
    fetched: Result<MessagePage, MessagesSourceError>,
) -> Result<LoadOlderOutcome, LoadMessagesError> {
    if view.conversation_id() != Some(&request.conversation_id) {
        return Ok(LoadOlderOutcome::Stale);
    }

    match fetched {
        Ok(fetched) if fetched.messages.is_empty() => {
            view.end_of_history();
            Ok(LoadOlderOutcome::EndOfHistory)
        }
        Ok(fetched) => Ok(LoadOlderOutcome::Loaded(view.apply_page(
            request.page,
            fetched.messages,
            fetched.has_more,
        ))),
        Err(MessagesSourceError::PageOutOfRange) => {
            view.end_of_history();
            Ok(LoadOlderOutcome::EndOfHistory)
        }
        Err(error) => {
            view.fail_page_load();
            Err(map_source_error(error))
        }
    }
}

fn map_source_error(error: MessagesSourceError) -> LoadMessagesError {
    match error {
        MessagesSourceError::Unauthorized => LoadMessagesError::Unauthorized,
        MessagesSourceError::Unavailable | MessagesSourceError::PageOutOfRange => {
            LoadMessagesError::TemporarilyUnavailable
        }
        MessagesSourceError::InvalidData => LoadMessagesError::DataContractViolation,
        MessagesSourceError::ConversationNotFound => LoadMessagesError::ConversationNotFound,
    }
}
