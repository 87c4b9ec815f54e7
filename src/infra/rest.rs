//! Blocking REST adapter for the chat backend's `/api/v1/chat/` endpoints.

use reqwest::{
    blocking::{Client, RequestBuilder},
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::{
        chat::{Conversation, Participant},
        ids::{ConversationId, MessageId},
        message::Message,
    },
    infra::{config::ApiConfig, error::AppError},
    usecases::{
        list_chats::{ChatListSource, ChatListSourceError},
        load_messages::{MessagePage, MessagesSource, MessagesSourceError},
        mark_read::{MarkReadSourceError, ReadMarkerSource},
        search_users::{UserSearchSource, UserSearchSourceError},
        start_conversation::{ConversationSourceError, ConversationStarter},
    },
};

const REST_TRANSPORT_FAILED: &str = "REST_TRANSPORT_FAILED";
const REST_UNEXPECTED_STATUS: &str = "REST_UNEXPECTED_STATUS";
const REST_INVALID_BODY: &str = "REST_INVALID_BODY";

/// Failure classes shared by every endpoint before they are mapped onto the
/// use-case source errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HttpFailure {
    Unauthorized,
    NotFound,
    Unavailable,
    InvalidData,
}

/// List endpoints answer with a bare array or a paginated envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Plain(Vec<T>),
    Paginated { results: Vec<T> },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Plain(items) | Self::Paginated { results: items } => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PageBody {
    Plain(Vec<Message>),
    Paginated {
        results: Vec<Message>,
        #[serde(default)]
        next: Option<Value>,
    },
}

impl From<PageBody> for MessagePage {
    fn from(body: PageBody) -> Self {
        match body {
            PageBody::Paginated { results, next } => MessagePage {
                messages: results,
                has_more: next.is_some(),
            },
            PageBody::Plain(messages) => MessagePage {
                messages,
                has_more: false,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct MarkReadBody<'a> {
    message_ids: &'a [MessageId],
}

#[derive(Debug, Serialize)]
struct StartConversationBody<'a> {
    username: &'a str,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    access_token: String,
    read_batch_max: usize,
}

impl RestClient {
    pub fn new(
        api: &ApiConfig,
        access_token: impl Into<String>,
        read_batch_max: usize,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(api.request_timeout())
            .build()
            .map_err(AppError::HttpClient)?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_owned(),
            access_token: access_token.into(),
            read_batch_max: read_batch_max.max(1),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/chat/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, HttpFailure> {
        let body = self.execute(request)?;
        let text = if body.trim().is_empty() {
            "null"
        } else {
            body.as_str()
        };

        serde_json::from_str(text).map_err(|error| {
            tracing::warn!(code = REST_INVALID_BODY, error = %error, "response body does not match the contract");
            HttpFailure::InvalidData
        })
    }

    fn execute(&self, request: RequestBuilder) -> Result<String, HttpFailure> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .map_err(|error| {
                tracing::warn!(code = REST_TRANSPORT_FAILED, error = %error, "request failed");
                HttpFailure::Unavailable
            })?;

        let status = response.status();
        if let Some(failure) = classify_status(status) {
            tracing::warn!(
                code = REST_UNEXPECTED_STATUS,
                status = status.as_u16(),
                url = %response.url(),
                "request rejected"
            );
            return Err(failure);
        }

        response.text().map_err(|error| {
            tracing::warn!(code = REST_TRANSPORT_FAILED, error = %error, "response body unreadable");
            HttpFailure::Unavailable
        })
    }
}

impl ChatListSource for RestClient {
    fn list_conversations(&self) -> Result<Vec<Conversation>, ChatListSourceError> {
        self.fetch::<Listing<Conversation>>(self.http.get(self.endpoint("list/")))
            .map(Listing::into_vec)
            .map_err(|failure| match failure {
                HttpFailure::Unauthorized => ChatListSourceError::Unauthorized,
                HttpFailure::InvalidData => ChatListSourceError::InvalidData,
                HttpFailure::NotFound | HttpFailure::Unavailable => ChatListSourceError::Unavailable,
            })
    }
}

impl MessagesSource for RestClient {
    fn fetch_page(
        &self,
        conversation_id: &ConversationId,
        page: u32,
    ) -> Result<MessagePage, MessagesSourceError> {
        let url = self.endpoint(&format!("conversations/{conversation_id}/messages/"));
        self.fetch::<PageBody>(self.http.post(url).query(&[("page", page)]))
            .map(MessagePage::from)
            .map_err(|failure| match failure {
                HttpFailure::Unauthorized => MessagesSourceError::Unauthorized,
                HttpFailure::NotFound if page > 1 => MessagesSourceError::PageOutOfRange,
                HttpFailure::NotFound => MessagesSourceError::ConversationNotFound,
                HttpFailure::Unavailable => MessagesSourceError::Unavailable,
                HttpFailure::InvalidData => MessagesSourceError::InvalidData,
            })
    }
}

impl ReadMarkerSource for RestClient {
    fn mark_as_read(&self, message_ids: &[MessageId]) -> Result<(), MarkReadSourceError> {
        for batch in read_batches(message_ids, self.read_batch_max) {
            self.execute(
                self.http
                    .post(self.endpoint("messages/mark_as_read/"))
                    .json(&MarkReadBody {
                        message_ids: &batch,
                    }),
            )
            .map_err(|failure| match failure {
                HttpFailure::Unauthorized => MarkReadSourceError::Unauthorized,
                _ => MarkReadSourceError::Unavailable,
            })?;
        }

        Ok(())
    }
}

impl ConversationStarter for RestClient {
    fn start_conversation(&self, username: &str) -> Result<Conversation, ConversationSourceError> {
        self.fetch::<Conversation>(
            self.http
                .post(self.endpoint("conversations/start/"))
                .json(&StartConversationBody { username }),
        )
        .map_err(|failure| match failure {
            HttpFailure::Unauthorized => ConversationSourceError::Unauthorized,
            HttpFailure::NotFound => ConversationSourceError::UserNotFound,
            HttpFailure::Unavailable => ConversationSourceError::Unavailable,
            HttpFailure::InvalidData => ConversationSourceError::InvalidData,
        })
    }
}

impl UserSearchSource for RestClient {
    fn search_users(&self, query: &str) -> Result<Vec<Participant>, UserSearchSourceError> {
        self.fetch::<Listing<Participant>>(
            self.http.get(self.endpoint("search/")).query(&[("q", query)]),
        )
        .map(Listing::into_vec)
        .map_err(|failure| match failure {
            HttpFailure::Unauthorized => UserSearchSourceError::Unauthorized,
            HttpFailure::InvalidData => UserSearchSourceError::InvalidData,
            HttpFailure::NotFound | HttpFailure::Unavailable => UserSearchSourceError::Unavailable,
        })
    }
}

fn classify_status(status: StatusCode) -> Option<HttpFailure> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(HttpFailure::Unauthorized),
        StatusCode::NOT_FOUND => Some(HttpFailure::NotFound),
        status if status.is_success() => None,
        _ => Some(HttpFailure::Unavailable),
    }
}

/// Server ids only, at most `max` per request.
fn read_batches(message_ids: &[MessageId], max: usize) -> Vec<Vec<MessageId>> {
    let server_ids: Vec<MessageId> = message_ids
        .iter()
        .filter(|id| !id.is_temp())
        .cloned()
        .collect();

    server_ids
        .chunks(max.max(1))
        .map(<[MessageId]>::to_vec)
        .collect()
}
