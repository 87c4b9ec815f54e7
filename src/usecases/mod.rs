//! Use case layer: application workflows and orchestration.

pub mod backend_jobs;
pub mod bootstrap;
pub mod chat_session;
pub mod context;
pub mod contracts;
pub mod list_chats;
pub mod load_messages;
pub mod login;
pub mod logout;
pub mod mark_read;
pub mod search_users;
pub mod send_message;
pub mod start_conversation;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
