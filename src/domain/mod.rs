//! Domain layer: core entities and business rules.

pub mod chat;
pub mod chat_list_state;
pub mod conversation_view;
pub mod events;
pub mod ids;
pub mod message;
pub mod profile;
pub mod typing;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
