//! Realtime layer: WebSocket channels to the chat backend.

pub mod chat_list;
pub mod connection;
pub mod direct_chat;
pub mod presence;
pub mod protocol;
pub mod ws_transport;

/// Returns the realtime module name for smoke checks.
pub fn module_name() -> &'static str {
    "realtime"
}
