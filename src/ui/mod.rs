//! UI layer: line-oriented terminal surface.

pub mod event_source;
pub mod message_rendering;
pub mod shell;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
