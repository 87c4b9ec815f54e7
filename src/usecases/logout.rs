use crate::infra::{contracts::SessionAdapter, error::AppError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutOutcome {
    pub removed_keys: Vec<&'static str>,
}

impl LogoutOutcome {
    pub fn had_session(&self) -> bool {
        !self.removed_keys.is_empty()
    }
}

/// Removes every stored session key. Running it twice is harmless.
pub fn logout(session: &mut dyn SessionAdapter) -> Result<LogoutOutcome, AppError> {
    let removed_keys = session.clear_session()?;
    tracing::info!(removed = ?removed_keys, "session cleared");

    Ok(LogoutOutcome { removed_keys })
}
