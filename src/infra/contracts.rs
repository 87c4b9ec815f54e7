use crate::infra::{config::AppConfig, error::AppError, session_store::SessionInfo};

pub trait ConfigAdapter {
    fn load(&self) -> Result<AppConfig, AppError>;
}

pub trait SessionAdapter {
    fn load_session(&self) -> Result<Option<SessionInfo>, AppError>;
    fn save_session(
        &mut self,
        access_token: &str,
        username: &str,
        user_id: Option<&str>,
    ) -> Result<(), AppError>;
    /// Returns the keys that were actually removed.
    fn clear_session(&mut self) -> Result<Vec<&'static str>, AppError>;
}
