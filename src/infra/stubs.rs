use crate::{
    domain::{ids::UserId, profile::LocalProfile},
    infra::{
        config::AppConfig,
        contracts::{ConfigAdapter, SessionAdapter},
        error::AppError,
        session_store::SessionInfo,
    },
};

#[derive(Debug, Clone, Default)]
pub struct StubConfigAdapter;

impl ConfigAdapter for StubConfigAdapter {
    fn load(&self) -> Result<AppConfig, AppError> {
        Ok(AppConfig::default())
    }
}

/// Session adapter that keeps the session in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySession {
    pub access_token: Option<String>,
    pub username: Option<String>,
    pub user_id: Option<String>,
}

impl InMemorySession {
    pub fn signed_in(access_token: &str, username: &str) -> Self {
        Self {
            access_token: Some(access_token.to_owned()),
            username: Some(username.to_owned()),
            user_id: None,
        }
    }
}

impl SessionAdapter for InMemorySession {
    fn load_session(&self) -> Result<Option<SessionInfo>, AppError> {
        Ok(self.access_token.clone().map(|access_token| SessionInfo {
            access_token,
            profile: self.username.clone().map(|username| {
                LocalProfile::new(self.user_id.clone().map(UserId::new), username)
            }),
        }))
    }

    fn save_session(
        &mut self,
        access_token: &str,
        username: &str,
        user_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.access_token = Some(access_token.to_owned());
        self.username = Some(username.to_owned());
        self.user_id = user_id.map(str::to_owned);
        Ok(())
    }

    fn clear_session(&mut self) -> Result<Vec<&'static str>, AppError> {
        let mut removed = Vec::new();
        if self.access_token.take().is_some() {
            removed.push("access_token");
        }
        if self.username.take().is_some() {
            removed.push("username");
        }
        if self.user_id.take().is_some() {
            removed.push("user_id");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_config_returns_defaults() {
        let adapter = StubConfigAdapter;
        let config = adapter.load().expect("stub config must load");

        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn in_memory_session_round_trips_profile() {
        let mut session = InMemorySession::default();
        session
            .save_session("tok", "alice", Some("4"))
            .expect("save");

        let loaded = session.load_session().expect("load").expect("present");

        assert_eq!(loaded.access_token, "tok");
        assert_eq!(
            loaded.profile,
            Some(LocalProfile::new(Some(UserId::new("4")), "alice"))
        );
    }
}
