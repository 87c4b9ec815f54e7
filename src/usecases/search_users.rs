use crate::domain::{chat::Participant, profile::LocalProfile};

pub const MIN_QUERY_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSearchSourceError {
    Unauthorized,
    Unavailable,
    InvalidData,
}

pub trait UserSearchSource {
    fn search_users(&self, query: &str) -> Result<Vec<Participant>, UserSearchSourceError>;
}

impl<T> UserSearchSource for &T
where
    T: UserSearchSource + ?Sized,
{
    fn search_users(&self, query: &str) -> Result<Vec<Participant>, UserSearchSourceError> {
        (*self).search_users(query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchUsersError {
    QueryTooShort,
    Unauthorized,
    TemporarilyUnavailable,
    DataContractViolation,
}

/// Searches users by name. The signed-in user is left out of the hits.
pub fn search_users(
    source: &dyn UserSearchSource,
    query: &str,
    profile: Option<&LocalProfile>,
) -> Result<Vec<Participant>, SearchUsersError> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(SearchUsersError::QueryTooShort);
    }

    let mut users = source.search_users(query).map_err(map_source_error)?;
    if let Some(profile) = profile {
        users.retain(|user| user.username != profile.username);
    }

    Ok(users)
}

fn map_source_error(error: UserSearchSourceError) -> SearchUsersError {
    match error {
        UserSearchSourceError::Unauthorized => SearchUsersError::Unauthorized,
        UserSearchSourceError::Unavailable => SearchUsersError::TemporarilyUnavailable,
        UserSearchSourceError::InvalidData => SearchUsersError::DataContractViolation,
    }
}
