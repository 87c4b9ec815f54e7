use std::{
    fs::{self, File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use fs2::FileExt;
use toml_edit::{value, DocumentMut};

use crate::{
    domain::{ids::UserId, profile::LocalProfile},
    infra::{
        access_token::user_id_claim, contracts::SessionAdapter, error::AppError,
        storage_layout::StorageLayout,
    },
};

const ACCESS_TOKEN_KEY: &str = "access_token";
const USERNAME_KEY: &str = "username";
const USER_ID_KEY: &str = "user_id";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, USERNAME_KEY, USER_ID_KEY];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub access_token: String,
    pub profile: Option<LocalProfile>,
}

/// Key-value session file edited in place so unrelated keys and formatting
/// survive. Every access holds an exclusive lock on a sibling lock file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    file: PathBuf,
    lock_file: PathBuf,
}

impl SessionStore {
    pub fn new(file: impl Into<PathBuf>, lock_file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            lock_file: lock_file.into(),
        }
    }

    pub fn from_layout(layout: &StorageLayout) -> Self {
        Self::new(layout.session_file(), layout.session_lock_file())
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// `None` when no usable token is stored.
    pub fn load(&self) -> Result<Option<SessionInfo>, AppError> {
        self.with_lock(|| {
            let document = self.read_document()?;

            let Some(access_token) = string_value(&document, ACCESS_TOKEN_KEY) else {
                return Ok(None);
            };

            // Sessions stored without an id fall back to the token's claim.
            let user_id = string_value(&document, USER_ID_KEY)
                .map(UserId::new)
                .or_else(|| user_id_claim(&access_token));
            let profile = string_value(&document, USERNAME_KEY)
                .map(|username| LocalProfile::new(user_id, username));

            Ok(Some(SessionInfo {
                access_token,
                profile,
            }))
        })
    }

    pub fn save(
        &self,
        access_token: &str,
        username: &str,
        user_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.with_lock(|| {
            let mut document = self.read_document()?;

            document[ACCESS_TOKEN_KEY] = value(access_token);
            document[USERNAME_KEY] = value(username);
            match user_id {
                Some(user_id) => document[USER_ID_KEY] = value(user_id),
                None => {
                    document.remove(USER_ID_KEY);
                }
            }

            self.write_document(&document)
        })
    }

    /// Removes every session key and returns the ones that were present.
    pub fn clear(&self) -> Result<Vec<&'static str>, AppError> {
        self.with_lock(|| {
            if !self.file.exists() {
                return Ok(Vec::new());
            }

            let mut document = self.read_document()?;
            let removed: Vec<&'static str> = SESSION_KEYS
                .into_iter()
                .filter(|key| document.remove(key).is_some())
                .collect();

            if !removed.is_empty() {
                self.write_document(&document)?;
            }

            Ok(removed)
        })
    }

    fn with_lock<T>(&self, action: impl FnOnce() -> Result<T, AppError>) -> Result<T, AppError> {
        let lock = self.open_lock_file()?;
        lock.lock_exclusive()
            .map_err(|source| AppError::SessionStoreLock {
                path: self.lock_file.clone(),
                source,
            })?;

        let result = action();
        let _ = FileExt::unlock(&lock);
        result
    }

    fn open_lock_file(&self) -> Result<File, AppError> {
        if let Some(parent) = self.lock_file.parent() {
            fs::create_dir_all(parent).map_err(|source| AppError::StorageDirCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|source| AppError::SessionStoreLock {
                path: self.lock_file.clone(),
                source,
            })
    }

    fn read_document(&self) -> Result<DocumentMut, AppError> {
        let raw = match fs::read_to_string(&self.file) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(DocumentMut::new()),
            Err(source) => {
                return Err(AppError::SessionStoreIo {
                    path: self.file.clone(),
                    source,
                })
            }
        };

        raw.parse::<DocumentMut>()
            .map_err(|source| AppError::SessionStoreParse {
                path: self.file.clone(),
                source,
            })
    }

    fn write_document(&self, document: &DocumentMut) -> Result<(), AppError> {
        let temp_file = self.file.with_extension("toml.tmp");

        fs::write(&temp_file, document.to_string()).map_err(|source| {
            AppError::SessionStoreIo {
                path: temp_file.clone(),
                source,
            }
        })?;

        fs::rename(&temp_file, &self.file).map_err(|source| AppError::SessionStoreIo {
            path: self.file.clone(),
            source,
        })
    }
}

impl SessionAdapter for SessionStore {
    fn load_session(&self) -> Result<Option<SessionInfo>, AppError> {
        self.load()
    }

    fn save_session(
        &mut self,
        access_token: &str,
        username: &str,
        user_id: Option<&str>,
    ) -> Result<(), AppError> {
        self.save(access_token, username, user_id)
    }

    fn clear_session(&mut self) -> Result<Vec<&'static str>, AppError> {
        self.clear()
    }
}

fn string_value(document: &DocumentMut, key: &str) -> Option<String> {
    document
        .get(key)
        .and_then(|item| item.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}
