use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config file at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to initialize logging: {0}")]
    LoggingInit(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("failed to resolve storage path: {details}")]
    StoragePathResolution { details: String },
    #[error("failed to create directory at {path}: {source}")]
    StorageDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session store I/O failed at {path}: {source}")]
    SessionStoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to lock session store at {path}: {source}")]
    SessionStoreLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session store at {path} is not valid TOML: {source}")]
    SessionStoreParse {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },
    #[error("no stored session; run `relochat login` first")]
    MissingSession,
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("terminal I/O failed: {0}")]
    TerminalIo(#[source] std::io::Error),
    #[error("failed to start socket runtime: {0}")]
    RuntimeInit(#[source] std::io::Error),
    #[error("failed to start REST worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}
