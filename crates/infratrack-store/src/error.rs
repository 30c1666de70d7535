use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store failures, distinguishable by variant so callers can branch on kind.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store is not initialized")]
    NotInitialized,

    #[error("active session already exists")]
    ActiveSessionExists,

    #[error("no active session")]
    NoActiveSession,

    #[error("no completed sessions")]
    NoSessions,

    #[error("session not found: {id}")]
    SessionNotFound { id: String },

    #[error("timed out acquiring store lock {} after {attempts} attempts", path.display())]
    LockTimeout { path: PathBuf, attempts: u32 },

    #[error("decode {} line {line}: {source}", path.display())]
    Decode {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("record on line {line} of {} exceeds {limit} bytes", path.display())]
    RecordTooLarge {
        path: PathBuf,
        line: usize,
        limit: usize,
    },

    #[error("encode session: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("encode default config: {0}")]
    ConfigEncode(#[from] serde_yaml::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| StoreError::Io { context, source }
    }
}
