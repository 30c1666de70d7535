use std::path::PathBuf;
use thiserror::Error;

use infratrack_store::StoreError;

pub type Result<T> = std::result::Result<T, CaptureError>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("command cannot be empty")]
    EmptyCommand,

    #[error("invalid exit code {value:?}: {source}")]
    InvalidExitCode {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("read hooks state {}: {source}", path.display())]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode hooks state {}: {source}", path.display())]
    StateDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("write hooks state {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("encode hooks state: {0}")]
    StateEncode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
