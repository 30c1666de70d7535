use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

/// Construction-time policy errors. Applying a built policy never fails.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("denylist pattern cannot be empty")]
    EmptyPattern,

    #[error("invalid denylist pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("parse policy config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("read policy config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
