pub mod config;
pub mod types;

pub use config::Config;
pub use types::*;

/// Marker substituted for a sensitive value.
pub const REDACTED_VALUE: &str = "[REDACTED]";

/// Command text recorded in place of a denied command.
pub const DENIED_PLACEHOLDER: &str = "[REDACTED BY POLICY]";
