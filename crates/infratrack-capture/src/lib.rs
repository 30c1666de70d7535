//! Capture collaborators: the wrapped command runner and the shell-hook
//! recorder, both feeding sanitized steps into a [`SessionStore`].
//!
//! [`SessionStore`]: infratrack_store::SessionStore

pub mod error;
pub mod hooks_state;
pub mod recorder;
pub mod runner;

pub use error::{CaptureError, Result};
pub use hooks_state::{FileStateStore, HookState, StateStore};
pub use recorder::{parse_exit_code, RecordInput, RecordOutcome, Recorder, SkipReason};
pub use runner::{join_command, run_command, RunOutcome};
