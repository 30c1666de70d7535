//! Session store: a config file, an append-only log of completed sessions
//! and a single active-session file, all under one root directory.
//!
//! Mutations are serialized across processes by a lock sentinel next to the
//! active file, and every rewrite of the active file goes through
//! [`write_atomic`], so a crash leaves either the previous or the next state
//! on disk and never a partial one.

pub mod atomic;
pub mod error;
pub mod lock;
pub mod log;
pub mod paths;
pub mod store;

pub use atomic::{write_atomic, AtomicOptions};
pub use error::{Result, StoreError};
pub use lock::{LockOptions, StoreLock};
pub use log::MAX_RECORD_BYTES;
pub use paths::{default_root, StorePaths};
pub use store::{JsonStore, SessionStore};
