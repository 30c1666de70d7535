use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use infratrack_core::{Config, Session, Step};
use time::OffsetDateTime;

use crate::atomic::{write_atomic, AtomicOptions};
use crate::error::{Result, StoreError};
use crate::lock::{LockOptions, StoreLock};
use crate::log::{self, MAX_RECORD_BYTES};
use crate::paths::StorePaths;

/// Persistence contract for recording sessions.
///
/// At most one session is active store-wide. Every mutating call runs its
/// whole read-modify-write under the store lock, so concurrent processes
/// never lose each other's updates.
pub trait SessionStore {
    /// Create the root, the default config (if absent) and the log. Idempotent.
    fn init(&self) -> Result<()>;
    /// True iff the config file exists and is a regular file.
    fn is_initialized(&self) -> Result<bool>;
    fn root_dir(&self) -> &Path;
    fn start_session(
        &self,
        title: &str,
        env: Option<&str>,
        started_at: OffsetDateTime,
    ) -> Result<Session>;
    fn active_session(&self) -> Result<Session>;
    fn add_step(&self, step: Step) -> Result<()>;
    fn stop_session(&self, ended_at: OffsetDateTime) -> Result<Session>;
    fn last_session(&self) -> Result<Session>;
    /// Most recent first. `limit == 0` or larger than the log means all.
    fn list_sessions(&self, limit: usize) -> Result<Vec<Session>>;
    fn session_by_id(&self, id: &str) -> Result<Session>;
}

const CONFIG_HEADER: &str = "\
# InfraTrack configuration.
# policy.denylist: glob patterns ('*' = anything, space = any whitespace);
#   a matching command is stored as [REDACTED BY POLICY].
# policy.enforce_denylist: when true, denied commands are not executed.
";

/// File-backed store: YAML config, JSONL completed log, JSON active session.
#[derive(Debug, Clone)]
pub struct JsonStore {
    paths: StorePaths,
    lock_opts: LockOptions,
    write_opts: AtomicOptions,
    record_limit: usize,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            paths: StorePaths::discover(root),
            lock_opts: LockOptions::default(),
            write_opts: AtomicOptions::default(),
            record_limit: MAX_RECORD_BYTES,
        }
    }

    pub fn with_lock_options(mut self, opts: LockOptions) -> Self {
        self.lock_opts = opts;
        self
    }

    pub fn with_write_options(mut self, opts: AtomicOptions) -> Self {
        self.write_opts = opts;
        self
    }

    /// Per-line byte bound when reading the completed log.
    pub fn with_record_limit(mut self, bytes: usize) -> Self {
        self.record_limit = bytes;
        self
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    fn require_initialized(&self) -> Result<()> {
        if self.is_initialized()? {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn lock(&self) -> Result<StoreLock> {
        StoreLock::acquire(&self.paths.lock_file, self.lock_opts)
    }

    fn read_active(&self) -> Result<Session> {
        let data = match std::fs::read(&self.paths.active_json) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NoActiveSession),
            Err(e) => return Err(StoreError::io("read active session")(e)),
        };
        serde_json::from_slice(&data).map_err(|source| StoreError::Decode {
            path: self.paths.active_json.clone(),
            line: 1,
            source,
        })
    }

    fn write_active(&self, session: &Session) -> Result<()> {
        let data = serde_json::to_vec(session)?;
        write_atomic(&self.paths.active_json, &data, self.write_opts)
            .map_err(StoreError::io("write active session"))
    }

    fn ensure_root(&self) -> Result<()> {
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&self.paths.root)
            .map_err(StoreError::io("create root directory"))
    }

    fn ensure_config(&self) -> Result<()> {
        if self.paths.config_yaml.exists() {
            return Ok(());
        }
        let body = Config::default().to_yaml()?;
        let text = format!("{CONFIG_HEADER}{body}");
        write_atomic(&self.paths.config_yaml, text.as_bytes(), self.write_opts)
            .map_err(StoreError::io("write config file"))
    }
}

impl SessionStore for JsonStore {
    fn init(&self) -> Result<()> {
        self.ensure_root()?;
        self.ensure_config()?;
        log::open_append(&self.paths.sessions_jsonl)
            .map_err(StoreError::io("create sessions file"))?;
        tracing::debug!(root = %self.paths.root.display(), "store initialized");
        Ok(())
    }

    fn is_initialized(&self) -> Result<bool> {
        match std::fs::metadata(&self.paths.config_yaml) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("stat config file")(e)),
        }
    }

    fn root_dir(&self) -> &Path {
        &self.paths.root
    }

    fn start_session(
        &self,
        title: &str,
        env: Option<&str>,
        started_at: OffsetDateTime,
    ) -> Result<Session> {
        self.require_initialized()?;
        let _lock = self.lock()?;

        match self.paths.active_json.try_exists() {
            Ok(true) => return Err(StoreError::ActiveSessionExists),
            Ok(false) => {}
            Err(e) => return Err(StoreError::io("check active session")(e)),
        }

        let session = Session::new(title, env, started_at);
        self.write_active(&session)?;
        tracing::info!(id = %session.id, title = %session.title, "session started");
        Ok(session)
    }

    fn active_session(&self) -> Result<Session> {
        self.require_initialized()?;
        self.read_active()
    }

    fn add_step(&self, step: Step) -> Result<()> {
        self.require_initialized()?;
        let _lock = self.lock()?;

        // Re-read under the lock; another process may have appended since
        // the caller last looked.
        let mut session = self.read_active()?;
        session.steps.push(step);
        self.write_active(&session)?;
        tracing::debug!(id = %session.id, steps = session.steps.len(), "step recorded");
        Ok(())
    }

    fn stop_session(&self, ended_at: OffsetDateTime) -> Result<Session> {
        self.require_initialized()?;
        let _lock = self.lock()?;

        let mut session = self.read_active()?;

        // Append first: a crash before the delete leaves a retryable active
        // file, never a lost record. A retry finds the record already logged.
        match log::read_last(&self.paths.sessions_jsonl, self.record_limit)? {
            Some(logged) if logged.id == session.id => {
                tracing::debug!(id = %session.id, "session already logged, finishing stop");
                session = logged;
            }
            _ => {
                session.ended_at = Some(ended_at.to_offset(time::UtcOffset::UTC));
                log::append_record(&self.paths.sessions_jsonl, &session)?;
            }
        }
        match std::fs::remove_file(&self.paths.active_json) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io("remove active session")(e)),
        }

        tracing::info!(id = %session.id, steps = session.steps.len(), "session stopped");
        Ok(session)
    }

    fn last_session(&self) -> Result<Session> {
        self.require_initialized()?;
        log::read_last(&self.paths.sessions_jsonl, self.record_limit)?
            .ok_or(StoreError::NoSessions)
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        self.require_initialized()?;
        let sessions = log::read_all(&self.paths.sessions_jsonl, self.record_limit)?;
        if sessions.is_empty() {
            return Err(StoreError::NoSessions);
        }
        let limit = if limit == 0 { sessions.len() } else { limit };
        Ok(sessions.into_iter().rev().take(limit).collect())
    }

    fn session_by_id(&self, id: &str) -> Result<Session> {
        self.require_initialized()?;
        let sessions = log::read_all(&self.paths.sessions_jsonl, self.record_limit)?;
        if sessions.is_empty() {
            return Err(StoreError::NoSessions);
        }
        sessions
            .into_iter()
            .rev()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::SessionNotFound { id: id.to_string() })
    }
}
