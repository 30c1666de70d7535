use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use infratrack_store::{write_atomic, AtomicOptions, LockOptions, StoreLock};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CaptureError, Result};

pub const DEFAULT_REMIND_EVERY: u32 = 20;
pub const HOOKS_STATE_FILE: &str = "hooks_state.json";

/// Persistent shell-hook mode: on/off switch plus the reminder counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_remind_every", deserialize_with = "lenient_u32")]
    pub remind_every: u32,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub command_count: u64,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Default for HookState {
    fn default() -> Self {
        Self {
            enabled: false,
            remind_every: DEFAULT_REMIND_EVERY,
            command_count: 0,
            updated_at: None,
        }
    }
}

impl HookState {
    /// True when the `command_count`-th recorded command should remind the
    /// user that recording is on. `remind_every == 0` turns reminders off.
    pub fn reminder_due(&self) -> bool {
        self.enabled && self.remind_every > 0 && self.command_count % u64::from(self.remind_every) == 0
    }
}

fn default_remind_every() -> u32 {
    DEFAULT_REMIND_EVERY
}

// Hand-edited files may carry negative numbers; treat them as unset.
fn lenient_u32<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    let v = i64::deserialize(d)?;
    Ok(u32::try_from(v).unwrap_or(DEFAULT_REMIND_EVERY))
}

fn lenient_u64<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let v = i64::deserialize(d)?;
    Ok(u64::try_from(v).unwrap_or(0))
}

/// Load/save seam for hook state.
pub trait StateStore {
    fn load(&self) -> Result<HookState>;
    fn save(&self, state: &HookState) -> Result<()>;

    /// Read-modify-write; returns the state as saved. Implementations shared
    /// between processes must make this atomic with respect to each other.
    fn update(&self, apply: &mut dyn FnMut(&mut HookState)) -> Result<HookState> {
        let mut state = self.load()?;
        apply(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}

/// `<root>/hooks_state.json`, rewritten atomically.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
    lock_opts: LockOptions,
}

impl FileStateStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(HOOKS_STATE_FILE),
            lock_opts: LockOptions::default(),
        }
    }

    pub fn with_lock_options(mut self, opts: LockOptions) -> Self {
        self.lock_opts = opts;
        self
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| CaptureError::StateWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    /// A missing file is the default state (hooks disabled).
    fn load(&self) -> Result<HookState> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HookState::default()),
            Err(source) => {
                return Err(CaptureError::StateRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice(&data).map_err(|source| CaptureError::StateDecode {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, state: &HookState) -> Result<()> {
        let mut state = state.clone();
        state.updated_at = Some(OffsetDateTime::now_utc());
        let data = serde_json::to_vec_pretty(&state)?;

        self.ensure_dir()?;
        write_atomic(&self.path, &data, AtomicOptions::default()).map_err(|source| {
            CaptureError::StateWrite {
                path: self.path.clone(),
                source,
            }
        })?;
        tracing::debug!(enabled = state.enabled, count = state.command_count, "hooks state saved");
        Ok(())
    }

    /// Runs under `hooks_state.json.lock` so concurrent hooks never lose an
    /// increment.
    fn update(&self, apply: &mut dyn FnMut(&mut HookState)) -> Result<HookState> {
        self.ensure_dir()?;
        let _lock = StoreLock::acquire(&self.lock_path(), self.lock_opts)?;
        let mut state = self.load()?;
        apply(&mut state);
        self.save(&state)?;
        Ok(state)
    }
}
