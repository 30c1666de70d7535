//! Atomic file replacement.
//!
//! A new version is written to a temporary file in the target's directory,
//! synced, and renamed over the target. Rename is the only step that makes
//! new content visible, so readers see either the old file or the new one.
//!
//! Renaming over a file another process holds open fails on Windows. The
//! rename is retried with backoff, and each failed attempt may fall back to
//! a three-step swap (victim aside, new into place, victim deleted) that
//! puts the victim back if the middle step fails.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::sibling_with_suffix;

pub const RENAME_ATTEMPTS: u32 = 6;
/// Attempt `n` sleeps `n × RENAME_BACKOFF` before retrying.
pub const RENAME_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct AtomicOptions {
    pub attempts: u32,
    pub backoff: Duration,
    pub swap_fallback: bool,
}

impl Default for AtomicOptions {
    fn default() -> Self {
        Self {
            attempts: RENAME_ATTEMPTS,
            backoff: RENAME_BACKOFF,
            swap_fallback: cfg!(windows),
        }
    }
}

/// The filesystem calls the replacement protocol depends on.
pub(crate) trait FsOps {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()>;
    fn remove_file(&self, path: &Path) -> std::io::Result<()>;
}

pub(crate) struct RealFs;

impl FsOps for RealFs {
    fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
        std::fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// Atomically replace `path` with `data`.
pub fn write_atomic(path: &Path, data: &[u8], opts: AtomicOptions) -> std::io::Result<()> {
    write_atomic_with(&RealFs, path, data, opts)
}

pub(crate) fn write_atomic_with(
    ops: &dyn FsOps,
    path: &Path,
    data: &[u8],
    opts: AtomicOptions,
) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{base}.tmp-"))
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    // Closes the handle; the path is still deleted on drop unless kept.
    let tmp_path = tmp.into_temp_path();

    let attempts = opts.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match ops.rename(&tmp_path, path) {
            Ok(()) => {
                disarm(tmp_path);
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), attempt, error = %e, "atomic rename failed");
                last_err = Some(e);
            }
        }
        if opts.swap_fallback {
            match swap_into_place(ops, path, &tmp_path) {
                Ok(()) => {
                    disarm(tmp_path);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), attempt, error = %e, "swap fallback failed");
                    last_err = Some(e);
                }
            }
        }
        if attempt < attempts {
            std::thread::sleep(opts.backoff * attempt);
        }
    }
    // tmp_path drops here and removes the temporary file.
    Err(last_err.unwrap_or_else(|| std::io::Error::other("rename temp file")))
}

/// The temp file now lives at the target path; do not delete it on drop.
fn disarm(tmp_path: tempfile::TempPath) {
    let _ = tmp_path.keep();
}

/// States of the three-step swap.
#[derive(Debug)]
enum SwapState {
    /// Nothing moved yet.
    Start,
    /// The old target sits at the backup path; the target path is vacant.
    VictimAside,
    /// New content is at the target path; the backup is garbage.
    Installed,
    /// Installing failed; the victim must be moved back.
    Restoring(std::io::Error),
}

/// Replace `dst` with `src` by moving `dst` aside first. On failure the
/// original `dst` is restored before the error is returned.
pub(crate) fn swap_into_place(ops: &dyn FsOps, dst: &Path, src: &Path) -> std::io::Result<()> {
    let backup = backup_path(dst);
    let mut state = SwapState::Start;
    loop {
        state = match state {
            SwapState::Start => match ops.rename(dst, &backup) {
                Ok(()) => SwapState::VictimAside,
                // No victim: a plain rename is all that is needed.
                Err(e) if e.kind() == ErrorKind::NotFound => return ops.rename(src, dst),
                Err(e) => return Err(e),
            },
            SwapState::VictimAside => match ops.rename(src, dst) {
                Ok(()) => SwapState::Installed,
                Err(e) => SwapState::Restoring(e),
            },
            SwapState::Installed => {
                if let Err(e) = ops.remove_file(&backup) {
                    tracing::warn!(path = %backup.display(), error = %e, "failed to delete swap backup");
                }
                return Ok(());
            }
            SwapState::Restoring(install_err) => {
                if let Err(e) = ops.rename(&backup, dst) {
                    tracing::warn!(
                        path = %dst.display(),
                        backup = %backup.display(),
                        error = %e,
                        "failed to restore original after swap failure"
                    );
                }
                return Err(install_err);
            }
        };
    }
}

fn backup_path(dst: &Path) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    sibling_with_suffix(dst, &format!(".bak-{nanos}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn no_wait(swap_fallback: bool) -> AtomicOptions {
        AtomicOptions {
            attempts: 3,
            backoff: Duration::from_millis(1),
            swap_fallback,
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Fails any rename whose destination matches `fail_to`, `failures` times.
    struct Flaky {
        fail_to: PathBuf,
        failures: RefCell<u32>,
        calls: RefCell<Vec<(PathBuf, PathBuf)>>,
    }

    impl Flaky {
        fn new(fail_to: &Path, failures: u32) -> Self {
            Self {
                fail_to: fail_to.to_path_buf(),
                failures: RefCell::new(failures),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl FsOps for Flaky {
        fn rename(&self, from: &Path, to: &Path) -> std::io::Result<()> {
            self.calls
                .borrow_mut()
                .push((from.to_path_buf(), to.to_path_buf()));
            let mut left = self.failures.borrow_mut();
            if to == self.fail_to && *left > 0 {
                *left -= 1;
                return Err(std::io::Error::new(
                    ErrorKind::PermissionDenied,
                    "sharing violation",
                ));
            }
            std::fs::rename(from, to)
        }

        fn remove_file(&self, path: &Path) -> std::io::Result<()> {
            std::fs::remove_file(path)
        }
    }

    #[test]
    fn writes_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        write_atomic(&path, b"{\"a\":1}", no_wait(false)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
        assert_eq!(dir_entries(tmp.path()), vec!["state.json"]);
    }

    #[test]
    fn overwrites_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        write_atomic(&path, b"old", no_wait(false)).unwrap();
        write_atomic(&path, b"new", no_wait(false)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn failure_before_rename_leaves_target_intact() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, b"committed").unwrap();

        let ops = Flaky::new(&path, u32::MAX);
        let err = write_atomic_with(&ops, &path, b"half-written", no_wait(false)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "committed");
        // the temporary file is cleaned up
        assert_eq!(dir_entries(tmp.path()), vec!["state.json"]);
        assert_eq!(ops.calls.borrow().len(), 3);
    }

    #[test]
    fn transient_rename_failure_is_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, b"old").unwrap();

        let ops = Flaky::new(&path, 2);
        write_atomic_with(&ops, &path, b"new", no_wait(false)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(dir_entries(tmp.path()), vec!["state.json"]);
    }

    #[test]
    fn swap_fallback_installs_after_rename_over_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, b"old").unwrap();

        // first rename onto the target fails, the swap's install succeeds
        let ops = Flaky::new(&path, 1);
        write_atomic_with(&ops, &path, b"new", no_wait(true)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // no backup or temp file is left behind
        assert_eq!(dir_entries(tmp.path()), vec!["state.json"]);
    }

    #[test]
    fn swap_restores_victim_when_install_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("state.json");
        let src = tmp.path().join("incoming");
        std::fs::write(&dst, b"old").unwrap();
        std::fs::write(&src, b"new").unwrap();

        // src -> dst fails once; backup -> dst (restore) then succeeds
        let ops = Flaky::new(&dst, 1);
        assert!(swap_into_place(&ops, &dst, &src).is_err());
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "old");
        assert_eq!(std::fs::read_to_string(&src).unwrap(), "new");
        assert_eq!(dir_entries(tmp.path()), vec!["incoming", "state.json"]);
    }

    #[test]
    fn swap_without_victim_is_plain_rename() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("state.json");
        let src = tmp.path().join("incoming");
        std::fs::write(&src, b"new").unwrap();
        swap_into_place(&RealFs, &dst, &src).unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "new");
        assert!(!src.exists());
    }
}
