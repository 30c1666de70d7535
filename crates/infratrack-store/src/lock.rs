use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, StoreError};

/// Attempts before giving up on a held lock.
pub const LOCK_ATTEMPTS: u32 = 100;
/// Backoff unit; attempt `n` sleeps `n × LOCK_BACKOFF`.
pub const LOCK_BACKOFF: Duration = Duration::from_millis(2);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    pub attempts: u32,
    pub backoff: Duration,
    /// Break a sentinel older than this. Off by default: age alone cannot
    /// tell a dead holder from a slow one, so only set it where no holder
    /// ever keeps the lock that long.
    pub stale_after: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            attempts: LOCK_ATTEMPTS,
            backoff: LOCK_BACKOFF,
            stale_after: None,
        }
    }
}

/// Cross-process mutex backed by the existence of a sentinel file.
///
/// The sentinel is created exclusively and carries an owner token. The guard
/// removes it on drop only while the token is still its own, so a holder
/// whose lock was broken never releases its successor's.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    token: String,
    file: Option<File>,
}

impl StoreLock {
    /// Acquire the lock at `path`, retrying with linear backoff while another
    /// holder owns it. Fails with [`StoreError::LockTimeout`] once all
    /// attempts are used.
    pub fn acquire(path: &Path, opts: LockOptions) -> Result<Self> {
        let attempts = opts.attempts.max(1);
        let token = owner_token();
        for attempt in 1..=attempts {
            match create_sentinel(path, &token) {
                Ok(file) => {
                    tracing::trace!(path = %path.display(), attempt, "store lock acquired");
                    return Ok(Self {
                        path: path.to_path_buf(),
                        token,
                        file: Some(file),
                    });
                }
                Err(e) if is_contention(&e) => {
                    if break_if_stale(path, opts.stale_after) {
                        continue;
                    }
                    tracing::debug!(path = %path.display(), attempt, "store lock busy");
                    if attempt < attempts {
                        std::thread::sleep(opts.backoff * attempt);
                    }
                }
                Err(e) => return Err(StoreError::io("acquire store lock")(e)),
            }
        }
        tracing::warn!(path = %path.display(), attempts, "store lock timeout");
        Err(StoreError::LockTimeout {
            path: path.to_path_buf(),
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        // Close before removing; Windows cannot delete an open file.
        drop(self.file.take());
        match std::fs::read_to_string(&self.path) {
            Ok(found) if found == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    if e.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %self.path.display(), error = %e, "failed to remove store lock");
                    }
                }
            }
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "store lock was broken while held");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %self.path.display(), "store lock was broken while held");
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read store lock");
            }
        }
    }
}

/// Unique per acquisition: pid, wall-clock nanos and a process counter.
fn owner_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}

fn create_sentinel(path: &Path, token: &str) -> std::io::Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    if let Err(e) = file.write_all(token.as_bytes()) {
        drop(file);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(file)
}

fn is_contention(err: &std::io::Error) -> bool {
    if err.kind() == ErrorKind::AlreadyExists {
        return true;
    }
    // Antivirus and indexers briefly deny access on Windows.
    cfg!(windows) && err.kind() == ErrorKind::PermissionDenied
}

/// Break the sentinel if it is older than `stale_after`. Returns true when
/// the caller should retry immediately.
///
/// The sentinel is renamed aside first, so only one waiter can take it, and
/// deleted only if it still holds the token judged stale. A fresh sentinel
/// caught by the rename is linked back in place.
fn break_if_stale(path: &Path, stale_after: Option<Duration>) -> bool {
    let Some(limit) = stale_after else {
        return false;
    };
    let age = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok());
    let Some(age) = age.filter(|age| *age > limit) else {
        return false;
    };
    let Ok(stale_token) = std::fs::read_to_string(path) else {
        return false;
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let aside = path.with_file_name(format!("{file_name}.stale-{}", owner_token()));
    if std::fs::rename(path, &aside).is_err() {
        // Someone else moved or released it first.
        return false;
    }

    let taken = std::fs::read_to_string(&aside).unwrap_or_default();
    if taken != stale_token {
        if let Err(e) = std::fs::hard_link(&aside, path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to restore store lock");
        }
        let _ = std::fs::remove_file(&aside);
        return false;
    }

    tracing::warn!(path = %path.display(), age_ms = age.as_millis() as u64, "breaking stale store lock");
    let _ = std::fs::remove_file(&aside);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> LockOptions {
        LockOptions {
            attempts: 3,
            backoff: Duration::from_millis(1),
            stale_after: None,
        }
    }

    #[test]
    fn acquire_and_drop_removes_sentinel() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("active_session.json.lock");
        let lock = StoreLock::acquire(&path, quick()).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path.as_path());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn held_lock_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        let _held = StoreLock::acquire(&path, quick()).unwrap();
        let err = StoreLock::acquire(&path, quick()).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { attempts: 3, .. }));
    }

    #[test]
    fn lock_is_reacquirable_after_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        drop(StoreLock::acquire(&path, quick()).unwrap());
        let _again = StoreLock::acquire(&path, quick()).unwrap();
    }

    #[test]
    fn stale_sentinel_is_broken() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        std::fs::write(&path, b"").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let opts = LockOptions {
            stale_after: Some(Duration::from_millis(5)),
            ..quick()
        };
        let _lock = StoreLock::acquire(&path, opts).unwrap();
    }

    #[test]
    fn slow_holder_keeps_the_lock_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        let held = StoreLock::acquire(&path, LockOptions::default()).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let err = StoreLock::acquire(&path, quick()).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        drop(held);
        assert!(!path.exists());
    }

    #[test]
    fn broken_holder_does_not_release_its_successor() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        let stale = LockOptions {
            stale_after: Some(Duration::from_millis(20)),
            ..quick()
        };
        let first = StoreLock::acquire(&path, stale).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let second = StoreLock::acquire(&path, stale).unwrap();
        drop(first);
        assert!(path.exists());
        assert!(matches!(
            StoreLock::acquire(&path, quick()),
            Err(StoreError::LockTimeout { .. })
        ));

        drop(second);
        assert!(!path.exists());
    }

    #[test]
    fn sentinel_carries_a_unique_token() {
        let tmp = tempfile::tempdir().unwrap();
        let a = StoreLock::acquire(&tmp.path().join("a.lock"), quick()).unwrap();
        let b = StoreLock::acquire(&tmp.path().join("b.lock"), quick()).unwrap();
        let token = std::fs::read_to_string(a.path()).unwrap();
        assert_eq!(token, a.token);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn breaking_leaves_no_aside_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.lock");
        std::fs::write(&path, b"dead-holder").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let opts = LockOptions {
            stale_after: Some(Duration::from_millis(5)),
            ..quick()
        };
        drop(StoreLock::acquire(&path, opts).unwrap());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_parent_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("no/such/dir/x.lock");
        let err = StoreLock::acquire(&path, quick()).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
