use std::path::{Path, PathBuf};

/// Well-known artifacts under a store root.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub root: PathBuf,
    pub config_yaml: PathBuf,
    pub sessions_jsonl: PathBuf,
    pub active_json: PathBuf,
    pub lock_file: PathBuf,
}

impl StorePaths {
    /// Derive all paths from a root directory. Pure computation, no I/O.
    pub fn discover(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let active_json = root.join("active_session.json");
        Self {
            config_yaml: root.join("config.yaml"),
            sessions_jsonl: root.join("sessions.jsonl"),
            lock_file: sibling_with_suffix(&active_json, ".lock"),
            active_json,
            root,
        }
    }
}

/// `<path><suffix>` next to `path`, e.g. `active_session.json.lock`.
pub(crate) fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Per-user store root: `<config dir>/infratrack`.
/// Linux `~/.config/infratrack`, macOS `~/Library/Application Support/infratrack`,
/// Windows `%APPDATA%\infratrack` (falls back to `~/.infratrack`).
pub fn default_root() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        dir.join("infratrack")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".infratrack")
    } else {
        PathBuf::from(".infratrack")
    }
}
