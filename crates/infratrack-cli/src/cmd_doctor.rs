use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use infratrack_store::{JsonStore, SessionStore};

use crate::output::Ui;

/// Tools worth knowing about, none of them required.
const OPTIONAL_TOOLS: &[&str] = &["kubectl", "docker", "terraform"];

#[derive(Debug)]
pub struct Report {
    pub initialized: bool,
    pub writable: Result<(), String>,
    pub executable: Option<PathBuf>,
    pub tools: Vec<(&'static str, Option<PathBuf>)>,
}

/// Run every check against `store`. Only a failure to inspect the store
/// itself is an error; everything else lands in the report.
pub fn diagnose(store: &JsonStore) -> anyhow::Result<Report> {
    let initialized = store
        .is_initialized()
        .context("doctor: check initialization")?;
    let path_var = std::env::var_os("PATH").unwrap_or_default();

    Ok(Report {
        initialized,
        writable: check_writable(store.root_dir()).map_err(|e| format!("{e:#}")),
        executable: find_in_path(&path_var, "infratrack"),
        tools: OPTIONAL_TOOLS
            .iter()
            .map(|tool| (*tool, find_in_path(&path_var, tool)))
            .collect(),
    })
}

pub fn execute(store: &JsonStore, ui: Ui) -> anyhow::Result<()> {
    let paths = store.paths();
    println!("=== Doctor ===");
    println!();
    println!("OS: {}/{}", std::env::consts::OS, std::env::consts::ARCH);
    println!("Root dir: {}", paths.root.display());
    println!("Config file: {}", paths.config_yaml.display());
    println!("Sessions store: {}", paths.sessions_jsonl.display());
    println!("Active session file: {}", paths.active_json.display());

    let report = diagnose(store)?;
    if report.initialized {
        ui.ok("Initialization");
    } else {
        ui.warn("Initialization: not initialized");
        ui.hint("Run `infratrack init`.");
    }

    match &report.writable {
        Ok(()) => ui.ok("Writable check"),
        Err(e) => ui.error(format!("Writable check failed ({e})")),
    }

    match &report.executable {
        Some(path) => ui.ok(format!(
            "Command executable `infratrack` in PATH: yes ({})",
            path.display()
        )),
        None => {
            ui.warn("Command executable `infratrack` in PATH: no");
            if cfg!(windows) {
                ui.hint("If installed with winget, open a new terminal session.");
            }
        }
    }

    println!("=== Tool Availability ===");
    for (tool, found) in &report.tools {
        match found {
            Some(path) => println!("- {tool} (optional): OK ({})", path.display()),
            None => println!("- {tool} (optional): MISSING"),
        }
    }
    Ok(())
}

/// Create the root if needed and prove a file can be created and removed
/// there.
fn check_writable(root: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(root).context("create root dir")?;
    let scratch = tempfile::Builder::new()
        .prefix("doctor-write-")
        .tempfile_in(root)
        .context("create temp file")?;
    scratch.close().context("remove temp file")?;
    Ok(())
}

/// First `name` executable in a `PATH`-style list.
fn find_in_path(path_var: &OsStr, name: &str) -> Option<PathBuf> {
    let exe = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(&exe))
        .find(|candidate| candidate.is_file())
}
