use std::path::Path;

use anyhow::Context;
use infratrack_capture::{join_command, run_command};
use infratrack_core::{Step, DENIED_PLACEHOLDER};
use infratrack_policy::Policy;
use infratrack_store::{JsonStore, SessionStore};
use time::OffsetDateTime;

use crate::explain;
use crate::output::{self, Ui};

/// Exit code for a command the denylist refused to run.
pub const EXIT_BLOCKED: i32 = 2;

pub fn execute(
    store: &JsonStore,
    argv: &[String],
    block_denied: bool,
    ui: Ui,
) -> anyhow::Result<i32> {
    if argv.is_empty() {
        anyhow::bail!("usage: infratrack run -- <command> [args...]");
    }
    store.active_session().map_err(explain)?;

    let policy = crate::load_policy(store);
    let cwd = std::env::current_dir().context("get working directory")?;
    run_with_policy(store, &policy, argv, &cwd, block_denied, ui)
}

/// Sanitize, optionally block, execute and record. Returns the exit code the
/// CLI should end with: the child's own code when it ran.
pub(crate) fn run_with_policy(
    store: &JsonStore,
    policy: &Policy,
    argv: &[String],
    cwd: &Path,
    block_denied: bool,
    ui: Ui,
) -> anyhow::Result<i32> {
    let raw = join_command(argv);
    let sanitized = policy.apply(&raw, argv);
    let cwd_text = cwd.display().to_string();

    if sanitized.denied && (block_denied || policy.enforce_denylist()) {
        let step = Step::blocked(OffsetDateTime::now_utc(), sanitized.command).with_cwd(cwd_text);
        store.add_step(step).context("record blocked step")?;
        ui.warn(format!(
            "Command blocked by policy denylist. Step recorded as {DENIED_PLACEHOLDER}."
        ));
        return Ok(EXIT_BLOCKED);
    }

    let outcome = run_command(argv, Some(cwd))?;
    let step = outcome
        .to_step(sanitized.command.as_str(), sanitized.denied)
        .with_cwd(cwd_text);
    let (duration_ms, exit_code) = (step.duration_ms, step.exit_code);
    store.add_step(step).map_err(explain).context("record step")?;

    if let Some(err) = &outcome.start_error {
        ui.error(format!("command execution failed: {err}"));
        if cfg!(windows) && is_windows_shell_builtin(&argv[0]) {
            ui.hint(format!(
                "{:?} is a Windows shell builtin. Try `infratrack run -- cmd /c {}`.",
                argv[0], sanitized.command
            ));
        }
    } else if !outcome.succeeded() {
        ui.warn(format!(
            "Recorded failed step ({duration_ms} ms, exit {})",
            output::exit_code(exit_code)
        ));
    } else {
        ui.ok(format!(
            "Recorded step ({duration_ms} ms, exit {})",
            output::exit_code(exit_code)
        ));
    }
    Ok(outcome.cli_exit_code)
}

fn is_windows_shell_builtin(program: &str) -> bool {
    matches!(
        program.to_ascii_lowercase().as_str(),
        "echo" | "dir" | "copy" | "type" | "del" | "erase" | "move" | "ren" | "rename" | "set"
    )
}
