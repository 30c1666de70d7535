//! Run a command with the terminal attached and classify how it ended.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use infratrack_core::{Step, StepReason, StepStatus};
use time::OffsetDateTime;

use crate::error::{CaptureError, Result};

/// Exit code reported when the program could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the program was found but could not start.
pub const EXIT_START_FAILED: i32 = 1;

/// What happened to one executed command.
#[derive(Debug)]
pub struct RunOutcome {
    pub started_at: OffsetDateTime,
    pub duration: Duration,
    pub status: StepStatus,
    pub reason: StepReason,
    /// Present only when the process ran to an exit code.
    pub exit_code: Option<i32>,
    /// Code the wrapping CLI should exit with.
    pub cli_exit_code: i32,
    /// Spawn failure, if the process never started.
    pub start_error: Option<std::io::Error>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Ok
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Build the step to record. `denied` marks a command that the policy
    /// replaced but that was still executed.
    pub fn to_step(&self, command: impl Into<String>, denied: bool) -> Step {
        let (ts, ms) = (self.started_at, self.duration_ms());
        if denied {
            return Step::redacted(ts, command, self.exit_code, ms);
        }
        match (self.status, self.exit_code) {
            (StepStatus::Ok, _) => Step::ok(ts, command, ms),
            (_, Some(code)) => Step::failed(ts, command, code, ms),
            (_, None) => Step::not_started(ts, command, self.reason, ms),
        }
    }
}

/// Execute `argv` inheriting stdin, stdout and stderr. Output is never
/// captured. A spawn failure is reported through the outcome, not as an
/// error; the only error is an empty `argv`.
pub fn run_command(argv: &[String], cwd: Option<&Path>) -> Result<RunOutcome> {
    let (program, args) = argv.split_first().ok_or(CaptureError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let started_at = OffsetDateTime::now_utc();
    let clock = Instant::now();
    let result = cmd.status();
    let duration = clock.elapsed();

    let outcome = match result {
        Ok(status) => from_exit_status(started_at, duration, status),
        Err(e) => from_start_error(started_at, duration, e),
    };
    tracing::debug!(
        program = %program,
        status = %outcome.status,
        reason = %outcome.reason,
        exit_code = ?outcome.exit_code,
        duration_ms = outcome.duration_ms(),
        "command finished"
    );
    Ok(outcome)
}

fn from_exit_status(started_at: OffsetDateTime, duration: Duration, status: ExitStatus) -> RunOutcome {
    let base = RunOutcome {
        started_at,
        duration,
        status: StepStatus::Ok,
        reason: StepReason::None,
        exit_code: Some(0),
        cli_exit_code: 0,
        start_error: None,
    };
    match status.code() {
        Some(0) => base,
        Some(code) => RunOutcome {
            status: StepStatus::Failed,
            reason: StepReason::NonzeroExit,
            exit_code: Some(code),
            cli_exit_code: code,
            ..base
        },
        // Terminated by a signal: no exit code to record.
        None => RunOutcome {
            status: StepStatus::Failed,
            reason: StepReason::Unknown,
            exit_code: None,
            cli_exit_code: signal_exit_code(&status),
            ..base
        },
    }
}

fn from_start_error(started_at: OffsetDateTime, duration: Duration, err: std::io::Error) -> RunOutcome {
    let (reason, cli_exit_code) = if err.kind() == ErrorKind::NotFound {
        (StepReason::CommandNotFound, EXIT_NOT_FOUND)
    } else {
        (StepReason::StartFailed, EXIT_START_FAILED)
    };
    RunOutcome {
        started_at,
        duration,
        status: StepStatus::Failed,
        reason,
        exit_code: None,
        cli_exit_code,
        start_error: Some(err),
    }
}

#[cfg(unix)]
fn signal_exit_code(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|sig| 128 + sig).unwrap_or(EXIT_START_FAILED)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: &ExitStatus) -> i32 {
    EXIT_START_FAILED
}

/// Join an argument vector into one display string, quoting arguments that
/// contain whitespace or quotes.
pub fn join_command(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote_arg(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if !arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}
