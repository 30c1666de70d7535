//! Shell-hook recording: one call per command the user's shell finished.

use infratrack_core::Step;
use infratrack_policy::Policy;
use infratrack_store::{SessionStore, StoreError};
use time::OffsetDateTime;

use crate::error::{CaptureError, Result};
use crate::hooks_state::StateStore;

const SELF_BINARIES: &[&str] = &["infratrack", "infratrack.exe"];

/// One command event reported by a shell hook.
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub command: String,
    pub cwd: String,
    pub exit_code: i32,
    /// Negative values are clamped to zero.
    pub duration_ms: i64,
    /// `None` means "now".
    pub timestamp: Option<OffsetDateTime>,
}

/// Why an event was not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    HooksDisabled,
    SelfCommand,
    NoActiveSession,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::HooksDisabled => "hooks_disabled",
            SkipReason::SelfCommand => "self_command",
            SkipReason::NoActiveSession => "no_active_session",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded { step: Step, reminder: bool },
    Skipped(SkipReason),
}

impl RecordOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, RecordOutcome::Recorded { .. })
    }
}

pub struct Recorder<'a> {
    store: &'a dyn SessionStore,
    policy: &'a Policy,
    state: Option<&'a dyn StateStore>,
}

impl<'a> Recorder<'a> {
    pub fn new(store: &'a dyn SessionStore, policy: &'a Policy) -> Self {
        Self {
            store,
            policy,
            state: None,
        }
    }

    /// Gate recording on hook state and count recorded commands.
    pub fn with_state(mut self, state: &'a dyn StateStore) -> Self {
        self.state = Some(state);
        self
    }

    pub fn record(&self, input: RecordInput) -> Result<RecordOutcome> {
        let raw = input.command.trim();
        if raw.is_empty() {
            return Err(CaptureError::EmptyCommand);
        }

        if let Some(state) = self.state {
            if !state.load()?.enabled {
                return Ok(RecordOutcome::Skipped(SkipReason::HooksDisabled));
            }
        }

        let args: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        if is_self_invocation(&args) {
            return Ok(RecordOutcome::Skipped(SkipReason::SelfCommand));
        }

        match self.store.active_session() {
            Ok(_) => {}
            Err(StoreError::NoActiveSession | StoreError::NotInitialized) => {
                return Ok(RecordOutcome::Skipped(SkipReason::NoActiveSession));
            }
            Err(e) => return Err(e.into()),
        }

        let sanitized = self.policy.apply(raw, &args);
        let timestamp = input.timestamp.unwrap_or_else(OffsetDateTime::now_utc);
        let duration_ms = u64::try_from(input.duration_ms).unwrap_or(0);
        let step = if sanitized.denied {
            Step::redacted(timestamp, sanitized.command, None, duration_ms)
        } else {
            // exit 0 yields an OK step
            Step::failed(timestamp, sanitized.command, input.exit_code, duration_ms)
        };
        let step = step.with_cwd(input.cwd);

        self.store.add_step(step.clone())?;
        let reminder = self.bump_counter()?;
        tracing::debug!(status = %step.status, reminder, "hook step recorded");

        Ok(RecordOutcome::Recorded { step, reminder })
    }

    fn bump_counter(&self) -> Result<bool> {
        let Some(store) = self.state else {
            return Ok(false);
        };
        let state = store.update(&mut |s| s.command_count = s.command_count.saturating_add(1))?;
        Ok(state.reminder_due())
    }
}

fn is_self_invocation(args: &[String]) -> bool {
    let Some(first) = args.first() else {
        return false;
    };
    let unquoted = first.trim_matches(|c| c == '"' || c == '\'');
    let base = unquoted
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(unquoted)
        .to_ascii_lowercase();
    SELF_BINARIES.contains(&base.as_str())
}

/// Parse an exit code passed as text by a shell hook.
pub fn parse_exit_code(value: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .map_err(|source| CaptureError::InvalidExitCode {
            value: value.to_string(),
            source,
        })
}
