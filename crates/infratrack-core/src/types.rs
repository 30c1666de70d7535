use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

/// Outcome classification of a recorded step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepStatus {
    Ok,
    Failed,
    Redacted,
    #[default]
    Unknown,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Ok => write!(f, "OK"),
            StepStatus::Failed => write!(f, "FAILED"),
            StepStatus::Redacted => write!(f, "REDACTED"),
            StepStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Why a step ended up with its status. `None` is stored as an absent field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepReason {
    #[default]
    #[serde(rename = "")]
    None,
    NonzeroExit,
    CommandNotFound,
    StartFailed,
    PolicyRedacted,
    PolicyBlocked,
    Unknown,
}

impl StepReason {
    pub fn is_none(&self) -> bool {
        matches!(self, StepReason::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepReason::None => "",
            StepReason::NonzeroExit => "nonzero_exit",
            StepReason::CommandNotFound => "command_not_found",
            StepReason::StartFailed => "start_failed",
            StepReason::PolicyRedacted => "policy_redacted",
            StepReason::PolicyBlocked => "policy_blocked",
            StepReason::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StepReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed (or denied) command. `command` is always the sanitized text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub command: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "StepReason::is_none")]
    pub reason: StepReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cwd: String,
}

impl Step {
    /// A command that exited with status 0.
    pub fn ok(timestamp: OffsetDateTime, command: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            timestamp: timestamp.to_offset(time::UtcOffset::UTC),
            command: command.into(),
            status: StepStatus::Ok,
            reason: StepReason::None,
            exit_code: Some(0),
            duration_ms,
            cwd: String::new(),
        }
    }

    /// A command that ran and exited non-zero. An exit code of 0 is not a
    /// failure and yields an `OK` step instead.
    pub fn failed(
        timestamp: OffsetDateTime,
        command: impl Into<String>,
        exit_code: i32,
        duration_ms: u64,
    ) -> Self {
        if exit_code == 0 {
            return Self::ok(timestamp, command, duration_ms);
        }
        Self {
            status: StepStatus::Failed,
            reason: StepReason::NonzeroExit,
            exit_code: Some(exit_code),
            ..Self::ok(timestamp, command, duration_ms)
        }
    }

    /// A command whose process never started (no exit code).
    pub fn not_started(
        timestamp: OffsetDateTime,
        command: impl Into<String>,
        reason: StepReason,
        duration_ms: u64,
    ) -> Self {
        Self {
            status: StepStatus::Failed,
            reason,
            exit_code: None,
            ..Self::ok(timestamp, command, duration_ms)
        }
    }

    /// A denied command that was still executed; content already replaced.
    pub fn redacted(
        timestamp: OffsetDateTime,
        command: impl Into<String>,
        exit_code: Option<i32>,
        duration_ms: u64,
    ) -> Self {
        Self {
            status: StepStatus::Redacted,
            reason: StepReason::PolicyRedacted,
            exit_code,
            ..Self::ok(timestamp, command, duration_ms)
        }
    }

    /// A denied command that was never executed.
    pub fn blocked(timestamp: OffsetDateTime, command: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Redacted,
            reason: StepReason::PolicyBlocked,
            exit_code: None,
            ..Self::ok(timestamp, command, 0)
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }

    /// Status/exit-code agreement: FAILED never carries 0, OK only carries 0.
    pub fn is_consistent(&self) -> bool {
        match (self.status, self.exit_code) {
            (StepStatus::Failed, Some(code)) => code != 0,
            (StepStatus::Ok, Some(code)) => code == 0,
            _ => true,
        }
    }
}

/// One recording session. Active while `ended_at` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Session {
    /// Build a fresh session. Title and env are trimmed; a blank env is dropped.
    pub fn new(title: &str, env: Option<&str>, started_at: OffsetDateTime) -> Self {
        let started_at = started_at.to_offset(time::UtcOffset::UTC);
        Self {
            id: session_id(started_at),
            title: title.trim().to_string(),
            env: env
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            started_at,
            ended_at: None,
            steps: Vec::with_capacity(8),
        }
    }

    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Wall-clock length of a completed session.
    pub fn duration(&self) -> Option<time::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

static LAST_ID_NANOS: AtomicU64 = AtomicU64::new(0);

/// Session id: decimal Unix nanoseconds of the start instant, nudged forward
/// when needed so ids issued by one process are strictly increasing.
pub fn session_id(started_at: OffsetDateTime) -> String {
    let nanos = u64::try_from(started_at.unix_timestamp_nanos()).unwrap_or(0);
    let mut prev = LAST_ID_NANOS.load(Ordering::Relaxed);
    loop {
        let next = nanos.max(prev.saturating_add(1));
        match LAST_ID_NANOS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn failed_with_zero_exit_is_ok() {
        let step = Step::failed(datetime!(2026-03-01 10:00 UTC), "true", 0, 5);
        assert_eq!(step.status, StepStatus::Ok);
        assert_eq!(step.exit_code, Some(0));
        assert!(step.is_consistent());
    }

    #[test]
    fn constructors_hold_exit_code_invariant() {
        let ts = datetime!(2026-03-01 10:00 UTC);
        let failed = Step::failed(ts, "false", 1, 3);
        assert_eq!(failed.reason, StepReason::NonzeroExit);
        assert!(failed.is_consistent());

        let missing = Step::not_started(ts, "nope", StepReason::CommandNotFound, 0);
        assert_eq!(missing.exit_code, None);
        assert_eq!(missing.status, StepStatus::Failed);

        let blocked = Step::blocked(ts, "[REDACTED BY POLICY]");
        assert_eq!(blocked.reason, StepReason::PolicyBlocked);
        assert_eq!(blocked.duration_ms, 0);
    }

    #[test]
    fn inconsistent_decoded_step_is_detected() {
        let json = r#"{"timestamp":"2026-03-01T10:00:00Z","command":"x","status":"FAILED","exit_code":0,"duration_ms":1}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert!(!step.is_consistent());
    }

    #[test]
    fn step_json_shape() {
        let step = Step::ok(datetime!(2026-03-01 10:00 UTC), "ls -la", 12).with_cwd("/tmp");
        let v = serde_json::to_value(&step).unwrap();
        assert_eq!(v["status"], "OK");
        assert_eq!(v["exit_code"], 0);
        assert_eq!(v["cwd"], "/tmp");
        // empty reason is omitted
        assert!(v.get("reason").is_none());

        let redacted = Step::redacted(datetime!(2026-03-01 10:00 UTC), "[REDACTED BY POLICY]", None, 0);
        let v = serde_json::to_value(&redacted).unwrap();
        assert_eq!(v["status"], "REDACTED");
        assert_eq!(v["reason"], "policy_redacted");
        assert!(v.get("exit_code").is_none());
    }

    #[test]
    fn step_decodes_minimal_record() {
        let json = r#"{"timestamp":"2026-03-01T10:00:00.123456789Z","command":"make","duration_ms":0}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(step.status, StepStatus::Unknown);
        assert_eq!(step.reason, StepReason::None);
        assert_eq!(step.cwd, "");
        assert_eq!(step.timestamp.nanosecond(), 123_456_789);
    }

    #[test]
    fn session_new_trims_and_drops_blank_env() {
        let s = Session::new("  deploy api  ", Some("   "), datetime!(2026-03-01 10:00 UTC));
        assert_eq!(s.title, "deploy api");
        assert_eq!(s.env, None);
        assert!(s.is_active());
        assert!(s.steps.is_empty());

        let s = Session::new("x", Some(" prod "), datetime!(2026-03-01 10:00 UTC));
        assert_eq!(s.env.as_deref(), Some("prod"));
    }

    #[test]
    fn session_ids_are_strictly_increasing() {
        let ts = datetime!(2026-03-01 10:00 UTC);
        let a: u64 = session_id(ts).parse().unwrap();
        let b: u64 = session_id(ts).parse().unwrap();
        let c: u64 = session_id(ts).parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn completed_session_round_trips_ended_at() {
        let mut s = Session::new("t", None, datetime!(2026-03-01 10:00 UTC));
        s.ended_at = Some(datetime!(2026-03-01 10:30 UTC));
        let line = serde_json::to_string(&s).unwrap();
        let back: Session = serde_json::from_str(&line).unwrap();
        assert_eq!(back.ended_at, s.ended_at);
        assert_eq!(back.duration(), Some(time::Duration::minutes(30)));
        assert!(!back.is_active());
    }
}
