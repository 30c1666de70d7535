use anyhow::Context;
use infratrack_capture::{parse_exit_code, FileStateStore, RecordInput, RecordOutcome, Recorder};
use infratrack_store::{JsonStore, SessionStore};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub struct RecordArgs<'a> {
    pub command: &'a str,
    pub exit_code: &'a str,
    pub duration_ms: i64,
    pub cwd: &'a str,
    pub timestamp: Option<&'a str>,
}

/// Called by shell hooks after every command. Quiet unless a reminder is due.
pub fn record(store: &JsonStore, args: &RecordArgs<'_>) -> anyhow::Result<()> {
    let exit_code = parse_exit_code(args.exit_code)?;
    let timestamp = args
        .timestamp
        .filter(|t| !t.trim().is_empty())
        .map(|t| OffsetDateTime::parse(t.trim(), &Rfc3339).context("parse timestamp"))
        .transpose()?;

    let policy = crate::load_policy(store);
    let state = FileStateStore::new(store.root_dir());
    let outcome = Recorder::new(store, &policy)
        .with_state(&state)
        .record(RecordInput {
            command: args.command.to_string(),
            cwd: args.cwd.to_string(),
            exit_code,
            duration_ms: args.duration_ms,
            timestamp,
        })?;

    match outcome {
        RecordOutcome::Recorded { reminder: true, .. } => {
            eprintln!("[REC] InfraTrack recording is active.");
        }
        RecordOutcome::Recorded { .. } => {}
        RecordOutcome::Skipped(reason) => tracing::debug!(%reason, "hook event skipped"),
    }
    Ok(())
}
