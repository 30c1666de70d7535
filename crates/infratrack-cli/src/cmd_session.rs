use anyhow::Context;
use infratrack_store::{JsonStore, SessionStore, StoreError};
use time::OffsetDateTime;

use crate::explain;
use crate::output::{self, Ui};

pub fn start(store: &JsonStore, title: &str, env: Option<&str>, ui: Ui) -> anyhow::Result<()> {
    let title = title.trim();
    if title.is_empty() {
        anyhow::bail!("title cannot be empty");
    }

    let session = store
        .start_session(title, env, OffsetDateTime::now_utc())
        .map_err(explain)?;

    let started = output::timestamp(session.started_at);
    match &session.env {
        Some(env) => ui.ok(format!(
            "Started session {:?} (env: {env}) at {started}",
            session.title
        )),
        None => ui.ok(format!("Started session {:?} at {started}", session.title)),
    }
    Ok(())
}

pub fn stop(store: &JsonStore, ui: Ui) -> anyhow::Result<()> {
    let session = store
        .stop_session(OffsetDateTime::now_utc())
        .map_err(explain)?;
    ui.ok(format!(
        "Stopped session {:?} with {} recorded step(s)",
        session.title,
        session.steps.len()
    ));
    Ok(())
}

pub fn status(store: &JsonStore) -> anyhow::Result<()> {
    if !store.is_initialized().context("check initialization")? {
        println!("Status: not initialized");
        println!("Run `infratrack init` to create local config and storage");
        return Ok(());
    }

    let active = match store.active_session() {
        Ok(session) => session,
        Err(StoreError::NoActiveSession) => {
            println!("Status: initialized, no active session");
            return Ok(());
        }
        Err(e) => return Err(e).context("read active session"),
    };

    println!("Status: recording");
    println!("Title: {}", active.title);
    if let Some(env) = &active.env {
        println!("Env: {env}");
    }
    println!("Started: {}", output::timestamp(active.started_at));
    println!("Recorded steps: {}", active.steps.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ui() -> Ui {
        Ui::new(true)
    }

    #[test]
    fn start_requires_init_and_non_blank_title() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonStore::new(tmp.path());

        let err = start(&store, "deploy", None, ui()).unwrap_err();
        assert!(err.to_string().contains("infratrack init"));

        store.init().unwrap();
        assert!(start(&store, "   ", None, ui()).is_err());
        assert!(matches!(
            store.active_session(),
            Err(StoreError::NoActiveSession)
        ));
    }

    #[test]
    fn start_stop_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonStore::new(tmp.path());
        store.init().unwrap();

        start(&store, "rotate certs", Some("prod"), ui()).unwrap();
        let err = start(&store, "again", None, ui()).unwrap_err();
        assert!(err.to_string().contains("already active"));
        status(&store).unwrap();

        stop(&store, ui()).unwrap();
        let err = stop(&store, ui()).unwrap_err();
        assert!(err.to_string().contains("no active session"));

        let last = store.last_session().unwrap();
        assert_eq!(last.title, "rotate certs");
        assert_eq!(last.env.as_deref(), Some("prod"));
    }

    #[test]
    fn status_before_init_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        status(&JsonStore::new(tmp.path())).unwrap();
    }
}
