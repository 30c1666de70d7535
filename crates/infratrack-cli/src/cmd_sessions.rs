use infratrack_core::Session;
use infratrack_store::{JsonStore, SessionStore};

use crate::explain;
use crate::output;

pub fn list(store: &JsonStore, limit: usize) -> anyhow::Result<()> {
    let sessions = store.list_sessions(limit).map_err(explain)?;
    println!("{:<20} {:<21} {:>5}  TITLE", "ID", "STARTED", "STEPS");
    for s in &sessions {
        let title = match &s.env {
            Some(env) => format!("{} [{env}]", s.title),
            None => s.title.clone(),
        };
        println!(
            "{:<20} {:<21} {:>5}  {title}",
            s.id,
            output::timestamp(s.started_at),
            s.steps.len()
        );
    }
    Ok(())
}

/// `id` is a session id or `last`.
pub fn show(store: &JsonStore, id: &str, json: bool) -> anyhow::Result<()> {
    let session = if id.eq_ignore_ascii_case("last") {
        store.last_session()
    } else {
        store.session_by_id(id)
    }
    .map_err(explain)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        print!("{}", render(&session));
    }
    Ok(())
}

fn render(s: &Session) -> String {
    let mut out = format!("Session {}\nTitle: {}\n", s.id, s.title);
    if let Some(env) = &s.env {
        out.push_str(&format!("Env: {env}\n"));
    }
    out.push_str(&format!("Started: {}\n", output::timestamp(s.started_at)));
    if let (Some(end), Some(len)) = (s.ended_at, s.duration()) {
        out.push_str(&format!(
            "Ended: {} ({})\n",
            output::timestamp(end),
            output::duration(len)
        ));
    }
    out.push_str(&format!("Steps: {}\n", s.steps.len()));
    for (i, step) in s.steps.iter().enumerate() {
        let reason = if step.reason.is_none() {
            String::new()
        } else {
            format!(" {}", step.reason)
        };
        out.push_str(&format!(
            "{:>3}. [{}{reason}] {} (exit {}, {} ms)\n",
            i + 1,
            step.status,
            step.command,
            output::exit_code(step.exit_code),
            step.duration_ms
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use infratrack_core::{Step, StepReason};
    use time::macros::datetime;

    #[test]
    fn render_lists_steps_in_order() {
        let t = datetime!(2026-03-01 10:00 UTC);
        let mut s = Session::new("upgrade", Some("prod"), t);
        s.steps.push(Step::ok(t, "kubectl get pods", 120));
        s.steps.push(Step::not_started(t, "helm upgrade", StepReason::CommandNotFound, 1));
        s.ended_at = Some(datetime!(2026-03-01 10:01:05 UTC));

        let text = render(&s);
        assert!(text.contains("Env: prod"));
        assert!(text.contains("Ended: 2026-03-01T10:01:05Z (1m05s)"));
        assert!(text.contains("  1. [OK] kubectl get pods (exit 0, 120 ms)"));
        assert!(text.contains("  2. [FAILED command_not_found] helm upgrade (exit n/a, 1 ms)"));
    }

    #[test]
    fn show_and_list_surface_store_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonStore::new(tmp.path());
        store.init().unwrap();
        let err = show(&store, "last", false).unwrap_err();
        assert!(err.to_string().contains("no completed sessions"));
        assert!(list(&store, 0).is_err());

        store
            .start_session("one", None, datetime!(2026-03-01 10:00 UTC))
            .unwrap();
        let done = store.stop_session(datetime!(2026-03-01 10:05 UTC)).unwrap();
        list(&store, 0).unwrap();
        show(&store, &done.id, true).unwrap();
        show(&store, "LAST", false).unwrap();
        assert!(show(&store, "nope", false).is_err());
    }
}
