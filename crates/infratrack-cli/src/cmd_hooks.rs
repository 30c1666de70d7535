use anyhow::Context;
use infratrack_capture::{FileStateStore, StateStore};
use infratrack_store::{JsonStore, SessionStore};

use crate::output::Ui;

fn label(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

pub fn set_enabled(store: &JsonStore, enabled: bool, ui: Ui) -> anyhow::Result<()> {
    FileStateStore::new(store.root_dir())
        .update(&mut |s| s.enabled = enabled)
        .context("update hooks state")?;
    ui.ok(format!("Hooks mode {}", label(enabled)));
    Ok(())
}

pub fn configure(store: &JsonStore, remind_every: u32, ui: Ui) -> anyhow::Result<()> {
    if remind_every == 0 {
        anyhow::bail!("remind-every must be greater than 0");
    }
    FileStateStore::new(store.root_dir())
        .update(&mut |s| s.remind_every = remind_every)
        .context("update hooks state")?;
    ui.ok(format!("Updated hooks remind-every to {remind_every}"));
    Ok(())
}

pub fn status(store: &JsonStore) -> anyhow::Result<()> {
    let state = FileStateStore::new(store.root_dir())
        .load()
        .context("load hooks state")?;
    let recording = store.active_session().is_ok();

    println!("Hooks: {}", label(state.enabled));
    println!("Remind every: {}", state.remind_every);
    println!("Recorded commands: {}", state.command_count);
    println!("Session recording: {}", label(recording));
    Ok(())
}
