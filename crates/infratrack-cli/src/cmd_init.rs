use anyhow::Context;
use infratrack_store::{JsonStore, SessionStore};

use crate::output::Ui;

pub fn execute(store: &JsonStore, ui: Ui) -> anyhow::Result<()> {
    let existed = store.is_initialized()?;
    store.init().context("initialize storage")?;

    if existed {
        ui.ok(format!("Already initialized at {}", store.root_dir().display()));
    } else {
        ui.ok(format!("Initialized InfraTrack at {}", store.root_dir().display()));
        println!("Config: {}", store.paths().config_yaml.display());
    }
    Ok(())
}
