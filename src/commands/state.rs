use anyhow::Result;
use outagecal_core::config::Settings;
use outagecal_core::state::{StateStore, TrackedState, live_dates};
use owo_colors::OwoColorize;

use crate::setup;

pub fn run(settings: &Settings, reset: bool) -> Result<()> {
    let mut store = setup::state_store(settings)?;

    if reset {
        store.save(&TrackedState::default())?;
        println!("Cleared {}", store.path().display());
        return Ok(());
    }

    println!("{}", store.path().display().dimmed());

    let state = store.load();
    if state.is_empty() {
        println!("{}", "Nothing tracked yet".dimmed());
        return Ok(());
    }

    let live = live_dates(setup::today(settings.tz()?));
    for (date, fingerprint) in state.iter() {
        let marker = if live.contains(date) {
            String::new()
        } else {
            " (stale, pruned on next sync)".dimmed().to_string()
        };
        println!("📅 {}  {}{}", date, fingerprint.short(), marker);
    }

    Ok(())
}
