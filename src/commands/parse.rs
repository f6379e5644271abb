use std::path::PathBuf;

use anyhow::Result;
use outagecal_core::config::Settings;
use outagecal_core::parse::ScheduleParser;
use owo_colors::OwoColorize;

use crate::render::Render;
use crate::setup;
use crate::utils::tui;

pub async fn run(settings: &Settings, file: Option<PathBuf>, json: bool, quiet: bool) -> Result<()> {
    let today = setup::today(settings.tz()?);
    let fetcher = setup::fetcher(settings, file)?;
    let parser = ScheduleParser::new(&settings.fetch.parser_options())?;

    let spinner = tui::create_spinner(format!("Reading {}", fetcher.source()), quiet || json);
    let html = fetcher.fetch().await;
    spinner.finish_and_clear();

    let page = parser.parse(&html?, today)?;

    if json {
        let warnings: Vec<String> = page.warnings.iter().map(ToString::to_string).collect();
        let output = serde_json::json!({
            "today": today,
            "days": page.days,
            "warnings": warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for warning in &page.warnings {
        println!("{}", warning.render());
    }

    if page.days.is_empty() {
        println!("{}", "No schedule published for today or tomorrow".dimmed());
        return Ok(());
    }

    for (i, day) in page.days.iter().enumerate() {
        println!("{}", day.render());
        if i < page.days.len() - 1 {
            println!();
        }
    }

    Ok(())
}
