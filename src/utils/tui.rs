use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Spinner on stderr while a sync cycle runs. Hidden when `quiet` is set
/// (log lines would tear through it) or when stderr is not a terminal.
pub fn create_spinner(message: String, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner().with_message(message);
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        spinner.set_style(style.tick_strings(&["◐", "◓", "◑", "◒", "●"]));
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_spinner_is_hidden() {
        let spinner = create_spinner("Syncing".into(), true);
        assert!(spinner.is_hidden());
        spinner.finish_and_clear();
    }
}
