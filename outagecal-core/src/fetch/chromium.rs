use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::constants::CHROMIUM_VIRTUAL_TIME_BUDGET_MS;
use crate::error::{OutageError, OutageResult};
use crate::fetch::PageFetcher;

/// Renders the page in headless Chromium and captures the resulting DOM.
///
/// The schedule is filled in by client-side scripts, so a plain GET only
/// sees the empty container.
pub struct ChromiumFetcher {
    program: String,
    url: String,
    timeout: Duration,
    virtual_time_budget_ms: u64,
}

impl ChromiumFetcher {
    pub fn new(program: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        ChromiumFetcher {
            program: program.into(),
            url: url.into(),
            timeout,
            virtual_time_budget_ms: CHROMIUM_VIRTUAL_TIME_BUDGET_MS,
        }
    }

    pub fn with_virtual_time_budget(mut self, budget: Duration) -> Self {
        self.virtual_time_budget_ms = budget.as_millis() as u64;
        self
    }

    fn args(&self) -> Vec<String> {
        vec![
            "--headless".into(),
            "--no-sandbox".into(),
            "--disable-gpu".into(),
            "--disable-dev-shm-usage".into(),
            format!("--virtual-time-budget={}", self.virtual_time_budget_ms),
            "--dump-dom".into(),
            self.url.clone(),
        ]
    }
}

#[async_trait]
impl PageFetcher for ChromiumFetcher {
    async fn fetch(&self) -> OutageResult<String> {
        let binary = which::which(&self.program)
            .map_err(|_| OutageError::Fetch(format!("'{}' not found in PATH", self.program)))?;
        debug!(browser = %binary.display(), url = %self.url, "Rendering page");

        let run = Command::new(&binary)
            .args(self.args())
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.timeout, run)
            .await
            .map_err(|_| {
                OutageError::Fetch(format!("Rendering timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| OutageError::Fetch(format!("Failed to run {}: {}", binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OutageError::Fetch(format!(
                "{} exited with status {}: {}",
                binary.display(),
                output.status.code().unwrap_or(-1),
                stderr.lines().last().unwrap_or_default()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn source(&self) -> String {
        format!("{} (via {})", self.url, self.program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_dom_arguments() {
        let fetcher = ChromiumFetcher::new("chromium", "https://example.test/", Duration::from_secs(60))
            .with_virtual_time_budget(Duration::from_secs(5));
        let args = fetcher.args();
        assert_eq!(args.last().map(String::as_str), Some("https://example.test/"));
        assert!(args.contains(&"--dump-dom".to_string()));
        assert!(args.contains(&"--virtual-time-budget=5000".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
    }

    #[tokio::test]
    async fn test_missing_browser_is_fetch_error() {
        let fetcher = ChromiumFetcher::new(
            "no-such-browser-binary-xyz",
            "https://example.test/",
            Duration::from_secs(1),
        );
        assert!(matches!(fetcher.fetch().await, Err(OutageError::Fetch(_))));
    }
}
