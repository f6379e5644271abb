//! Page fetchers: where the schedule HTML comes from.

mod chromium;
mod http;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{OutageError, OutageResult};

pub use chromium::ChromiumFetcher;
pub use http::HttpFetcher;

/// Produces the raw HTML of the schedule page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self) -> OutageResult<String>;

    /// Human-readable origin, for logs.
    fn source(&self) -> String;
}

/// Reads a saved page snapshot from disk.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileFetcher { path: path.into() }
    }
}

#[async_trait]
impl PageFetcher for FileFetcher {
    async fn fetch(&self) -> OutageResult<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| OutageError::Fetch(format!("{}: {}", self.path.display(), e)))
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}
