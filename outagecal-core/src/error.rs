//! Error types for outagecal.

use thiserror::Error;

/// Errors that can occur while syncing the outage schedule.
#[derive(Error, Debug)]
pub enum OutageError {
    /// The page structure could not be recognized at all. Aborts the cycle.
    #[error("Schedule parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to fetch schedule page: {0}")]
    Fetch(String),

    #[error("CalDAV error: {0}")]
    CalDav(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("Provider request timed out after {0}s")]
    ProviderTimeout(u64),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl OutageError {
    /// Whether this error comes from an external collaborator (page, calendar,
    /// notifier) rather than from the schedule itself.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            OutageError::Fetch(_)
                | OutageError::CalDav(_)
                | OutageError::Provider(_)
                | OutageError::ProviderNotInstalled(_)
                | OutageError::ProviderTimeout(_)
                | OutageError::Notify(_)
                | OutageError::Io(_)
        )
    }
}

/// Result type alias for outagecal operations.
pub type OutageResult<T> = Result<T, OutageError>;
