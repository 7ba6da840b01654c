/// Errors raised by the store, the providers and the poll scheduler.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("address store is empty")]
    EmptyStore,

    #[error("request to {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("address not tracked: {0}")]
    UnknownAddress(String),
}

impl MonitorError {
    pub fn fetch(url: &str, message: impl Into<String>) -> Self {
        MonitorError::Fetch {
            url: url.to_string(),
            message: message.into(),
        }
    }

    /// Transport and decode failures are absorbed by the poll loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MonitorError::Fetch { .. } | MonitorError::Timeout { .. } | MonitorError::Parse(_)
        )
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::Parse(e.to_string())
    }
}
