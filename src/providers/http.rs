use crate::core::error::MonitorError;
use std::time::Duration;

pub(crate) fn build_client() -> Result<reqwest::Client, MonitorError> {
    reqwest::Client::builder()
        .user_agent(concat!("balance-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| MonitorError::fetch("<client>", e.to_string()))
}

/// GET `url` and return the body text, bounded by `timeout`.
pub(crate) async fn fetch_text(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<String, MonitorError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(MonitorError::fetch(url, format!("HTTP {status}")));
    }

    response.text().await.map_err(|e| classify(url, e))
}

fn classify(url: &str, error: reqwest::Error) -> MonitorError {
    if error.is_timeout() {
        MonitorError::Timeout {
            url: url.to_string(),
        }
    } else {
        MonitorError::fetch(url, error.to_string())
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
