use crate::core::error::MonitorError;
use crate::core::models::AuditVerdict;
use crate::core::settings::ApiSettings;
use crate::providers::http::{build_client, fetch_text, join_url};
use crate::providers::AuditProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct NodeStatus {
    recent_audits: Vec<AuditRecord>,
}

/// Nodes report the test results either as JSON booleans or as strings.
#[derive(Debug, Deserialize)]
struct AuditRecord {
    public_ip_test: Value,
    time_test: Value,
    calendar_state_test: Value,
    minimum_credits_test: Value,
}

impl AuditRecord {
    fn passed(&self) -> bool {
        [
            &self.public_ip_test,
            &self.time_test,
            &self.calendar_state_test,
            &self.minimum_credits_test,
        ]
        .into_iter()
        .all(is_true)
    }
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Bool(b) => *b,
        _ => false,
    }
}

/// Judges the most recent audit only; older records are ignored.
pub(crate) fn parse_audit_body(body: &str) -> Result<AuditVerdict, MonitorError> {
    let status: NodeStatus = serde_json::from_str(body)?;
    let latest = status
        .recent_audits
        .first()
        .ok_or_else(|| MonitorError::Parse("node has no recent audits".to_string()))?;

    Ok(AuditVerdict {
        passed: latest.passed(),
        body: body.to_string(),
    })
}

pub struct ChainpointClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ChainpointClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, MonitorError> {
        Ok(Self {
            client: build_client()?,
            timeout: settings.request_timeout(),
        })
    }
}

#[async_trait]
impl AuditProvider for ChainpointClient {
    fn name(&self) -> &'static str {
        "chainpoint"
    }

    async fn fetch_audit(
        &self,
        base_url: &str,
        address: &str,
    ) -> Result<AuditVerdict, MonitorError> {
        let url = join_url(base_url, &format!("nodes/{address}"));
        let body = fetch_text(&self.client, &url, self.timeout).await?;
        parse_audit_body(&body)
    }
}
