mod chainpoint;
mod ethplorer;
mod http;

use crate::core::error::MonitorError;
use crate::core::models::{AuditVerdict, BalanceReading};
use crate::core::settings::ApiSettings;
use async_trait::async_trait;
use std::sync::Arc;

pub use chainpoint::ChainpointClient;
pub use ethplorer::EthplorerClient;

#[async_trait]
pub trait BalanceProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch_balance(&self, address: &str) -> Result<BalanceReading, MonitorError>;
}

#[async_trait]
pub trait AuditProvider: Send + Sync {
    fn name(&self) -> &'static str;
    /// `base_url` is the audit node chosen by the caller's rotation.
    async fn fetch_audit(&self, base_url: &str, address: &str)
        -> Result<AuditVerdict, MonitorError>;
}

pub struct ProviderSet {
    pub balances: Arc<dyn BalanceProvider>,
    pub audits: Arc<dyn AuditProvider>,
}

impl ProviderSet {
    pub fn new(settings: &ApiSettings) -> Result<Self, MonitorError> {
        Ok(Self {
            balances: Arc::new(EthplorerClient::new(settings)?),
            audits: Arc::new(ChainpointClient::new(settings)?),
        })
    }
}
