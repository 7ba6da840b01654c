use crate::core::error::MonitorError;
use crate::core::models::BalanceReading;
use crate::core::settings::ApiSettings;
use crate::providers::http::{build_client, fetch_text, join_url};
use crate::providers::BalanceProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Raw token balances are fixed-point with eight decimals.
const TOKEN_SCALE: u64 = 100_000_000;

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(rename = "ETH")]
    eth: EthInfo,
    tokens: Vec<TokenInfo>,
}

#[derive(Debug, Deserialize)]
struct EthInfo {
    balance: f64,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    balance: RawAmount,
}

/// Integral amounts are scaled with integer division, dropping the fraction
/// of a whole token. Non-integral JSON numbers fall back to float division.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Integer(u64),
    Float(f64),
}

impl RawAmount {
    fn whole_tokens(&self) -> f32 {
        match *self {
            RawAmount::Integer(raw) => (raw / TOKEN_SCALE) as f32,
            RawAmount::Float(raw) => (raw / TOKEN_SCALE as f64) as f32,
        }
    }
}

pub(crate) fn parse_balance_body(body: &str) -> Result<BalanceReading, MonitorError> {
    let info: AddressInfo = serde_json::from_str(body)?;
    let token = info
        .tokens
        .first()
        .ok_or_else(|| MonitorError::Parse("address info has no tokens".to_string()))?;

    Ok(BalanceReading {
        primary: info.eth.balance as f32,
        token: token.balance.whole_tokens(),
    })
}

pub struct EthplorerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl EthplorerClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, MonitorError> {
        Ok(Self {
            client: build_client()?,
            base_url: settings.balance_base_url.clone(),
            api_key: settings.api_key.clone(),
            timeout: settings.request_timeout(),
        })
    }

    fn address_info_url(&self, address: &str) -> String {
        format!(
            "{}?apiKey={}",
            join_url(&self.base_url, &format!("getAddressInfo/{address}")),
            self.api_key
        )
    }
}

#[async_trait]
impl BalanceProvider for EthplorerClient {
    fn name(&self) -> &'static str {
        "ethplorer"
    }

    async fn fetch_balance(&self, address: &str) -> Result<BalanceReading, MonitorError> {
        let url = self.address_info_url(address);
        let body = fetch_text(&self.client, &url, self.timeout).await?;
        parse_balance_body(&body)
    }
}
