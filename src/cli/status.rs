use crate::core::activity::ActivityLog;
use crate::core::models::TrackedAddress;
use crate::core::rotation::EndpointRotation;
use crate::core::settings::Settings;
use crate::daemon::load_tracked_addresses;
use crate::providers::{AuditProvider, BalanceProvider, ProviderSet};
use crate::ui::render_table;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct StatusOutput {
    addresses: Vec<AddressStatus>,
    #[serde(with = "chrono::serde::ts_seconds")]
    fetched_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct AddressStatus {
    address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance_primary: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance_token: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit_passed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One pass over every tracked address. Unlike the daemon, failures are
/// reported per address instead of being retried.
pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let activity = ActivityLog::new();
    let store = load_tracked_addresses(settings, &activity).await?;
    let providers = ProviderSet::new(&settings.api).context("Failed to build HTTP clients")?;
    let mut rotation = EndpointRotation::new(settings.api.audit_endpoints.iter().cloned());

    let mut results = Vec::new();
    for entry in store.snapshot().await {
        let status = fetch_address_status(
            providers.balances.as_ref(),
            providers.audits.as_ref(),
            &mut rotation,
            &entry.address,
        )
        .await;
        results.push(status);
    }

    if json {
        let output = StatusOutput {
            addresses: results,
            fetched_at: Utc::now(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_text_output(&results, settings);
    }

    Ok(())
}

async fn fetch_address_status(
    balances: &dyn BalanceProvider,
    audits: &dyn AuditProvider,
    rotation: &mut EndpointRotation,
    address: &str,
) -> AddressStatus {
    let mut status = AddressStatus {
        address: address.to_string(),
        balance_primary: None,
        balance_token: None,
        audit_passed: None,
        audit_endpoint: None,
        error: None,
    };

    match balances.fetch_balance(address).await {
        Ok(reading) => {
            status.balance_primary = Some(reading.primary);
            status.balance_token = Some(reading.token);
        }
        Err(e) => {
            status.error = Some(e.to_string());
            return status;
        }
    }

    let Some(endpoint) = rotation.next_endpoint() else {
        return status;
    };

    match audits.fetch_audit(&endpoint, address).await {
        Ok(verdict) => status.audit_passed = Some(verdict.passed),
        Err(e) => status.error = Some(e.to_string()),
    }
    status.audit_endpoint = Some(endpoint);

    status
}

fn print_text_output(results: &[AddressStatus], settings: &Settings) {
    let rows: Vec<TrackedAddress> = results
        .iter()
        .filter(|s| s.balance_primary.is_some())
        .map(|s| TrackedAddress {
            address: s.address.clone(),
            audit_passed: s.audit_passed.unwrap_or(true),
            balance_primary: s.balance_primary.unwrap_or_default(),
            balance_token: s.balance_token.unwrap_or_default(),
            last_updated: Some(Utc::now()),
        })
        .collect();

    print!("{}", render_table(&rows, &settings.display));

    let failures: Vec<_> = results.iter().filter(|s| s.error.is_some()).collect();
    if !failures.is_empty() {
        println!();
        for status in failures {
            if let Some(error) = &status.error {
                println!("  {}: {}", status.address, error);
            }
        }
    }
}
