use crate::core::error::MonitorError;
use crate::core::models::{AddressField, FieldValue, StoreEvent, TrackedAddress};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const EVENT_CAPACITY: usize = 256;

#[derive(Default)]
struct StoreInner {
    entries: Vec<TrackedAddress>,
}

impl StoreInner {
    fn find_mut(&mut self, address: &str) -> Result<&mut TrackedAddress, MonitorError> {
        self.entries
            .iter_mut()
            .find(|e| e.matches(address))
            .ok_or_else(|| MonitorError::UnknownAddress(address.to_string()))
    }
}

#[derive(Clone)]
pub struct AddressStore {
    inner: Arc<RwLock<StoreInner>>,
    events: broadcast::Sender<StoreEvent>,
}

impl AddressStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, address: &str, field: AddressField, value: FieldValue) {
        // No receivers is fine; the event is simply dropped.
        let _ = self.events.send(StoreEvent {
            address: address.to_string(),
            field,
            value,
        });
    }

    pub async fn add_or_ignore(&self, address: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.entries.iter().any(|e| e.matches(address)) {
            return false;
        }
        inner.entries.push(TrackedAddress::new(address));
        drop(inner);

        self.emit(
            address,
            AddressField::Address,
            FieldValue::Text(address.to_string()),
        );
        true
    }

    /// Returns the entry updated longest ago. Never-fetched entries come first,
    /// ties keep insertion order.
    pub async fn oldest(&self) -> Result<TrackedAddress, MonitorError> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .min_by_key(|e| e.last_updated)
            .cloned()
            .ok_or(MonitorError::EmptyStore)
    }

    #[cfg(test)]
    pub async fn get(&self, address: &str) -> Option<TrackedAddress> {
        self.inner
            .read()
            .await
            .entries
            .iter()
            .find(|e| e.matches(address))
            .cloned()
    }

    pub async fn snapshot(&self) -> Vec<TrackedAddress> {
        self.inner.read().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn set_audit_passed(&self, address: &str, passed: bool) -> Result<(), MonitorError> {
        let key = {
            let mut inner = self.inner.write().await;
            let entry = inner.find_mut(address)?;
            entry.audit_passed = passed;
            entry.address.clone()
        };
        self.emit(&key, AddressField::AuditPassed, FieldValue::Flag(passed));
        Ok(())
    }

    pub async fn set_balance_primary(&self, address: &str, balance: f32) -> Result<(), MonitorError> {
        let key = {
            let mut inner = self.inner.write().await;
            let entry = inner.find_mut(address)?;
            entry.balance_primary = balance;
            entry.address.clone()
        };
        self.emit(&key, AddressField::BalancePrimary, FieldValue::Amount(balance));
        Ok(())
    }

    pub async fn set_balance_token(&self, address: &str, balance: f32) -> Result<(), MonitorError> {
        let key = {
            let mut inner = self.inner.write().await;
            let entry = inner.find_mut(address)?;
            entry.balance_token = balance;
            entry.address.clone()
        };
        self.emit(&key, AddressField::BalanceToken, FieldValue::Amount(balance));
        Ok(())
    }

    /// Stamps the entry with the current time, always moving strictly forward.
    pub async fn touch_last_updated(&self, address: &str) -> Result<DateTime<Utc>, MonitorError> {
        let (key, stamp) = {
            let mut inner = self.inner.write().await;
            let entry = inner.find_mut(address)?;
            let stamp = next_timestamp(entry.last_updated, Utc::now());
            entry.last_updated = Some(stamp);
            (entry.address.clone(), stamp)
        };
        self.emit(&key, AddressField::LastUpdated, FieldValue::Timestamp(stamp));
        Ok(stamp)
    }
}

impl Default for AddressStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_timestamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + Duration::microseconds(1),
        _ => now,
    }
}
