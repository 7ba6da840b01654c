use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Length of a well-formed `0x`-prefixed account address.
pub const ADDRESS_LEN: usize = 42;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAddress {
    pub address: String,
    pub audit_passed: bool,
    pub balance_primary: f32,
    pub balance_token: f32,
    /// `None` until the first successful balance fetch.
    pub last_updated: Option<DateTime<Utc>>,
}

impl TrackedAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            audit_passed: true,
            balance_primary: 0.0,
            balance_token: 0.0,
            last_updated: None,
        }
    }

    pub fn never_fetched(&self) -> bool {
        self.last_updated.is_none()
    }

    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressField {
    Address,
    AuditPassed,
    BalancePrimary,
    BalanceToken,
    LastUpdated,
}

impl AddressField {
    pub fn name(&self) -> &'static str {
        match self {
            AddressField::Address => "address",
            AddressField::AuditPassed => "audit_passed",
            AddressField::BalancePrimary => "balance_primary",
            AddressField::BalanceToken => "balance_token",
            AddressField::LastUpdated => "last_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Amount(f32),
    Timestamp(DateTime<Utc>),
}

/// A single field write on a tracked address.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    pub address: String,
    pub field: AddressField,
    pub value: FieldValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceReading {
    pub primary: f32,
    pub token: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditVerdict {
    pub passed: bool,
    /// Raw response body, kept for the operator log.
    pub body: String,
}
