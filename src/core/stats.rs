use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the poll loop. Failures never reach the activity log, so
/// this is where they show up.
#[derive(Debug, Default)]
pub struct PollStats {
    cycles: AtomicU64,
    balance_failures: AtomicU64,
    audit_failures: AtomicU64,
    consecutive_failures: AtomicU64,
    value_changes: AtomicU64,
    failed_audits: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub balance_failures: u64,
    pub audit_failures: u64,
    pub consecutive_failures: u64,
    pub value_changes: u64,
    pub failed_audits: u64,
}

impl PollStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_balance_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_balance_failure(&self) {
        self.balance_failures.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .consecutive_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_add(1))
            });
    }

    pub fn record_audit_failure(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_value_change(&self) {
        self.value_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_audit(&self) {
        self.failed_audits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            balance_failures: self.balance_failures.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            value_changes: self.value_changes.load(Ordering::Relaxed),
            failed_audits: self.failed_audits.load(Ordering::Relaxed),
        }
    }
}
