use crate::core::activity::ActivityLog;
use crate::core::error::MonitorError;
use crate::core::models::{BalanceReading, TrackedAddress};
use crate::core::rotation::EndpointRotation;
use crate::core::settings::Settings;
use crate::core::stats::PollStats;
use crate::core::store::AddressStore;
use crate::providers::{AuditProvider, BalanceProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub address: String,
    pub was_never_fetched: bool,
    pub balance: StepStatus,
    pub audit: StepStatus,
    /// Endpoint the audit step queried, if it got that far.
    pub audit_endpoint: Option<String>,
    pub delay: Duration,
}

impl CycleReport {
    pub fn was_cancelled(&self) -> bool {
        self.balance == StepStatus::Cancelled || self.audit == StepStatus::Cancelled
    }
}

/// A previous token balance of zero counts as "not yet known", so the first
/// populate never reports a change.
pub fn value_changed(previous: f32, new: f32) -> bool {
    previous != 0.0 && previous != new
}

pub struct PollScheduler {
    store: AddressStore,
    balances: Arc<dyn BalanceProvider>,
    audits: Arc<dyn AuditProvider>,
    rotation: EndpointRotation,
    activity: Arc<ActivityLog>,
    stats: Arc<PollStats>,
    fresh_interval: Duration,
    stale_interval: Duration,
    cancel: watch::Receiver<bool>,
}

impl PollScheduler {
    pub fn new(
        settings: &Settings,
        store: AddressStore,
        balances: Arc<dyn BalanceProvider>,
        audits: Arc<dyn AuditProvider>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        // The sender is dropped right away, so this receiver never fires.
        let (_, cancel) = watch::channel(false);

        let rotation = EndpointRotation::new(settings.api.audit_endpoints.iter().cloned());
        if rotation.is_empty() {
            tracing::warn!("No audit endpoints configured, audit checks are skipped");
        }

        Self {
            store,
            balances,
            audits,
            rotation,
            activity,
            stats: Arc::new(PollStats::new()),
            fresh_interval: settings.polling.fresh_interval(),
            stale_interval: settings.polling.stale_interval(),
            cancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    /// Select the stalest address, refresh its balance and then its audit
    /// status. Only an empty store is an error; fetch failures are reported
    /// in the returned steps.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, MonitorError> {
        let target = self.store.oldest().await?;
        let was_never_fetched = target.never_fetched();
        self.stats.record_cycle();

        let mut report = CycleReport {
            address: target.address.clone(),
            was_never_fetched,
            balance: StepStatus::Skipped,
            audit: StepStatus::Skipped,
            audit_endpoint: None,
            delay: if was_never_fetched {
                self.fresh_interval
            } else {
                self.stale_interval
            },
        };

        let fetched = tokio::select! {
            result = self.balances.fetch_balance(&target.address) => result,
            _ = cancelled(&mut self.cancel) => {
                report.balance = StepStatus::Cancelled;
                return Ok(report);
            }
        };

        let applied = match fetched {
            Ok(reading) => self.apply_balance(&target, reading).await,
            Err(e) => Err(e),
        };

        match applied {
            Ok(()) => {
                self.stats.record_balance_success();
                report.balance = StepStatus::Succeeded;
            }
            Err(e) => {
                self.stats.record_balance_failure();
                if e.is_transient() {
                    tracing::debug!(
                        address = %target.address,
                        provider = self.balances.name(),
                        error = %e,
                        consecutive_failures = self.stats.consecutive_failures(),
                        "Balance refresh failed"
                    );
                } else {
                    tracing::warn!(address = %target.address, error = %e, "Balance update rejected");
                }
                report.balance = StepStatus::Failed;
                return Ok(report);
            }
        }

        let Some(endpoint) = self.rotation.next_endpoint() else {
            return Ok(report);
        };
        report.audit_endpoint = Some(endpoint.clone());

        let verdict = tokio::select! {
            result = self.audits.fetch_audit(&endpoint, &target.address) => result,
            _ = cancelled(&mut self.cancel) => {
                report.audit = StepStatus::Cancelled;
                return Ok(report);
            }
        };

        let applied = match verdict {
            Ok(verdict) => {
                if !verdict.passed {
                    self.stats.record_failed_audit();
                    self.activity.append(&format!(
                        "Audit failed for {}. {}",
                        target.address, verdict.body
                    ));
                }
                self.store
                    .set_audit_passed(&target.address, verdict.passed)
                    .await
            }
            Err(e) => Err(e),
        };

        report.audit = match applied {
            Ok(()) => StepStatus::Succeeded,
            Err(e) => {
                self.stats.record_audit_failure();
                tracing::debug!(
                    address = %target.address,
                    provider = self.audits.name(),
                    endpoint = %endpoint,
                    error = %e,
                    "Audit check failed"
                );
                StepStatus::Failed
            }
        };

        Ok(report)
    }

    async fn apply_balance(
        &self,
        target: &TrackedAddress,
        reading: BalanceReading,
    ) -> Result<(), MonitorError> {
        let address = target.address.as_str();
        self.store
            .set_balance_primary(address, reading.primary)
            .await?;

        let previous = target.balance_token;
        if value_changed(previous, reading.token) {
            self.stats.record_value_change();
            self.activity.append(&format!(
                "*** Value changed for {} -- previous: {} -- new: {}",
                address, previous, reading.token
            ));
        }

        self.store.set_balance_token(address, reading.token).await?;
        self.store.touch_last_updated(address).await?;
        Ok(())
    }

    /// Poll until cancelled. Returns early only when the store is empty.
    pub async fn run(mut self) -> Result<(), MonitorError> {
        tracing::info!(
            fresh_ms = self.fresh_interval.as_millis() as u64,
            stale_ms = self.stale_interval.as_millis() as u64,
            audit_endpoints = self.rotation.len(),
            "Poll scheduler started"
        );

        loop {
            if *self.cancel.borrow() {
                break;
            }

            let report = self.run_cycle().await?;
            if report.was_cancelled() {
                break;
            }

            tracing::trace!(
                address = %report.address,
                never_fetched = report.was_never_fetched,
                endpoint = ?report.audit_endpoint,
                balance = ?report.balance,
                audit = ?report.audit,
                delay_ms = report.delay.as_millis() as u64,
                "Poll cycle finished"
            );

            tokio::select! {
                _ = tokio::time::sleep(report.delay) => {}
                _ = cancelled(&mut self.cancel) => break,
            }
        }

        tracing::info!(stats = ?self.stats.snapshot(), "Poll scheduler stopped");
        Ok(())
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let stats = self.stats();
        let task = tokio::spawn(self.with_cancellation(cancel_rx).run());

        SchedulerHandle {
            cancel: cancel_tx,
            stats,
            task,
        }
    }
}

pub struct SchedulerHandle {
    cancel: watch::Sender<bool>,
    stats: Arc<PollStats>,
    task: JoinHandle<Result<(), MonitorError>>,
}

impl SchedulerHandle {
    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    /// Signal the loop to stop and wait for it.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.cancel.send(true);
        self.task.await??;
        Ok(())
    }
}

/// Resolves once the flag turns true. A closed channel never resolves.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{AddressField, AuditVerdict};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const ADDR_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    #[derive(Default)]
    struct ScriptedBalances {
        responses: Mutex<VecDeque<Result<BalanceReading, MonitorError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedBalances {
        fn push(&self, response: Result<BalanceReading, MonitorError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BalanceProvider for ScriptedBalances {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_balance(&self, address: &str) -> Result<BalanceReading, MonitorError> {
            self.calls.lock().unwrap().push(address.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(MonitorError::fetch("scripted", "no response queued")))
        }
    }

    #[derive(Default)]
    struct ScriptedAudits {
        responses: Mutex<VecDeque<Result<AuditVerdict, MonitorError>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedAudits {
        fn push(&self, response: Result<AuditVerdict, MonitorError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn endpoints(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(endpoint, _)| endpoint.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AuditProvider for ScriptedAudits {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_audit(
            &self,
            base_url: &str,
            address: &str,
        ) -> Result<AuditVerdict, MonitorError> {
            self.calls
                .lock()
                .unwrap()
                .push((base_url.to_string(), address.to_string()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(MonitorError::fetch(base_url, "no response queued")))
        }
    }

    /// Never answers, so the scheduler stays parked on the request.
    struct Unresponsive;

    #[async_trait]
    impl BalanceProvider for Unresponsive {
        fn name(&self) -> &'static str {
            "unresponsive"
        }

        async fn fetch_balance(&self, _address: &str) -> Result<BalanceReading, MonitorError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl AuditProvider for Unresponsive {
        fn name(&self) -> &'static str {
            "unresponsive"
        }

        async fn fetch_audit(
            &self,
            _base_url: &str,
            _address: &str,
        ) -> Result<AuditVerdict, MonitorError> {
            std::future::pending().await
        }
    }

    struct Fixture {
        store: AddressStore,
        balances: Arc<ScriptedBalances>,
        audits: Arc<ScriptedAudits>,
        activity: Arc<ActivityLog>,
        scheduler: PollScheduler,
    }

    async fn fixture(addresses: &[&str]) -> Fixture {
        let mut settings = Settings::default();
        settings.api.audit_endpoints = vec!["a/".into(), "b/".into(), "c/".into()];

        let store = AddressStore::new();
        for address in addresses {
            store.add_or_ignore(address).await;
        }
        let balances = Arc::new(ScriptedBalances::default());
        let audits = Arc::new(ScriptedAudits::default());
        let activity = Arc::new(ActivityLog::new());
        let scheduler = PollScheduler::new(
            &settings,
            store.clone(),
            balances.clone(),
            audits.clone(),
            Arc::clone(&activity),
        );

        Fixture {
            store,
            balances,
            audits,
            activity,
            scheduler,
        }
    }

    fn reading(primary: f32, token: f32) -> Result<BalanceReading, MonitorError> {
        Ok(BalanceReading { primary, token })
    }

    fn verdict(passed: bool, body: &str) -> Result<AuditVerdict, MonitorError> {
        Ok(AuditVerdict {
            passed,
            body: body.to_string(),
        })
    }

    #[test]
    fn test_value_changed_rule() {
        assert!(!value_changed(0.0, 2500.0));
        assert!(!value_changed(2500.0, 2500.0));
        assert!(value_changed(2500.0, 2600.0));
        assert!(value_changed(2500.0, 0.0));
    }

    #[tokio::test]
    async fn test_first_populate_uses_fast_delay() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.5, 2500.0));
        f.audits.push(verdict(true, "{}"));

        let report = f.scheduler.run_cycle().await.unwrap();

        assert!(report.was_never_fetched);
        assert_eq!(report.balance, StepStatus::Succeeded);
        assert_eq!(report.audit, StepStatus::Succeeded);
        assert_eq!(report.delay, Duration::from_millis(500));

        let entry = f.store.get(ADDR_A).await.unwrap();
        assert_eq!(entry.balance_primary, 1.5);
        assert_eq!(entry.balance_token, 2500.0);
        assert!(entry.last_updated.is_some());
        assert!(entry.audit_passed);
        assert!(f.activity.lines().is_empty());
    }

    #[tokio::test]
    async fn test_second_cycle_uses_slow_delay_and_advances_timestamp() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.5, 2500.0));
        f.balances.push(reading(1.5, 2500.0));

        f.scheduler.run_cycle().await.unwrap();
        let before = f.store.get(ADDR_A).await.unwrap().last_updated.unwrap();

        let report = f.scheduler.run_cycle().await.unwrap();
        let after = f.store.get(ADDR_A).await.unwrap().last_updated.unwrap();

        assert!(!report.was_never_fetched);
        assert_eq!(report.delay, Duration::from_secs(15));
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_balance_failure_leaves_entry_untouched() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(Err(MonitorError::Timeout {
            url: "http://balance".into(),
        }));

        let report = f.scheduler.run_cycle().await.unwrap();

        assert_eq!(report.balance, StepStatus::Failed);
        assert_eq!(report.audit, StepStatus::Skipped);
        assert_eq!(report.delay, Duration::from_millis(500));
        assert_eq!(
            f.store.get(ADDR_A).await.unwrap(),
            TrackedAddress::new(ADDR_A)
        );
        assert!(f.audits.endpoints().is_empty());
        assert!(f.activity.lines().is_empty());

        let stats = f.scheduler.stats().snapshot();
        assert_eq!(stats.balance_failures, 1);
        assert_eq!(stats.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_address_oldest() {
        let mut f = fixture(&[ADDR_A, ADDR_B]).await;
        f.balances.push(reading(1.0, 10.0));
        f.balances.push(reading(1.0, 10.0));
        // A and B are populated; A is now the oldest.
        f.scheduler.run_cycle().await.unwrap();
        f.scheduler.run_cycle().await.unwrap();
        let stamp = f.store.get(ADDR_A).await.unwrap().last_updated;

        f.balances.push(Err(MonitorError::Parse("bad body".into())));
        let report = f.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.address, ADDR_A);
        assert_eq!(report.delay, Duration::from_secs(15));
        assert_eq!(f.store.get(ADDR_A).await.unwrap().last_updated, stamp);

        f.balances.push(reading(1.0, 10.0));
        let report = f.scheduler.run_cycle().await.unwrap();
        assert_eq!(report.address, ADDR_A);

        assert_eq!(
            f.balances.calls(),
            vec![ADDR_A, ADDR_B, ADDR_A, ADDR_A]
        );
    }

    #[tokio::test]
    async fn test_value_change_is_logged_after_first_populate() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.0, 2500.0));
        f.balances.push(reading(1.0, 2500.0));
        f.balances.push(reading(1.0, 2600.0));

        f.scheduler.run_cycle().await.unwrap();
        f.scheduler.run_cycle().await.unwrap();
        assert!(f.activity.lines().is_empty());

        f.scheduler.run_cycle().await.unwrap();
        let lines = f.activity.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with(&format!(
            "*** Value changed for {ADDR_A} -- previous: 2500 -- new: 2600"
        )));
        assert_eq!(f.scheduler.stats().snapshot().value_changes, 1);
    }

    #[tokio::test]
    async fn test_failed_audit_is_logged_with_body() {
        let mut f = fixture(&[ADDR_A]).await;
        let body = r#"{"recent_audits":[{"time_test":"false"},{"time_test":"true"}]}"#;
        f.balances.push(reading(1.0, 5.0));
        f.audits.push(verdict(false, body));

        let report = f.scheduler.run_cycle().await.unwrap();

        assert_eq!(report.audit, StepStatus::Succeeded);
        assert!(!f.store.get(ADDR_A).await.unwrap().audit_passed);
        let lines = f.activity.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(&format!("Audit failed for {ADDR_A}. {body}")));
    }

    #[tokio::test]
    async fn test_audit_error_keeps_previous_flag() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.0, 5.0));
        f.audits.push(verdict(false, "{}"));
        f.scheduler.run_cycle().await.unwrap();
        assert!(!f.store.get(ADDR_A).await.unwrap().audit_passed);

        f.balances.push(reading(1.0, 5.0));
        f.audits
            .push(Err(MonitorError::Parse("node has no recent audits".into())));
        let report = f.scheduler.run_cycle().await.unwrap();

        assert_eq!(report.audit, StepStatus::Failed);
        assert!(!f.store.get(ADDR_A).await.unwrap().audit_passed);
        assert_eq!(f.activity.lines().len(), 1);
        assert_eq!(f.scheduler.stats().snapshot().audit_failures, 1);
    }

    #[tokio::test]
    async fn test_rotation_advances_only_on_audit_steps() {
        let mut f = fixture(&[ADDR_A, ADDR_B]).await;
        for _ in 0..3 {
            f.balances.push(reading(1.0, 5.0));
        }
        f.balances.push(Err(MonitorError::fetch("x", "refused")));
        for _ in 0..3 {
            f.balances.push(reading(1.0, 5.0));
        }

        let mut endpoints = Vec::new();
        for _ in 0..7 {
            let report = f.scheduler.run_cycle().await.unwrap();
            endpoints.extend(report.audit_endpoint);
        }

        assert_eq!(endpoints, vec!["a/", "b/", "c/", "a/", "b/", "c/"]);
        assert_eq!(f.audits.endpoints(), endpoints);
    }

    #[tokio::test]
    async fn test_empty_store_is_an_error() {
        let mut f = fixture(&[]).await;
        assert!(matches!(
            f.scheduler.run_cycle().await,
            Err(MonitorError::EmptyStore)
        ));
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.0, 5.0));

        let handle = f.scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = handle.stats();
        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("scheduler did not stop")
            .unwrap();

        // Shutdown lands during the 500ms fast-path sleep after the first cycle.
        assert_eq!(stats.snapshot().cycles, 1);
    }

    #[tokio::test]
    async fn test_balance_update_emits_events_in_order() {
        let mut f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(1.0, 5.0));
        f.audits.push(verdict(true, "{}"));
        let mut events = f.store.subscribe();

        f.scheduler.run_cycle().await.unwrap();

        let mut fields = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.address, ADDR_A);
            fields.push(event.field);
        }
        assert_eq!(
            fields,
            vec![
                AddressField::BalancePrimary,
                AddressField::BalanceToken,
                AddressField::LastUpdated,
                AddressField::AuditPassed,
            ]
        );
    }

    #[tokio::test]
    async fn test_cancel_during_balance_fetch_leaves_entry_untouched() {
        let f = fixture(&[ADDR_A]).await;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut scheduler = PollScheduler::new(
            &Settings::default(),
            f.store.clone(),
            Arc::new(Unresponsive),
            f.audits.clone(),
            Arc::clone(&f.activity),
        )
        .with_cancellation(cancel_rx);

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_tx.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(scheduler.run_cycle(), cancel);
        let report = report.unwrap();

        assert_eq!(report.balance, StepStatus::Cancelled);
        assert_eq!(report.audit, StepStatus::Skipped);
        assert!(report.was_cancelled());
        assert_eq!(
            f.store.get(ADDR_A).await.unwrap(),
            TrackedAddress::new(ADDR_A)
        );
        assert!(f.audits.endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_audit_fetch_keeps_balance() {
        let f = fixture(&[ADDR_A]).await;
        f.balances.push(reading(2.0, 7.0));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut scheduler = PollScheduler::new(
            &Settings::default(),
            f.store.clone(),
            f.balances.clone(),
            Arc::new(Unresponsive),
            Arc::clone(&f.activity),
        )
        .with_cancellation(cancel_rx);

        let cancel = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_tx.send(true).unwrap();
        };
        let (report, ()) = tokio::join!(scheduler.run_cycle(), cancel);
        let report = report.unwrap();

        assert_eq!(report.balance, StepStatus::Succeeded);
        assert_eq!(report.audit, StepStatus::Cancelled);
        let entry = f.store.get(ADDR_A).await.unwrap();
        assert_eq!(entry.balance_token, 7.0);
        assert!(entry.last_updated.is_some());
        assert!(entry.audit_passed);
    }

    #[tokio::test]
    async fn test_shutdown_while_fetch_is_pending() {
        let f = fixture(&[ADDR_A]).await;
        let scheduler = PollScheduler::new(
            &Settings::default(),
            f.store.clone(),
            Arc::new(Unresponsive),
            f.audits.clone(),
            Arc::clone(&f.activity),
        );

        let handle = scheduler.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = handle.stats();
        tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert_eq!(stats.snapshot().cycles, 1);
        assert_eq!(
            f.store.get(ADDR_A).await.unwrap(),
            TrackedAddress::new(ADDR_A)
        );
    }
}
