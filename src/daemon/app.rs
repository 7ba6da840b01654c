use crate::core::activity::ActivityLog;
use crate::core::addresses::load_address_file;
use crate::core::error::MonitorError;
use crate::core::models::{AddressField, StoreEvent};
use crate::core::settings::{DisplaySettings, Settings};
use crate::core::stats::PollStats;
use crate::core::store::AddressStore;
use crate::daemon::polling::PollScheduler;
use crate::providers::ProviderSet;
use crate::ui::render_table;
use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

const ACTIVITY_TAIL: usize = 8;

pub async fn run(settings: Settings) -> Result<()> {
    let activity = Arc::new(ActivityLog::new());
    activity.append("Balance data provided by ethplorer.io");

    let store = load_tracked_addresses(&settings, &activity).await?;
    tracing::info!(addresses = store.len().await, "Tracking addresses");
    let providers = ProviderSet::new(&settings.api).context("Failed to build HTTP clients")?;

    let events = store.subscribe();
    let scheduler = PollScheduler::new(
        &settings,
        store.clone(),
        providers.balances,
        providers.audits,
        Arc::clone(&activity),
    );
    let handle = scheduler.spawn();

    let (stop_render, render_stopped) = watch::channel(false);
    let render = settings.display.redraw.then(|| {
        tokio::spawn(run_render_loop(
            store.clone(),
            events,
            render_stopped,
            handle.stats(),
            Arc::clone(&activity),
            settings.display.clone(),
        ))
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    let stats = handle.stats();
    handle.shutdown().await?;

    let _ = stop_render.send(true);
    if let Some(render) = render {
        render.await.context("Render task panicked")?;
    }
    tracing::info!(stats = ?stats.snapshot(), "Monitor stopped");
    Ok(())
}

/// Loads the configured address file. An empty list is fatal: the poll loop
/// needs at least one address to pick from.
pub async fn load_tracked_addresses(
    settings: &Settings,
    activity: &ActivityLog,
) -> Result<AddressStore> {
    let path = &settings.addresses.file;
    let store = AddressStore::new();
    let count = load_address_file(path, &store).await?;
    activity.append(&format!("Loaded {count} addresses to monitor."));

    if store.is_empty().await {
        if settings.addresses.open_when_empty {
            if let Err(e) = open::that(path) {
                tracing::warn!(?path, error = %e, "Failed to open address file");
            }
        }
        return Err(MonitorError::EmptyStore).with_context(|| {
            format!(
                "No addresses found! Put addresses into {}, one per line.",
                path.display()
            )
        });
    }

    Ok(store)
}

async fn run_render_loop(
    store: AddressStore,
    mut events: broadcast::Receiver<StoreEvent>,
    mut stop: watch::Receiver<bool>,
    stats: Arc<PollStats>,
    activity: Arc<ActivityLog>,
    display: DisplaySettings,
) {
    redraw(&store, &stats, &activity, &display).await;

    loop {
        let received = tokio::select! {
            received = events.recv() => received,
            _ = stop.changed() => break,
        };

        match received {
            Ok(event) => {
                tracing::trace!(
                    address = %event.address,
                    field = event.field.name(),
                    value = ?event.value,
                    "Store changed"
                );
                if matches!(
                    event.field,
                    AddressField::LastUpdated | AddressField::AuditPassed
                ) {
                    redraw(&store, &stats, &activity, &display).await;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Renderer lagged behind store events");
                redraw(&store, &stats, &activity, &display).await;
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn redraw(
    store: &AddressStore,
    stats: &PollStats,
    activity: &ActivityLog,
    display: &DisplaySettings,
) {
    let rows = store.snapshot().await;
    let stats = stats.snapshot();

    let mut screen = String::new();
    if std::io::stdout().is_terminal() {
        screen.push_str("\x1B[2J\x1B[H");
    }
    screen.push_str(&render_table(&rows, display));
    screen.push_str(&format!(
        "\ncycles: {}  balance failures: {}  audit failures: {}\n\n",
        stats.cycles, stats.balance_failures, stats.audit_failures
    ));
    for line in activity.recent(ACTIVITY_TAIL) {
        screen.push_str(&line);
        screen.push('\n');
    }

    print!("{screen}");
}
