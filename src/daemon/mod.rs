mod app;
pub mod polling;

use crate::core::settings::Settings;
use anyhow::Result;

pub use app::load_tracked_addresses;

pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!("Starting balance-monitor daemon");

    app::run(settings).await
}
