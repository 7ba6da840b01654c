use crate::core::addresses::load_address_file;
use crate::core::settings::Settings;
use crate::core::store::AddressStore;
use anyhow::Result;

/// Print the addresses the daemon would track, after length filtering and
/// case-insensitive de-duplication.
pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let store = AddressStore::new();
    load_address_file(&settings.addresses.file, &store).await?;
    let addresses: Vec<String> = store
        .snapshot()
        .await
        .into_iter()
        .map(|entry| entry.address)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&addresses)?);
        return Ok(());
    }

    if addresses.is_empty() {
        println!(
            "No addresses in {}. Add one 42-character address per line.",
            settings.addresses.file.display()
        );
        return Ok(());
    }

    for address in &addresses {
        println!("{address}");
    }
    println!("\n{} addresses", addresses.len());
    Ok(())
}
