use crate::core::models::ADDRESS_LEN;
use crate::core::store::AddressStore;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;

/// Trimmed lines of exactly `ADDRESS_LEN` characters; everything else is skipped.
pub fn parse_address_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() == ADDRESS_LEN)
}

/// Loads the address list into `store`, creating an empty file when it does
/// not exist yet. Returns the number of newly tracked addresses.
pub async fn load_address_file(path: &Path, store: &AddressStore) -> Result<usize> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::info!(?path, "Address file not found, creating an empty one");
            if let Err(e) = tokio::fs::write(path, "").await {
                tracing::warn!(?path, error = %e, "Failed to create address file");
            }
            return Ok(0);
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read address file: {}", path.display()))
        }
    };

    let mut added = 0;
    for address in parse_address_lines(&content) {
        if store.add_or_ignore(address).await {
            added += 1;
        } else {
            tracing::debug!(address, "Skipping duplicate address");
        }
    }

    tracing::info!(?path, added, "Loaded address file");
    Ok(added)
}
