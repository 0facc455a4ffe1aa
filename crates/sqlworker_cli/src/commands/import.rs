//! Import command implementation.

use sqlworker_client::Client;
use std::path::Path;
use tracing::{info, warn};

/// Replaces the database with the image stored at `input`.
pub async fn run(client: &Client, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Importing database from {:?}", input);
    if client.config().is_memory() {
        warn!("importing into an in-memory database; the data is lost on exit");
    }

    let bytes = tokio::fs::read(input).await?;
    let size = bytes.len();
    client.overwrite_database_file(bytes).await?;

    println!("✓ Database imported");
    println!("  Source: {:?}", input);
    println!("  Size: {} bytes", size);

    Ok(())
}
