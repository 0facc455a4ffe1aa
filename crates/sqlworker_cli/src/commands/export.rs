//! Export command implementation.

use sqlworker_client::Client;
use std::path::Path;
use tracing::info;

/// Writes the current database image to `output`.
pub async fn run(client: &Client, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let file = client.get_database_file().await?;
    info!("Exporting {} to {:?}", file.name, output);

    tokio::fs::write(output, &file.bytes).await?;

    println!("✓ Database exported");
    println!("  Name: {}", file.name);
    println!("  Path: {:?}", output);
    println!("  Size: {} bytes", file.bytes.len());

    Ok(())
}
