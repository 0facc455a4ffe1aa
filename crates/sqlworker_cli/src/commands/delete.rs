//! Delete command implementation.

use sqlworker_client::Client;
use tracing::info;

/// Removes the database file and reopens an empty database.
pub async fn run(client: &Client, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = client.config();
    if !config.is_memory() && !force {
        return Err(format!(
            "Refusing to delete {:?} without --force",
            config.storage_root().join(&config.database_path)
        )
        .into());
    }

    info!("Deleting database {}", config.database_path);
    client.delete_database_file().await?;

    println!("✓ Database deleted");
    println!("  Path: {}", config.database_path);

    Ok(())
}
