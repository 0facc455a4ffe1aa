//! Info command implementation.

use sqlworker_client::Client;

/// Prints the engine's database facts.
pub async fn run(client: &Client, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = client.get_database_info().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("=== SQLWorker Database Info ===");
    println!(
        "Path: {}",
        info.database_path.as_deref().unwrap_or(":memory:")
    );
    println!("Storage: {:?}", info.storage_type);
    println!("Persisted: {}", info.persisted);
    match info.database_size_bytes {
        Some(size) => println!("Size: {} ({} bytes)", format_bytes(size), size),
        None => println!("Size: unknown"),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
