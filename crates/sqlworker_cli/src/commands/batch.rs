//! Batch command implementation.

use super::print_table;
use sqlworker_client::{Client, Statement};
use tracing::info;

/// Runs `statements` in one transaction and prints every result.
pub async fn run(
    client: &Client,
    statements: &[String],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Running batch of {} statements", statements.len());

    let batch = statements.iter().map(Statement::new).collect();
    let results = client.batch(batch).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for (index, (sql, result)) in statements.iter().zip(&results).enumerate() {
        println!("-- [{}] {}", index + 1, sql);
        print_table(result);
    }

    Ok(())
}
