//! Exec command implementation.

use super::{parse_value, print_table};
use sqlworker_client::{Client, Method, Statement};
use tracing::debug;

/// Runs `sql` with the given parameters and prints the last result.
pub async fn run(
    client: &Client,
    sql: &str,
    params: &[String],
    method: Method,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = params
        .iter()
        .map(|raw| parse_value(raw))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(params = params.len(), ?method, "executing statement");

    let statement = Statement::new(sql)
        .with_params(params)
        .with_method(method);
    let result = client.execute(statement).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_table(&result);
    }

    Ok(())
}
