//! Scenario helpers built around a small groceries schema.

use sqlworker_client::{Client, ClientConfig, ClientResult, ResultSet, Value};

/// Schema used by the groceries scenarios.
pub const GROCERIES_SCHEMA: &str =
    "CREATE TABLE groceries (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)";

/// Creates the groceries table.
pub async fn groceries_schema(client: &Client) -> ClientResult<()> {
    client.query(GROCERIES_SCHEMA, []).await.map(|_| ())
}

/// Inserts one grocery and returns its name as reported by `RETURNING`.
pub async fn insert_grocery(client: &Client, name: &str) -> ClientResult<ResultSet> {
    client
        .query(
            "INSERT INTO groceries (name) VALUES (?) RETURNING name",
            [Value::from(name)],
        )
        .await
}

/// Returns every grocery as `(id, name)` in id order.
pub async fn list_groceries(client: &Client) -> ClientResult<Vec<(i64, String)>> {
    let rows = client
        .query("SELECT * FROM groceries ORDER BY id", [])
        .await?;
    Ok(rows
        .records()
        .filter_map(|record| {
            let id = record.get("id")?.as_i64()?;
            let name = record.get("name")?.as_str()?.to_string();
            Some((id, name))
        })
        .collect())
}

/// Builds a SQLite database image by running `sql` on a throwaway
/// in-memory client.
pub async fn database_image(sql: &str) -> ClientResult<Vec<u8>> {
    let client = Client::connect(ClientConfig::memory());
    let result = async {
        client.query(sql, []).await?;
        client.get_database_file().await
    }
    .await;
    client.destroy();
    Ok(result?.bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestClient;

    #[tokio::test]
    async fn groceries_round_trip() {
        let client = TestClient::memory().await;
        groceries_schema(&client).await.unwrap();
        for name in ["bread", "milk"] {
            let returned = insert_grocery(&client, name).await.unwrap();
            assert_eq!(returned.column("name"), vec![Value::from(name)]);
        }
        assert_eq!(
            list_groceries(&client).await.unwrap(),
            vec![(1, "bread".to_string()), (2, "milk".to_string())]
        );
        client.destroy();
    }

    #[tokio::test]
    async fn images_start_with_sqlite_header() {
        let image = database_image("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);")
            .await
            .unwrap();
        assert!(image.starts_with(b"SQLite format 3\0"));
    }
}
