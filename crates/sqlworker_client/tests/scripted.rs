//! Admission and lifecycle properties checked against scripted engines.

use sqlworker_client::{Client, ClientConfig, ClientError, LockScope, Statement};
use sqlworker_protocol::TransactionAction;
use sqlworker_testkit::{ScriptedEngine, Timeline, TimelineEntry};
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

/// Config for a database name no other test uses.
fn unique_config() -> ClientConfig {
    ClientConfig::new(format!("scripted-{}.sqlite3", Uuid::new_v4()))
        .with_storage_root("/nonexistent")
        .with_lock_scope(LockScope::Process)
}

fn connect(config: &ClientConfig, label: &str, timeline: &Timeline) -> Client {
    let (channel, _) = ScriptedEngine::new(label)
        .with_delay(Duration::from_millis(3))
        .with_timeline(timeline.clone())
        .start();
    Client::with_engine(config.clone(), channel)
}

/// Entries that go through the mutation lock.
fn admitted(entries: &[TimelineEntry]) -> Vec<TimelineEntry> {
    entries
        .iter()
        .filter(|e| !matches!(e.kind, "config" | "reinit" | "destroy"))
        .cloned()
        .collect()
}

#[tokio::test]
async fn exclusive_round_trips_never_overlap() {
    let config = unique_config();
    let timeline = Timeline::new();
    let a = connect(&config, "a", &timeline);
    let b = connect(&config, "b", &timeline);

    let mut tasks = Vec::new();
    for round in 0..3 {
        let tx_client = a.clone();
        tasks.push(tokio::spawn(async move {
            tx_client.transaction(|tx| async move {
                tx.query("INSERT INTO t VALUES (1)", []).await?;
                tx.query("INSERT INTO t VALUES (2)", []).await?;
                Ok(())
            })
            .await
            .map(|_| round)
        }));
        let import_client = b.clone();
        tasks.push(tokio::spawn(async move {
            import_client.query("SELECT * FROM t", []).await?;
            import_client.overwrite_database_file(vec![0u8; 16]).await?;
            import_client.query("SELECT count(*) FROM t", []).await.map(|_| round)
        }));
        let delete_client = a.clone();
        tasks.push(tokio::spawn(async move {
            delete_client.delete_database_file().await?;
            delete_client.get_database_info().await.map(|_| round)
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let entries = admitted(&timeline.entries());

    // Imports and deletes are single exclusive round trips.
    for exclusive in entries.iter().filter(|e| matches!(e.kind, "import" | "delete")) {
        for other in &entries {
            if other.key == exclusive.key {
                continue;
            }
            assert!(
                !exclusive.overlaps(other),
                "{} overlapped {} ({:?})",
                exclusive.kind,
                other.kind,
                other.sql
            );
        }
    }

    // Transaction sessions hold exclusivity from begin to commit.
    let spans = timeline.transaction_spans();
    assert_eq!(spans.len(), 3);
    for (tx, start, end) in spans {
        for other in entries.iter().filter(|e| e.transaction_key != Some(tx)) {
            let end_other = other.answered.expect("every request was answered");
            assert!(
                end_other <= start || other.received >= end,
                "{} overlapped transaction {tx}",
                other.kind
            );
        }
    }

    a.destroy();
    b.destroy();
}

#[tokio::test]
async fn transaction_statements_carry_one_key() {
    let config = unique_config();
    let timeline = Timeline::new();
    let client = connect(&config, "solo", &timeline);

    let outside = {
        let client = client.clone();
        tokio::spawn(async move {
            for _ in 0..3 {
                client.query("SELECT 'outside'", []).await?;
            }
            Ok::<_, ClientError>(())
        })
    };

    let mut tx = client.begin_transaction().await.unwrap();
    let key = tx.key();
    tx.query("INSERT INTO t VALUES (1)", []).await.unwrap();
    tx.execute(Statement::new("INSERT INTO t VALUES (?)").bind(2))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    outside.await.unwrap().unwrap();

    let entries = timeline.entries();
    let tagged: Vec<_> = entries
        .iter()
        .filter(|e| e.transaction_key == Some(key))
        .collect();
    assert_eq!(tagged.len(), 4, "begin, two statements, commit");
    assert!(tagged.iter().all(|e| e.kind == "query" || e.kind == "transaction"));

    for entry in entries.iter().filter(|e| e.sql.as_deref() == Some("SELECT 'outside'")) {
        assert_eq!(entry.transaction_key, None);
    }
    client.destroy();
}

#[tokio::test]
async fn destroy_abandons_pending_calls() {
    let (channel, timeline) = ScriptedEngine::new("quiet").silent().start();
    let client = Client::with_engine(ClientConfig::memory(), channel);

    let pending: Vec<_> = (0..3)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move { client.query(&format!("SELECT {i}"), []).await })
        })
        .collect();

    // Handshake plus three queries.
    timeline.wait_for(4).await;
    assert_eq!(client.pending_requests(), 3);

    client.destroy();
    assert_eq!(client.pending_requests(), 0);

    for call in pending {
        let settled = timeout(Duration::from_millis(100), call).await;
        assert!(settled.is_err(), "abandoned call must not settle");
    }

    assert!(matches!(
        client.query("SELECT 1", []).await.unwrap_err(),
        ClientError::Destroyed
    ));
    timeline.wait_for(5).await;
    assert_eq!(timeline.kinds().last(), Some(&"destroy"));
}

#[tokio::test]
async fn waiting_for_the_lock_is_not_in_flight() {
    let config = unique_config();
    let timeline = Timeline::new();
    let client = connect(&config, "holder", &timeline);

    let mut tx = client.begin_transaction().await.unwrap();
    assert!(tx.holds_lock());

    let blocked = {
        let client = client.clone();
        tokio::spawn(async move { client.query("SELECT 'after'", []).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(client.pending_requests(), 0);
    assert!(!blocked.is_finished());

    tx.rollback().await.unwrap();
    assert!(!tx.holds_lock());
    blocked.await.unwrap().unwrap();
    client.destroy();
}

#[tokio::test]
async fn dropped_transaction_rolls_back_and_releases() {
    let config = unique_config();
    let timeline = Timeline::new();
    let client = connect(&config, "dropper", &timeline);

    let tx = client.begin_transaction().await.unwrap();
    let key = tx.key();
    drop(tx);

    timeout(Duration::from_secs(5), client.query("SELECT 1", []))
        .await
        .expect("lock released on drop")
        .unwrap();

    let rolled_back = timeline.entries().iter().any(|e| {
        e.transaction_key == Some(key) && e.action == Some(TransactionAction::Rollback)
    });
    assert!(rolled_back);
    client.destroy();
}

#[tokio::test]
async fn batch_returns_one_result_per_statement() {
    let (channel, _) = ScriptedEngine::new("batch").start();
    let client = Client::with_engine(ClientConfig::memory(), channel);

    let results = client
        .batch(vec![
            Statement::new("SELECT 1"),
            Statement::new("SELECT 2"),
            Statement::new("SELECT 3"),
        ])
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.is_empty()));
    client.destroy();
}

#[tokio::test]
async fn instance_scope_does_not_block_siblings() {
    let config = unique_config().with_lock_scope(LockScope::Instance);
    let timeline = Timeline::new();
    let a = connect(&config, "a", &timeline);
    let b = connect(&config, "b", &timeline);

    let _tx = a.begin_transaction().await.unwrap();
    timeout(Duration::from_secs(5), b.query("SELECT 1", []))
        .await
        .expect("instance locks are independent")
        .unwrap();
    a.destroy();
    b.destroy();
}

#[tokio::test]
async fn failed_commit_is_the_transaction_outcome() {
    let (channel, timeline) = ScriptedEngine::new("commit-fails")
        .failing_action(TransactionAction::Commit)
        .start();
    let client = Client::with_engine(unique_config(), channel);

    let err = client
        .transaction(|tx| async move {
            tx.query("INSERT INTO t VALUES (1)", []).await?;
            Ok(())
        })
        .await
        .unwrap_err();
    let payload = err.engine_error().expect("commit error passed through");
    assert_eq!(payload.message, "scripted transaction failure");

    // The still-open session was rolled back after the failed commit.
    let actions: Vec<_> = timeline.entries().iter().filter_map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            TransactionAction::Begin,
            TransactionAction::Commit,
            TransactionAction::Rollback
        ]
    );

    timeout(Duration::from_secs(5), client.query("SELECT 1", []))
        .await
        .expect("lock released after failed commit")
        .unwrap();
    client.destroy();
}

#[tokio::test]
async fn failed_rollback_keeps_the_body_error() {
    let (channel, timeline) = ScriptedEngine::new("rollback-fails")
        .failing_action(TransactionAction::Rollback)
        .failing_sql("BROKEN")
        .start();
    let client = Client::with_engine(unique_config(), channel);

    let err = client
        .transaction(|tx| async move {
            tx.query("SELECT BROKEN", []).await?;
            Ok(())
        })
        .await
        .unwrap_err();
    let payload = err.engine_error().expect("body error passed through");
    assert_eq!(payload.message, "scripted query failure");

    let rollback_attempted = timeline
        .entries()
        .iter()
        .any(|e| e.action == Some(TransactionAction::Rollback));
    assert!(rollback_attempted);

    timeout(Duration::from_secs(5), client.query("SELECT 1", []))
        .await
        .expect("lock released after failed rollback")
        .unwrap();
    assert!(!client.is_destroyed());
    client.destroy();
}
