use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;
use web_sqlite3::prelude::*;

/// With a single connection and a single worker, pin the connection so
/// submissions back up in the queue, then verify they are dispatched in
/// priority order with submission order preserved inside each priority.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_dispatches_by_priority_then_submission(
) -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.connection.database = dir.path().join("test.db").display().to_string();
    config.pool.min_size = 1;
    config.pool.max_size = 1;

    let client = Arc::new(Client::new(config));
    client.connect().await?;
    client
        .execute(
            "CREATE TABLE events (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT)",
            &[],
        )
        .await?;

    // Pin the only connection; the worker will block on pool acquisition.
    let gate = client.connection().await?;

    let submit = |label: &str, priority: Priority| {
        let client = Arc::clone(&client);
        let label = label.to_string();
        tokio::spawn(async move {
            client
                .execute_with(
                    "INSERT INTO events (label) VALUES (?1)",
                    &[SqlValue::Text(label)],
                    QueryOptions::new().priority(priority),
                )
                .await
        })
    };

    // The first submission is popped immediately and parks on acquire.
    let mut handles = vec![submit("first", Priority::Normal)];
    sleep(Duration::from_millis(150)).await;

    // The rest queue up behind the parked worker.
    for (label, priority) in [
        ("low-1", Priority::Low),
        ("low-2", Priority::Low),
        ("normal-1", Priority::Normal),
        ("high-1", Priority::High),
        ("critical-1", Priority::Critical),
        ("critical-2", Priority::Critical),
    ] {
        handles.push(submit(label, priority));
        sleep(Duration::from_millis(30)).await;
    }

    let stats = client.stats().await;
    assert!(
        stats.executor.queue_size >= 1,
        "queue must grow while the pool is saturated"
    );
    assert_eq!(stats.pool.waiters, 1);

    drop(gate);
    for handle in handles {
        handle.await.expect("task")?;
    }

    let rows = client
        .fetchall("SELECT label FROM events ORDER BY id", &[])
        .await?;
    let labels: Vec<&str> = rows
        .iter()
        .filter_map(|row| row.get("label").and_then(|v| v.as_text()))
        .collect();
    assert_eq!(
        labels,
        vec![
            "first",
            "critical-1",
            "critical-2",
            "high-1",
            "normal-1",
            "low-1",
            "low-2",
        ]
    );

    client.close().await?;
    Ok(())
}
