use std::time::Duration;

use tempfile::TempDir;
use tokio::time::sleep;
use web_sqlite3::prelude::*;

fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.connection.database = dir.path().join("test.db").display().to_string();
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transaction_pinning_the_only_connection_exhausts_the_pool(
) -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 1;
    config.pool.max_size = 1;
    config.pool.connection_timeout = 0.15;

    let client = Client::new(config);
    client.connect().await?;
    client.execute("CREATE TABLE t (v INTEGER)", &[]).await?;

    let mut tx = client.transaction().await?;
    tx.execute("INSERT INTO t (v) VALUES (1)", &[], None).await?;

    let contended = client.execute("SELECT 1", &[]).await;
    assert!(
        matches!(contended, Err(WebSqlite3Error::PoolExhausted(_))),
        "expected PoolExhausted, got {contended:?}"
    );

    // the transaction itself is unaffected and commits cleanly
    tx.commit().await?;
    let row = client
        .fetchone("SELECT v FROM t", &[])
        .await?
        .expect("committed row");
    assert_eq!(row.get("v").and_then(SqlValue::as_int), Some(1));

    client.close().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_deadline_during_acquire_reports_timeout() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 1;
    config.pool.max_size = 1;

    let client = Client::new(config);
    client.connect().await?;

    // pin the only connection; the request's own deadline, shorter than
    // connection_timeout, is the binding bound on the wait
    let gate = client.connection().await?;
    let timed_out = client
        .execute_with(
            "SELECT 1",
            &[],
            QueryOptions::new().timeout(Duration::from_millis(150)),
        )
        .await;
    assert!(
        matches!(timed_out, Err(WebSqlite3Error::Timeout(_))),
        "expected Timeout, got {timed_out:?}"
    );

    let stats = client.stats().await;
    assert_eq!(stats.executor.total_timed_out, 1);
    assert_eq!(stats.executor.total_failed, 0);

    drop(gate);
    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn counters_respect_pool_bounds() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 2;
    config.pool.max_size = 3;

    let client = Client::new(config);
    client.connect().await?;

    let stats = client.stats().await;
    assert_eq!(stats.pool.size, 2);
    assert_eq!(stats.pool.available, 2);
    assert_eq!(stats.pool.in_use, 0);
    assert_eq!(stats.pool.created_total, 2);

    let first = client.connection().await?;
    let second = client.connection().await?;
    let third = client.connection().await?;

    let stats = client.stats().await;
    assert_eq!(stats.pool.size, 3);
    assert_eq!(stats.pool.in_use, 3);
    assert_eq!(stats.pool.available, 0);
    assert_eq!(stats.pool.in_use + stats.pool.available, stats.pool.size);

    drop(first);
    drop(second);
    drop(third);
    let stats = client.stats().await;
    assert_eq!(stats.pool.in_use, 0);
    assert_eq!(stats.pool.available, 3);

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn max_queries_recycles_connections() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 1;
    config.pool.max_size = 2;
    config.pool.max_queries = 1;

    let client = Client::new(config);
    client.connect().await?;

    for _ in 0..3 {
        client.execute("SELECT 1", &[]).await?;
    }

    let stats = client.stats().await;
    assert!(
        stats.pool.created_total >= 3,
        "each use must retire the connection, got {stats:?}"
    );
    assert!(stats.pool.closed_total >= 2);
    assert!(stats.pool.size <= 2);

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn idle_sweep_retires_connections_above_min_size() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 0;
    config.pool.max_size = 2;
    config.pool.max_idle_time = 0.2;

    let client = Client::new(config);
    client.connect().await?;

    client.execute("SELECT 1", &[]).await?;
    let stats = client.stats().await;
    assert_eq!(stats.pool.size, 1);

    sleep(Duration::from_millis(1200)).await;
    let stats = client.stats().await;
    assert_eq!(stats.pool.size, 0, "idle sweep must retire the connection");
    assert!(stats.pool.closed_total >= 1);

    // cold start after eviction still works
    client.execute("SELECT 1", &[]).await?;

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn zero_timeout_fails_without_touching_the_pool() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 0;
    config.pool.max_size = 2;

    let client = Client::new(config);
    client.connect().await?;

    let timed_out = client
        .execute_with("SELECT 1", &[], QueryOptions::new().timeout(Duration::ZERO))
        .await;
    assert!(
        matches!(timed_out, Err(WebSqlite3Error::Timeout(_))),
        "expected Timeout, got {timed_out:?}"
    );

    let stats = client.stats().await;
    assert_eq!(stats.pool.created_total, 0, "no connection may be acquired");
    assert_eq!(stats.pool.in_use, 0);
    assert_eq!(stats.executor.total_timed_out, 1);
    assert_eq!(stats.executor.total_executed, 0);

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn pool_recycle_zero_disables_age_eviction() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config_for(&dir);
    config.pool.min_size = 1;
    config.pool.max_size = 1;
    config.pool.pool_recycle = 0;

    let client = Client::new(config);
    client.connect().await?;

    for _ in 0..5 {
        client.execute("SELECT 1", &[]).await?;
    }
    let stats = client.stats().await;
    assert_eq!(stats.pool.created_total, 1, "connection must be reused");

    client.close().await?;
    Ok(())
}
