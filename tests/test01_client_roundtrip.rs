use tempfile::TempDir;
use web_sqlite3::prelude::*;

fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.connection.database = dir.path().join("test.db").display().to_string();
    config.pool.min_size = 1;
    config.pool.max_size = 4;
    config
}

#[tokio::test]
async fn execute_fetch_roundtrip() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let client = Client::new(config_for(&dir));
    client.connect().await?;

    client
        .execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)",
            &[],
        )
        .await?;

    let inserted = client
        .execute(
            "INSERT INTO users (name, age) VALUES (?1, ?2)",
            &[SqlValue::Text("alice".into()), SqlValue::Int(30)],
        )
        .await?;
    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.last_insert_rowid, Some(1));

    let batch = client
        .executemany(
            "INSERT INTO users (name, age) VALUES (?1, ?2)",
            &[
                vec![SqlValue::Text("bob".into()), SqlValue::Int(41)],
                vec![SqlValue::Text("carol".into()), SqlValue::Int(52)],
            ],
        )
        .await?;
    assert_eq!(batch.rows_affected, 2);

    let row = client
        .fetchone(
            "SELECT name, age FROM users WHERE id = ?1",
            &[SqlValue::Int(2)],
        )
        .await?
        .expect("row for id 2");
    assert_eq!(row.get("name").and_then(|v| v.as_text()), Some("bob"));
    assert_eq!(row.get("age").and_then(SqlValue::as_int), Some(41));

    let rows = client
        .fetchall("SELECT id, name, age FROM users ORDER BY id", &[])
        .await?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get("age").and_then(SqlValue::as_int), Some(52));

    let missing = client
        .fetchone("SELECT * FROM users WHERE id = 99", &[])
        .await?;
    assert!(missing.is_none());

    client.close().await?;
    Ok(())
}

#[derive(Debug, PartialEq)]
struct User {
    id: i64,
    name: String,
}

impl FromRow for User {
    fn from_row(row: &Row) -> Result<Self, WebSqlite3Error> {
        let id = row
            .get("id")
            .and_then(SqlValue::as_int)
            .ok_or_else(|| WebSqlite3Error::Query("missing column id".into()))?;
        let name = row
            .get("name")
            .and_then(|v| v.as_text())
            .map(str::to_string)
            .ok_or_else(|| WebSqlite3Error::Query("missing column name".into()))?;
        Ok(User { id, name })
    }
}

#[tokio::test]
async fn rows_project_into_records() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let client = Client::new(config_for(&dir));
    client.connect().await?;

    client
        .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .await?;
    client
        .execute(
            "INSERT INTO users (name) VALUES (?1)",
            &[SqlValue::Text("alice".into())],
        )
        .await?;

    let users: Vec<User> = client
        .fetchall("SELECT id, name FROM users", &[])
        .await?
        .iter()
        .map(Row::project)
        .collect::<Result<_, _>>()?;
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "alice".into()
        }]
    );

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn connect_and_close_are_idempotent() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let client = Client::new(config_for(&dir));

    // before connect, operations fail as uninitialized
    let early = client.execute("SELECT 1", &[]).await;
    assert!(matches!(early, Err(WebSqlite3Error::Transaction(_))));

    client.connect().await?;
    client.connect().await?;
    let stats = client.stats().await;
    assert!(stats.initialized);
    assert_eq!(stats.pool.size, 1);

    client.close().await?;
    client.close().await?;
    let stats = client.stats().await;
    assert!(!stats.initialized);

    // after close, operations fail as shut down
    let late = client.execute("SELECT 1", &[]).await;
    assert!(matches!(late, Err(WebSqlite3Error::Shutdown(_))));
    Ok(())
}

#[tokio::test]
async fn stats_counters_track_work() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let client = Client::new(config_for(&dir));
    client.connect().await?;

    client
        .execute("CREATE TABLE t (v INTEGER)", &[])
        .await?;
    client
        .execute("INSERT INTO t (v) VALUES (1)", &[])
        .await?;
    let bad = client.execute("INSERT INTO missing VALUES (1)", &[]).await;
    assert!(matches!(bad, Err(WebSqlite3Error::Query(_))));

    let stats = client.stats().await;
    assert_eq!(stats.executor.total_executed, 2);
    assert_eq!(stats.executor.total_failed, 1);
    assert_eq!(stats.executor.total_timed_out, 0);
    assert_eq!(stats.pool.in_use + stats.pool.available, stats.pool.size);
    assert_eq!(stats.config.pool.max_size, 4);

    client.close().await?;
    Ok(())
}

#[tokio::test]
async fn plain_sql_error_keeps_the_connection() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let client = Client::new(config_for(&dir));
    client.connect().await?;

    let bad = client.execute("SELECT * FROM nowhere", &[]).await;
    assert!(matches!(bad, Err(WebSqlite3Error::Query(_))));

    // the connection survived the SQL error and was not recycled
    let stats = client.stats().await;
    assert_eq!(stats.pool.created_total, 1);
    assert_eq!(stats.pool.closed_total, 0);

    client.close().await?;
    Ok(())
}
