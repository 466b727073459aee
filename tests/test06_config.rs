use tempfile::TempDir;
use web_sqlite3::prelude::*;

#[test]
fn json_round_trip_preserves_every_field() {
    let mut config = Config::default();
    config.connection.database = "round_trip.db".to_string();
    config.connection.timeout = 2.5;
    config.connection.isolation_level = Some(IsolationLevel::Exclusive);
    config.pool.min_size = 3;
    config.pool.max_size = 7;
    config.pool.max_queries = 500;
    config.pool.pool_recycle = 120;
    config.pool.echo = true;
    config.server.port = 9999;

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, config.to_json_string().expect("serialize")).expect("write");

    let reloaded = Config::from_file(&path).expect("reload");
    assert_eq!(reloaded, config);
}

#[test]
fn yaml_file_loads_with_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "connection:\n  database: app.db\npool:\n  max_size: 3\n  echo: true\nserver:\n  host: db.internal\n",
    )
    .expect("write");

    let config = Config::from_file(&path).expect("load");
    assert_eq!(config.connection.database, "app.db");
    assert_eq!(config.connection.timeout, 5.0);
    assert_eq!(config.pool.max_size, 3);
    assert!(config.pool.echo);
    // the server block is accepted and carried, but has no effect
    assert_eq!(config.server.host, "db.internal");
    assert_eq!(config.server.port, 3306);
}

#[test]
fn unsupported_extension_is_a_configuration_error() {
    let result = Config::from_file("config.toml");
    assert!(matches!(result, Err(WebSqlite3Error::Configuration(_))));
}

#[test]
fn missing_file_is_a_configuration_error() {
    let result = Config::from_file("does/not/exist.json");
    assert!(matches!(result, Err(WebSqlite3Error::Configuration(_))));
}

#[tokio::test]
async fn invalid_sizing_is_rejected_at_connect() {
    let mut config = Config::default();
    config.pool.min_size = 5;
    config.pool.max_size = 2;

    let client = Client::new(config);
    let result = client.connect().await;
    assert!(matches!(result, Err(WebSqlite3Error::Configuration(_))));

    // the client stays uninitialized after a failed connect
    let stats = client.stats().await;
    assert!(!stats.initialized);
}

#[tokio::test]
async fn stats_echo_the_input_configuration() -> Result<(), WebSqlite3Error> {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.connection.database = dir.path().join("test.db").display().to_string();
    config.pool.max_size = 2;
    config.server.charset = "latin1".to_string();

    let client = Client::new(config.clone());
    client.connect().await?;

    let stats = client.stats().await;
    assert_eq!(stats.config, config);

    // the snapshot serializes with the documented stable keys
    let json = serde_json::to_value(&stats).expect("serialize stats");
    assert!(json["pool"]["size"].is_u64());
    assert!(json["executor"]["queue_size"].is_u64());
    assert_eq!(json["config"]["server"]["charset"], "latin1");

    client.close().await?;
    Ok(())
}
