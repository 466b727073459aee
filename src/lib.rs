/*!
 * web-sqlite3 - prioritized, pooled access to embedded SQLite
 *
 * This crate puts a concurrent access layer in front of a single SQLite
 * database: a bounded pool of reusable connections with lifecycle
 * management, and a priority-scheduled executor that fans submitted
 * requests out over a fixed set of workers. Requests carry a priority and
 * an optional timeout; the layer guarantees fair priority ordering with
 * FIFO tie-breaking, bounded concurrency, and transaction scopes that pin
 * exactly one connection.
 *
 * # Features
 *
 * - Asynchronous API over the blocking SQLite driver (one worker thread
 *   per connection, so the runtime never blocks)
 * - Connection lifecycle policies: min/max sizing, idle eviction, age and
 *   use-count recycling, health tracking
 * - Four-level priority scheduling with submission-order fairness
 * - Deadlines observed at queue wait, pool acquisition, and execution
 * - Scoped transactions with rollback on every early exit path
 *
 * # Example
 *
 * ```rust,no_run
 * use web_sqlite3::prelude::*;
 *
 * async fn example() -> Result<(), WebSqlite3Error> {
 *     let mut config = Config::default();
 *     config.connection.database = "app.db".to_string();
 *
 *     let client = Client::new(config);
 *     client.connect().await?;
 *
 *     client
 *         .execute(
 *             "CREATE TABLE IF NOT EXISTS users (id INTEGER PRIMARY KEY, name TEXT)",
 *             &[],
 *         )
 *         .await?;
 *     client
 *         .execute(
 *             "INSERT INTO users (name) VALUES (?1)",
 *             &[SqlValue::Text("alice".into())],
 *         )
 *         .await?;
 *
 *     let rows = client.fetchall("SELECT id, name FROM users", &[]).await?;
 *     for row in rows {
 *         println!("{:?}", row.get("name"));
 *     }
 *
 *     let mut tx = client.transaction().await?;
 *     tx.execute(
 *         "UPDATE users SET name = ?1 WHERE id = ?2",
 *         &[SqlValue::Text("bob".into()), SqlValue::Int(1)],
 *         None,
 *     )
 *     .await?;
 *     tx.commit().await?;
 *
 *     client.close().await?;
 *     Ok(())
 * }
 * ```
 */

#![forbid(unsafe_code)]

// Core modules
pub mod client;
pub mod config;
pub mod error;
pub mod results;
pub mod stats;
pub mod transaction;
pub mod types;

// Internal machinery
mod connection;
mod executor;
mod pool;

// Re-export everything that should be part of the public API
pub mod prelude {
    //! Convenient imports for common functionality.

    pub use crate::client::{Client, QueryOptions};
    pub use crate::config::{Config, ConnectionConfig, PoolConfig, ServerConfig};
    pub use crate::connection::RequestKind;
    pub use crate::error::WebSqlite3Error;
    pub use crate::results::{FromRow, QueryResult, Row};
    pub use crate::stats::{ExecutorStats, PoolStats, Stats};
    pub use crate::transaction::{ConnectionScope, TransactionScope};
    pub use crate::types::{IsolationLevel, Priority, SqlValue};
}

// Direct exports of frequently used types for simplicity
pub use client::{Client, QueryOptions};
pub use config::{Config, ConnectionConfig, PoolConfig, ServerConfig};
pub use connection::RequestKind;
pub use error::WebSqlite3Error;
pub use results::{FromRow, QueryResult, Row};
pub use stats::{ExecutorStats, PoolStats, Stats};
pub use transaction::{ConnectionScope, TransactionScope};
pub use types::{IsolationLevel, Priority, SqlValue};
