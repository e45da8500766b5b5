/// Database layer
///
/// libsql implementation of the catalog, transition log and report store
/// consumed by the monitoring engine.
pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::DatabaseImpl;

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
