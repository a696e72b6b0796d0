//! Database layer for Paper Curator
//!
//! Provides:
//! - SeaORM paper entity
//! - Paper repository
//! - Connection pool management and schema bootstrap

pub mod models;
mod repository;

pub use repository::{NewPaper, PaperRepository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::PaperEntity;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(config.echo_sql);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!(backend = ?conn.get_database_backend(), "Database connection established");

        Ok(Self { conn })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }

    /// Create the `papers` table and its unique index if they do not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        let schema = Schema::new(backend);

        let mut stmt = schema.create_table_from_entity(PaperEntity);
        stmt.if_not_exists();

        self.conn.execute(backend.build(&stmt)).await?;

        info!("Database schema ready");
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let pool = test_support::sqlite_pool().await;
        pool.init_schema().await.unwrap();
        pool.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let config = DatabaseConfig {
            url: "postgres://nobody@127.0.0.1:1/missing".to_string(),
            connect_timeout_secs: 1,
            min_connections: 0,
            ..DatabaseConfig::default()
        };
        match DbPool::new(&config).await {
            Err(AppError::DatabaseConnection { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connection to a closed port succeeded"),
        }
    }
}
