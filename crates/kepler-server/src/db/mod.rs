//! Database pool and errors

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Ledger operation errors with contextual information
#[derive(Error, Debug)]
pub enum DbError {
    /// SQL query or connection error
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Database migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Database configuration is invalid or missing
    #[error("Database configuration error: {0}. Check DATABASE_URL and connection settings.")]
    Config(String),

    /// Requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// A stored value does not map onto the domain model
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Create a not found error with resource context
    pub fn not_found(resource_type: &str, identifier: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{} '{}' not found in database", resource_type, identifier))
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl From<&DatabaseConfig> for DbConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
        }
    }
}

pub async fn create_pool(config: &DbConfig) -> DbResult<PgPool> {
    if config.url.is_empty() {
        return Err(DbError::config("DATABASE_URL is empty"));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

/// Apply the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DbError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_database_section() {
        let section = DatabaseConfig {
            url: "postgresql://localhost/kepler_test".to_string(),
            max_connections: 4,
            min_connections: 1,
            connect_timeout_secs: 5,
        };
        let config = DbConfig::from(&section);
        assert_eq!(config.max_connections, 4);
        assert!(config.url.ends_with("kepler_test"));
    }

    #[tokio::test]
    async fn test_create_pool_rejects_empty_url() {
        let config = DbConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            connect_timeout_secs: 1,
        };
        assert!(matches!(create_pool(&config).await, Err(DbError::Config(_))));
    }

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found("Item", "f9ff3561");
        assert_eq!(err.to_string(), "Item 'f9ff3561' not found in database");
    }
}
