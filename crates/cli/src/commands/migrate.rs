//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! krd-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `KRD_DATABASE_URL` - `PostgreSQL` connection string for the document store
//!
//! # Migration Files
//!
//! Migrations live in `crates/storefront/migrations/` and are embedded into
//! the storefront crate at build time.

use krd_storefront::config::{ConfigError, StorefrontConfig};
use krd_storefront::db;
use thiserror::Error;

/// Errors that can occur while migrating.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run the storefront document store migrations.
///
/// # Errors
///
/// Returns `MigrationError` if the URL is missing, the database is
/// unreachable, or a migration fails.
pub async fn run() -> Result<(), MigrationError> {
    let config = StorefrontConfig::from_env()?;
    let database_url = config.require_database_url()?;

    tracing::info!("Connecting to document database...");
    let pool = db::create_pool(database_url).await?;

    tracing::info!("Running storefront migrations...");
    db::MIGRATOR.run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}
