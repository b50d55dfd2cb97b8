//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `KRD_DATABASE_URL` - `PostgreSQL` connection string for the document
//!   store (falls back to `DATABASE_URL`; unset means in-memory store)
//! - `KRD_HOST` - Bind address (default: 127.0.0.1)
//! - `KRD_PORT` - Listen port (default: 3000)
//! - `KRD_LOCAL_STORAGE_DIR` - Directory for device-local storage (default: .krd/local-storage)
//! - `KRD_CART_DEBOUNCE_MS` - Cart/wishlist write debounce (default: 2000)
//! - `KRD_UPLOAD_DEBOUNCE_MS` - Upload queue debounce (default: 5000)
//! - `KRD_UPLOAD_BATCH_SIZE` - Records per flush (default: 10)
//! - `KRD_UPLOAD_ITEM_DELAY_MS` - Pause between creations in a batch (default: 200)
//! - `KRD_UPLOAD_DRAIN_DELAY_MS` - Pause before the next batch (default: 1000)
//! - `KRD_UPLOAD_MAX_ATTEMPTS` - Failed creations before dead-lettering (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate, 0.0 to 1.0 (default: 1.0)

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` URL for the document store (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Directory backing device-local storage
    pub local_storage_dir: PathBuf,
    /// Cart/wishlist synchronization settings
    pub cart: CartSyncConfig,
    /// Deferred upload queue settings
    pub uploads: UploadQueueConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
}

/// Cart/wishlist synchronization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSyncConfig {
    /// Quiet period before a mutation burst is written to the mirror.
    pub debounce: Duration,
    /// Buffered `SyncEvent`s per subscriber before old ones are dropped.
    pub event_capacity: usize,
}

impl Default for CartSyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(2000),
            event_capacity: 64,
        }
    }
}

/// Deferred upload queue settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadQueueConfig {
    /// Quiet period after the last enqueue before flushing.
    pub debounce: Duration,
    /// Maximum records written per flush.
    pub batch_size: usize,
    /// Pause between successive creations within a batch.
    pub item_delay: Duration,
    /// Pause before the follow-up flush when records remain.
    pub drain_delay: Duration,
    /// Failed creations after which a record is dead-lettered.
    pub max_attempts: u32,
    /// Dead-lettered records kept for inspection; oldest are dropped first.
    pub dead_letter_capacity: usize,
    /// Buffered `QueueEvent`s per subscriber.
    pub event_capacity: usize,
}

impl Default for UploadQueueConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(5000),
            batch_size: 10,
            item_delay: Duration::from_millis(200),
            drain_delay: Duration::from_millis(1000),
            max_attempts: 5,
            dead_letter_capacity: 100,
            event_capacity: 256,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let database_url = env
            .optional("KRD_DATABASE_URL")
            .or_else(|| env.optional("DATABASE_URL"))
            .map(SecretString::from);
        let host = env.parsed_or("KRD_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = env.parsed_or("KRD_PORT", 3000u16)?;
        let local_storage_dir = env
            .optional("KRD_LOCAL_STORAGE_DIR")
            .map_or_else(|| PathBuf::from(".krd/local-storage"), PathBuf::from);

        let cart_defaults = CartSyncConfig::default();
        let cart = CartSyncConfig {
            debounce: env.millis_or("KRD_CART_DEBOUNCE_MS", cart_defaults.debounce)?,
            ..cart_defaults
        };

        let upload_defaults = UploadQueueConfig::default();
        let uploads = UploadQueueConfig {
            debounce: env.millis_or("KRD_UPLOAD_DEBOUNCE_MS", upload_defaults.debounce)?,
            batch_size: env.positive_or("KRD_UPLOAD_BATCH_SIZE", upload_defaults.batch_size)?,
            item_delay: env.millis_or("KRD_UPLOAD_ITEM_DELAY_MS", upload_defaults.item_delay)?,
            drain_delay: env.millis_or("KRD_UPLOAD_DRAIN_DELAY_MS", upload_defaults.drain_delay)?,
            max_attempts: env
                .positive_or("KRD_UPLOAD_MAX_ATTEMPTS", upload_defaults.max_attempts)?,
            ..upload_defaults
        };

        let sentry_sample_rate = env.parsed_or("SENTRY_SAMPLE_RATE", 1.0f32)?;
        if !(0.0..=1.0).contains(&sentry_sample_rate) {
            return Err(ConfigError::InvalidEnvVar(
                "SENTRY_SAMPLE_RATE".to_string(),
                format!("must be between 0.0 and 1.0 (got {sentry_sample_rate})"),
            ));
        }

        Ok(Self {
            database_url,
            host,
            port,
            local_storage_dir,
            cart,
            uploads,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate,
        })
    }

    /// The database URL, for commands that cannot fall back to memory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no database URL is configured.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("KRD_DATABASE_URL".to_string()))
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Typed accessors over a variable lookup function.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Present and non-blank, trimmed.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }

    fn positive_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed_or(key, default)?;
        if value <= T::default() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(value)
    }
}
