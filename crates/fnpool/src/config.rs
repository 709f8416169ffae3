//! Worker pool configuration
//!
//! Configuration is built in code or loaded from environment variables.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default prefix for worker thread names
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "fnpool-worker";

/// Worker pool configuration
///
/// # Example
///
/// ```
/// use fnpool::PoolConfig;
///
/// let config = PoolConfig::new(4)
///     .with_thread_name_prefix("hasher")
///     .with_stack_size(4 * 1024 * 1024);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads, fixed for the lifetime of the pool
    pub size: usize,

    /// Worker threads are named `{prefix}-{index}`
    pub thread_name_prefix: String,

    /// Stack size for worker threads (platform default when unset)
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration for a pool of `size` workers
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Set the worker thread name prefix
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size in bytes
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size == 0 {
            return Err(ConfigError::InvalidSize(0));
        }
        if self.stack_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                name: "stack_size".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `FNPOOL_SIZE`: Number of workers (default: available parallelism)
    /// - `FNPOOL_THREAD_NAME_PREFIX`: Worker thread name prefix (default: fnpool-worker)
    /// - `FNPOOL_STACK_SIZE`: Worker stack size in bytes (default: platform default)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("FNPOOL_SIZE") {
            let size: i64 = parse_var("FNPOOL_SIZE", &value)?;
            if size <= 0 {
                return Err(ConfigError::InvalidSize(size));
            }
            config.size = usize::try_from(size).map_err(|_| invalid("FNPOOL_SIZE", &value))?;
        }

        if let Some(prefix) = lookup("FNPOOL_THREAD_NAME_PREFIX") {
            if !prefix.trim().is_empty() {
                config.thread_name_prefix = prefix.trim().to_string();
            }
        }

        if let Some(value) = lookup("FNPOOL_STACK_SIZE") {
            config.stack_size = Some(parse_var("FNPOOL_STACK_SIZE", &value)?);
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}
