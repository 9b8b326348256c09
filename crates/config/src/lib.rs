#![deny(
    trivial_numeric_casts,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    unused_results
)]
#![warn(rust_2021_compatibility, unreachable_pub)]

//! Configuration for the Pooled Executor.
//!
//! The executor recognizes a single option, `executor_thread_pool_size`
//! (legacy alias: `rpc_thread_pool_size`, carried over from the RPC variant
//! of dispatch this crate's source shares a configuration surface with).

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

/// Errors for the config module.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The config file could not be read or parsed.
    #[error("invalid configuration file `{file}` - {message}")]
    InvalidConfig {
        /// The path to the config file.
        file: String,
        /// The error message.
        message: String,
    },

    /// `executor_thread_pool_size` was present but out of range.
    #[error("executor_thread_pool_size must be >= 1, got {value}")]
    InvalidThreadPoolSize {
        /// The rejected value.
        value: usize,
    },
}

const DEFAULT_THREAD_POOL_SIZE: usize = 64;

/// Configuration consumed by the Pooled Executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker slots in the pooled executor. Must be `>= 1`.
    #[serde(default = "default_thread_pool_size", alias = "rpc_thread_pool_size")]
    pub executor_thread_pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            executor_thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
        }
    }
}

fn default_thread_pool_size() -> usize {
    DEFAULT_THREAD_POOL_SIZE
}

impl ExecutorConfig {
    /// Validates that `executor_thread_pool_size` is at least 1.
    pub fn validate(&self) -> Result<(), Error> {
        if self.executor_thread_pool_size == 0 {
            return Err(Error::InvalidThreadPoolSize {
                value: self.executor_thread_pool_size,
            });
        }
        Ok(())
    }

    /// Parses an [`ExecutorConfig`] from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|err| Error::InvalidConfig {
            file: "<string>".to_string(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads an [`ExecutorConfig`] from a YAML file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let display = path.as_ref().display().to_string();
        debug!(file = %display, "loading executor configuration");

        let contents = std::fs::read_to_string(&path).map_err(|err| Error::InvalidConfig {
            file: display.clone(),
            message: err.to_string(),
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|err| Error::InvalidConfig {
            file: display.clone(),
            message: err.to_string(),
        })?;
        config.validate().map_err(|_| Error::InvalidConfig {
            file: display,
            message: format!("executor_thread_pool_size must be >= 1, got {}", config.executor_thread_pool_size),
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_sixty_four() {
        assert_eq!(ExecutorConfig::default().executor_thread_pool_size, 64);
    }

    #[test]
    fn missing_key_falls_back_to_default() {
        let config = ExecutorConfig::from_yaml_str("{}").expect("empty document should parse");
        assert_eq!(config.executor_thread_pool_size, 64);
    }

    #[test]
    fn explicit_key_is_honored() {
        let config = ExecutorConfig::from_yaml_str("executor_thread_pool_size: 8").expect("should parse");
        assert_eq!(config.executor_thread_pool_size, 8);
    }

    #[test]
    fn legacy_alias_is_honored() {
        let config = ExecutorConfig::from_yaml_str("rpc_thread_pool_size: 4").expect("should parse");
        assert_eq!(config.executor_thread_pool_size, 4);
    }

    #[test]
    fn zero_is_rejected() {
        let err = ExecutorConfig::from_yaml_str("executor_thread_pool_size: 0").expect_err("zero should be rejected");
        assert!(matches!(err, Error::InvalidThreadPoolSize { value: 0 }));
    }

    #[test]
    fn load_missing_file_reports_invalid_config() {
        let err = ExecutorConfig::load("/nonexistent/path/to/config.yaml").expect_err("missing file should error");
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
