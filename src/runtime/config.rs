//! Runtime configuration.
//!
//! Most callers should use [`RuntimeBuilder`](super::builder::RuntimeBuilder)
//! rather than filling in a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `compute_threads` | available CPU parallelism |
//! | `blocking_threads` | `max(4, 2 * compute_threads)` |
//! | `thread_stack_size` | 2 MiB |
//! | `thread_name_prefix` | `"fiberguard"` |
//! | `timer_thread_name` | `"fiberguard-timer"` |
//!
//! With the `config-file` feature the same fields can be loaded from TOML;
//! missing keys take their defaults.
//!
//! ```toml
//! compute_threads = 4
//! thread_name_prefix = "ingest"
//! ```

use serde::Deserialize;

const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_PREFIX: &str = "fiberguard";
const DEFAULT_TIMER_NAME: &str = "fiberguard-timer";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Workers of the compute context.
    pub compute_threads: usize,
    /// Workers of the blocking context.
    pub blocking_threads: usize,
    /// Stack size of every worker thread.
    pub thread_stack_size: usize,
    /// Prefix of worker thread names; each context appends its own suffix.
    pub thread_name_prefix: String,
    /// Name of the timer driver thread.
    pub timer_thread_name: String,
}

impl RuntimeConfig {
    /// Clamps zero or empty values back to usable defaults.
    pub fn normalize(&mut self) {
        if self.compute_threads == 0 {
            self.compute_threads = 1;
        }
        if self.blocking_threads == 0 {
            self.blocking_threads = 1;
        }
        if self.thread_stack_size == 0 {
            self.thread_stack_size = DEFAULT_STACK_SIZE;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_PREFIX.to_string();
        }
        if self.timer_thread_name.is_empty() {
            self.timer_thread_name = DEFAULT_TIMER_NAME.to_string();
        }
    }

    pub(crate) fn default_compute_threads() -> usize {
        std::thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .max(1)
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](crate::error::ErrorKind::InvalidConfig)
    /// for malformed TOML or unknown keys.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(text: &str) -> Result<Self, crate::error::Error> {
        let mut config: Self = toml::from_str(text).map_err(|err| {
            crate::error::Error::new(crate::error::ErrorKind::InvalidConfig)
                .with_message("runtime config")
                .with_source(err)
        })?;
        config.normalize();
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`](crate::error::ErrorKind::InvalidConfig)
    /// if the file cannot be read or parsed.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::error::Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            crate::error::Error::new(crate::error::ErrorKind::InvalidConfig)
                .with_message(format!("reading {}", path.display()))
                .with_source(err)
        })?;
        Self::from_toml_str(&text)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let compute_threads = Self::default_compute_threads();
        Self {
            compute_threads,
            blocking_threads: compute_threads.saturating_mul(2).max(4),
            thread_stack_size: DEFAULT_STACK_SIZE,
            thread_name_prefix: DEFAULT_PREFIX.to_string(),
            timer_thread_name: DEFAULT_TIMER_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_zeroes() {
        let mut config = RuntimeConfig {
            compute_threads: 0,
            blocking_threads: 0,
            thread_stack_size: 0,
            thread_name_prefix: String::new(),
            timer_thread_name: String::new(),
        };
        config.normalize();
        assert_eq!(config.compute_threads, 1);
        assert_eq!(config.blocking_threads, 1);
        assert_eq!(config.thread_stack_size, DEFAULT_STACK_SIZE);
        assert_eq!(config.thread_name_prefix, "fiberguard");
        assert_eq!(config.timer_thread_name, "fiberguard-timer");
    }

    #[test]
    fn defaults_scale_blocking_pool() {
        let config = RuntimeConfig::default();
        assert!(config.compute_threads >= 1);
        assert!(config.blocking_threads >= 4);
        assert!(config.blocking_threads >= config.compute_threads);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = RuntimeConfig::from_toml_str("compute_threads = 3\n").expect("parse");
        assert_eq!(config.compute_threads, 3);
        assert_eq!(config.thread_name_prefix, "fiberguard");
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_rejects_unknown_keys() {
        let err = RuntimeConfig::from_toml_str("worker_count = 3\n").expect_err("unknown key");
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidConfig);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_round_trip() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "blocking_threads = 6").expect("write");
        let config = RuntimeConfig::from_toml_file(file.path()).expect("load");
        assert_eq!(config.blocking_threads, 6);
    }
}
