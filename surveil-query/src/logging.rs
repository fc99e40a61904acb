//! Logging configuration.
//!
//! The engine emits `tracing` events and spans only; installing a subscriber
//! is left to the application. [`setup::init_logging`] is a convenience for
//! binaries and tests that do not bring their own.

/// Controls how much of each request the client logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether request bodies are included in debug events
    pub log_request_bodies: bool,
    /// Maximum length of logged bodies and problem details
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_request_bodies: false,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Logs request bodies at full detail; for debugging filters.
    pub fn verbose() -> Self {
        Self {
            log_request_bodies: true,
            max_field_length: 4096,
        }
    }

    /// Keeps only short fields and no bodies.
    pub fn production() -> Self {
        Self {
            log_request_bodies: false,
            max_field_length: 128,
        }
    }
}

/// Cuts `value` to at most `max_length` bytes on a character boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let end = value
        .char_indices()
        .map(|(index, _)| index)
        .take_while(|&index| index <= max_length)
        .last()
        .unwrap_or(0);
    format!("{}...(truncated)", &value[..end])
}

/// Subscriber installation for binaries and tests.
pub mod setup {
    use tracing::Level;

    /// Configuration for [`init_logging`].
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for everything outside this crate
        pub level: Level,
        /// Level for `surveil_query` targets
        pub crate_level: Level,
        /// Emit JSON lines instead of human-readable text
        pub json_format: bool,
        /// Explicit filter directive, overriding both levels
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                crate_level: Level::INFO,
                json_format: true,
                env_filter: None,
            }
        }

        pub fn development() -> Self {
            Self {
                level: Level::DEBUG,
                crate_level: Level::DEBUG,
                json_format: false,
                env_filter: None,
            }
        }

        pub fn with_level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        pub fn with_json_format(mut self, enabled: bool) -> Self {
            self.json_format = enabled;
            self
        }

        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// The filter directive used when `RUST_LOG` is not set.
        pub fn env_filter(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},surveil_query={}",
                    self.level.as_str().to_lowercase(),
                    self.crate_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Installs a global `tracing` subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured filter. Fails if a
    /// global subscriber is already installed.
    ///
    /// ```rust,no_run
    /// use surveil_query::logging::setup::{init_logging, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_json_format(true)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = if config.json_format {
            tracing_subscriber::fmt::layer().json().boxed()
        } else {
            tracing_subscriber::fmt::layer().boxed()
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::setup::LoggingConfig;
    use super::*;

    #[test]
    fn test_log_config_presets() {
        assert!(!LogConfig::default().log_request_bodies);
        assert!(LogConfig::verbose().log_request_bodies);
        assert_eq!(LogConfig::production().max_field_length, 128);
    }

    #[test]
    fn test_truncate_field() {
        assert_eq!(truncate_field("hello", 10), "hello");
        assert_eq!(
            truncate_field(r#"{"country":"Switzerland"}"#, 10),
            r#"{"country"...(truncated)"#
        );
        // Never splits a multi-byte character.
        assert_eq!(truncate_field("Zürich", 2), "Z...(truncated)");
    }

    #[test]
    fn test_env_filter_directive() {
        assert_eq!(LoggingConfig::default().env_filter(), "info,surveil_query=debug");
        assert_eq!(
            LoggingConfig::production().with_env_filter("off").env_filter(),
            "off"
        );
    }
}
