//! Configuration for the unit-test control plane.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! (`--config-path` or `UT_CONTROL_CONFIG_PATH`), then `UT_CONTROL_*`
//! environment variables, then command-line flags. [`Config::validate`]
//! rejects values the control plane cannot run with.

mod defaults;
mod error;
mod logging;

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    CONFIG_PATH_ENV, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_MAX_CALLBACK_ENTRIES,
    DEFAULT_HEAD_TIMEOUT_MS, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_PORT, DEFAULT_QUEUE_CAPACITY, DEFAULT_SERVICE_INTERVAL_MS,
    DEFAULT_SHUTDOWN_TIMEOUT_MS, ENV_PREFIX, MAX_QUEUE_CAPACITY, default_log_filter,
    default_log_format,
};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};

/// Control plane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "UT_CONTROL")]
pub struct Config {
    /// Interface the transport binds.
    #[serde(default = "defaults::default_host")]
    host: String,
    /// Listening port.
    #[serde(default = "defaults::default_port")]
    port: u16,
    /// `EnvFilter` expression for telemetry.
    #[serde(default = "defaults::default_log_filter_string")]
    log_filter: String,
    /// Log line format, `json` or `compact`.
    #[serde(default = "defaults::default_log_format")]
    log_format: LogFormat,
    /// Message queue bound.
    #[serde(default = "defaults::default_queue_capacity")]
    queue_capacity: usize,
    /// Registry capacity per handler kind.
    #[serde(default = "defaults::default_max_callback_entries")]
    max_callback_entries: usize,
    /// Pause between service ticks, in milliseconds.
    #[serde(default = "defaults::default_service_interval_ms")]
    service_interval_ms: u64,
    /// Bound on each shutdown phase, in milliseconds.
    #[serde(default = "defaults::default_shutdown_timeout_ms")]
    shutdown_timeout_ms: u64,
    /// Largest accepted payload, in bytes.
    #[serde(default = "defaults::default_max_message_bytes")]
    max_message_bytes: usize,
    /// Connections served at once; further connections are refused.
    #[serde(default = "defaults::default_max_connections")]
    max_connections: usize,
    /// Time allowed for a complete request head, in milliseconds.
    #[serde(default = "defaults::default_head_timeout_ms")]
    head_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: defaults::default_host(),
            port: DEFAULT_PORT,
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_callback_entries: DEFAULT_MAX_CALLBACK_ENTRIES,
            service_interval_ms: DEFAULT_SERVICE_INTERVAL_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            head_timeout_ms: DEFAULT_HEAD_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Merges defaults, the configuration file and the `UT_CONTROL_*`
    /// variables, ignoring the process arguments, then validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be read or merged
    /// and [`ConfigError::Invalid`] when validation fails.
    pub fn from_environment() -> Result<Self, ConfigError> {
        Self::from_args([OsString::from(env!("CARGO_PKG_NAME"))])
    }

    /// Like [`Config::from_environment`], with `args` as the command line.
    /// The first item is the program name; the rest are flags such as
    /// `--port 9000` or `--config-path control.toml`.
    ///
    /// # Errors
    ///
    /// As [`Config::from_environment`].
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let config = Self::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field against the ranges the control plane accepts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be non-zero"));
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::invalid("log_filter", "must not be empty"));
        }
        if !(1..=MAX_QUEUE_CAPACITY).contains(&self.queue_capacity) {
            return Err(ConfigError::invalid(
                "queue_capacity",
                format!("must be between 1 and {MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.max_callback_entries == 0 {
            return Err(ConfigError::invalid("max_callback_entries", "must be non-zero"));
        }
        if self.service_interval_ms == 0 {
            return Err(ConfigError::invalid("service_interval_ms", "must be non-zero"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::invalid("shutdown_timeout_ms", "must be non-zero"));
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::invalid("max_message_bytes", "must be non-zero"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_connections", "must be non-zero"));
        }
        if self.head_timeout_ms == 0 {
            return Err(ConfigError::invalid("head_timeout_ms", "must be non-zero"));
        }
        Ok(())
    }

    /// Interface the transport binds.
    #[must_use]
    pub const fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Listening port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// `EnvFilter` expression for telemetry.
    #[must_use]
    pub const fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Output format for telemetry.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Message queue bound.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Registry capacity per handler kind.
    #[must_use]
    pub const fn max_callback_entries(&self) -> usize {
        self.max_callback_entries
    }

    /// Pause between service ticks; also the connection read timeout.
    #[must_use]
    pub const fn service_interval(&self) -> Duration {
        Duration::from_millis(self.service_interval_ms)
    }

    /// Bound on each shutdown phase.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Largest accepted payload, in bytes.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Connections served at once.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Deadline for a connection's request head, measured from accept.
    #[must_use]
    pub const fn head_timeout(&self) -> Duration {
        Duration::from_millis(self.head_timeout_ms)
    }

    /// Replaces the interface.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Replaces the listening port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Replaces the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Replaces the message queue bound.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Replaces the registry capacity.
    #[must_use]
    pub const fn with_max_callback_entries(mut self, entries: usize) -> Self {
        self.max_callback_entries = entries;
        self
    }

    /// Replaces the service tick interval. Sub-millisecond precision is
    /// dropped.
    #[must_use]
    pub fn with_service_interval(mut self, interval: Duration) -> Self {
        self.service_interval_ms = millis(interval);
        self
    }

    /// Replaces the shutdown bound. Sub-millisecond precision is dropped.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = millis(timeout);
        self
    }

    /// Replaces the payload ceiling.
    #[must_use]
    pub const fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Replaces the connection bound.
    #[must_use]
    pub const fn with_max_connections(mut self, connections: usize) -> Self {
        self.max_connections = connections;
        self
    }

    /// Replaces the request head deadline. Sub-millisecond precision is
    /// dropped.
    #[must_use]
    pub fn with_head_timeout(mut self, timeout: Duration) -> Self {
        self.head_timeout_ms = millis(timeout);
        self
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
