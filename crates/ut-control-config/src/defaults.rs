//! Built-in configuration values.

use crate::logging::LogFormat;

/// Interface the transport binds when nothing else is configured.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Listening port when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8080;

/// Default `EnvFilter` expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default message queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Largest message queue bound accepted.
pub const MAX_QUEUE_CAPACITY: usize = 1024;

/// Default registry capacity, per handler kind.
pub const DEFAULT_MAX_CALLBACK_ENTRIES: usize = 32;

/// Default pause between service ticks, in milliseconds.
pub const DEFAULT_SERVICE_INTERVAL_MS: u64 = 50;

/// Default bound on each shutdown phase, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Default ceiling on a single payload, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_048_576;

/// Default bound on concurrently served connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

/// Default time a connection may take to send a complete request head, in
/// milliseconds.
pub const DEFAULT_HEAD_TIMEOUT_MS: u64 = 5_000;

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "UT_CONTROL";

/// Environment variable naming a configuration file.
pub const CONFIG_PATH_ENV: &str = "UT_CONTROL_CONFIG_PATH";

pub(crate) fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

pub(crate) const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default log format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

pub(crate) const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

pub(crate) const fn default_max_callback_entries() -> usize {
    DEFAULT_MAX_CALLBACK_ENTRIES
}

pub(crate) const fn default_service_interval_ms() -> u64 {
    DEFAULT_SERVICE_INTERVAL_MS
}

pub(crate) const fn default_shutdown_timeout_ms() -> u64 {
    DEFAULT_SHUTDOWN_TIMEOUT_MS
}

pub(crate) const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

pub(crate) const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

pub(crate) const fn default_head_timeout_ms() -> u64 {
    DEFAULT_HEAD_TIMEOUT_MS
}
