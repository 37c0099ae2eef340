//! Log output for processes that host a control plane.
//!
//! Every `ut_control` event goes through one global subscriber built from
//! [`Config::log_filter`] and [`Config::log_format`]. A test harness that
//! already installed its own subscriber keeps it, and the control plane's
//! events flow into that subscriber instead.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, debug};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::{self, MakeWriter, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};
use ut_control_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static INSTALLED: OnceCell<TelemetryHandle> = OnceCell::new();

/// Which subscriber receives control-plane events after [`initialise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryHandle {
    /// This crate installed the global subscriber.
    Installed {
        /// Format of the installed output.
        format: LogFormat,
    },
    /// The host process had already installed a subscriber, which is left in
    /// place.
    Host,
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured filter is not an `EnvFilter` expression.
    #[error("invalid log filter '{filter}': {source}")]
    Filter {
        /// Expression as configured.
        filter: String,
        /// Parser error.
        #[source]
        source: ParseError,
    },
}

/// Sends control-plane events to stderr, colouring compact output only when
/// stderr is a terminal.
///
/// Only the first call has any effect; later calls return its handle.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the configured filter does not
/// parse.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let ansi = io::stderr().is_terminal();
    INSTALLED
        .get_or_try_init(|| install(config, io::stderr, ansi))
        .copied()
}

/// Like [`initialise`], writing to `writer` without colour.
///
/// # Errors
///
/// As [`initialise`].
pub fn initialise_with_writer<W>(config: &Config, writer: W) -> Result<TelemetryHandle, TelemetryError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    INSTALLED
        .get_or_try_init(|| install(config, writer, false))
        .copied()
}

fn install<W>(config: &Config, writer: W, ansi: bool) -> Result<TelemetryHandle, TelemetryError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let format = config.log_format();
    let subscriber = build(config, writer, ansi)?;
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!(target: TELEMETRY_TARGET, "host subscriber already installed");
        return Ok(TelemetryHandle::Host);
    }
    debug!(target: TELEMETRY_TARGET, %format, filter = config.log_filter(), "telemetry installed");
    Ok(TelemetryHandle::Installed { format })
}

fn build<W>(
    config: &Config,
    writer: W,
    ansi: bool,
) -> Result<impl Subscriber + Send + Sync + 'static, TelemetryError>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::builder()
        .parse(config.log_filter())
        .map_err(|source| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            source,
        })?;
    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(output(config.log_format(), writer, ansi)))
}

fn output<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_thread_names(true)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().with_ansi(ansi).boxed(),
    }
}
