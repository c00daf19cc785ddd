//! Structured logging with tracing.
//!
//! Events are emitted as tracing fields (`event = "...", key = value`)
//! and rendered as single-line JSON records with the fields flattened to
//! the top level, so downstream collectors can parse them without a
//! bespoke grammar. `RUST_LOG` overrides the configured level when set.

use tracing::Level;
use tracing_subscriber::EnvFilter;

use onegraph_domain::error::{Error, Result};

/// Parse a configured log level name.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unrecognised level.
pub fn parse_log_level(value: &str) -> Result<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::config(format!("unknown log level '{other}'"))),
    }
}

/// Install the global tracing subscriber.
///
/// Records are rendered as flattened single-line JSON. Safe to call more
/// than once; only the first call installs.
///
/// # Errors
///
/// Returns [`Error::Config`] for an unrecognised level.
pub fn init_logging(level: &str) -> Result<()> {
    let level = parse_log_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
    Ok(())
}
