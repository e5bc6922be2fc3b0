//! Structured logging for graphd.
//!
//! Centralized `tracing` configuration; the filter is read from the
//! `GRAPHD_LOG` environment variable.
//!
//! # Environment Variables
//!
//! - `GRAPHD_LOG=info` - default level
//! - `GRAPHD_LOG=graphd_storage::engine=debug` - module-specific logging
//! - `GRAPHD_LOG=warn,graphd_storage::partition=trace` - combined filters

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber with default settings.
///
/// Call once at startup; subsequent calls are ignored, since tracing only
/// allows one global subscriber.
pub fn init() {
    init_with_default("info");
}

/// Initializes the subscriber with a custom default level, used when
/// `GRAPHD_LOG` is not set.
pub fn init_with_default(default_level: &str) {
    let filter =
        EnvFilter::try_from_env("GRAPHD_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let _ = subscriber.try_init();
}

/// Initializes logging with JSON output, for deployments where logs feed an
/// aggregator.
pub fn init_json() {
    let filter = EnvFilter::try_from_env("GRAPHD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter).with_target(true).json();

    let _ = subscriber.try_init();
}
