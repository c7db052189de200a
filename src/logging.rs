//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Filter for the configured level; `RUST_LOG` wins when set.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("scpi_doom={}", level)))
}

/// Install the global subscriber, writing to stderr so stdout stays clean for
/// results. Safe to call more than once.
pub fn init(level: &str, color: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(false)
        .try_init();
}
