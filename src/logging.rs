//! Diagnostics go to stderr; stdout is left for the final run message.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,fetchgate=debug";

pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}
