//! Logging setup.
//!
//! Stdout carries the protocol stream, so all log output goes to stderr.
//! `LOG_LEVEL` (DEBUG/INFO/WARN/ERROR) seeds the filter; `--log-level`
//! overrides it.

use tracing_subscriber::filter::EnvFilter;

pub fn init(override_level: Option<&str>) {
    let level = override_level
        .map(str::to_owned)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| String::from("INFO"));

    let filter = EnvFilter::try_new(level.to_ascii_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
