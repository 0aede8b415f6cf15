//! Structured logging setup (spec §2 ambient addition). One call at process
//! start; every request span and log line flows through `tracing` rather
//! than ad-hoc `println!`.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, falling back to `info` so the filter (like the rest of
/// config) never needs to be set for a sane default.
pub fn init() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
