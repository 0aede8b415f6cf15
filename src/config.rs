//! Startup configuration (spec §6). Loaded once from environment variables
//! with defaults, the way the teacher composes `env::var` lookups with
//! fallbacks rather than reaching for a heavier config-file framework.

use std::collections::HashMap;
use std::env::VarError;
use std::str::FromStr;
use std::time::Duration;

use crate::authorization::ScopeConfig;
use crate::limiter::LimiterKey;
use crate::model::{DEFAULT_MAX_TOKENS, DEFAULT_REFILL_INTERVAL_SECS, DEFAULT_REFILL_RATE};

const DEFAULT_CACHE_STALENESS: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone)]
pub struct Config {
	pub rate_limiter_configurable_via_header: bool,
	pub dynamodb_table: String,
	pub user_pool_id: String,
	pub scopes: HashMap<String, ScopeConfig>,
	pub default_limiter: LimiterKey,
	pub hybrid_v2_staleness: Duration,
	pub default_refill_rate: u64,
	pub default_refill_interval_secs: u64,
	pub default_max_tokens: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			rate_limiter_configurable_via_header: false,
			dynamodb_table: String::new(),
			user_pool_id: String::new(),
			scopes: HashMap::new(),
			default_limiter: LimiterKey::ReducedAtomicityHybridV2,
			hybrid_v2_staleness: DEFAULT_CACHE_STALENESS,
			default_refill_rate: DEFAULT_REFILL_RATE,
			default_refill_interval_secs: DEFAULT_REFILL_INTERVAL_SECS,
			default_max_tokens: DEFAULT_MAX_TOKENS,
		}
	}
}

impl Config {
	/// Loads configuration from the process environment, falling back to
	/// spec defaults for anything unset. Fails only on a value that is
	/// present but malformed — absence is never an error.
	pub fn from_env() -> anyhow::Result<Config> {
		let mut cfg = Config::default();

		if let Some(v) = parse_env::<bool>("RATE_LIMITER_CONFIGURABLE_VIA_HEADER")? {
			cfg.rate_limiter_configurable_via_header = v;
		}
		if let Ok(table) = std::env::var("DYNAMODB_TABLE") {
			cfg.dynamodb_table = table;
		}
		if let Ok(pool) = std::env::var("USER_POOL_ID") {
			cfg.user_pool_id = pool;
		}
		if let Ok(key) = std::env::var("DEFAULT_RATE_LIMITER") {
			cfg.default_limiter = LimiterKey::from_header_value(&key)
				.ok_or_else(|| anyhow::anyhow!("unknown DEFAULT_RATE_LIMITER value: {key}"))?;
		}
		if let Ok(raw) = std::env::var("HYBRID_V2_STALENESS") {
			cfg.hybrid_v2_staleness =
				duration_str::parse(&raw).map_err(|e| anyhow::anyhow!("invalid HYBRID_V2_STALENESS: {e}"))?;
		}
		if let Ok(path) = std::env::var("SCOPES_CONFIG_PATH") {
			cfg.scopes = load_scopes(&path)?;
		}

		Ok(cfg)
	}
}

fn load_scopes(path: &str) -> anyhow::Result<HashMap<String, ScopeConfig>> {
	let raw = std::fs::read_to_string(path)?;
	let scopes: HashMap<String, ScopeConfig> = serde_yaml::from_str(&raw)?;
	Ok(scopes)
}

/// `env::var(key).parse::<T>()`, folding "unset" into `Ok(None)` instead of
/// an error — only a present-but-malformed value is a startup failure.
fn parse_env<T: FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
	T::Err: std::error::Error + Send + Sync + 'static,
{
	match std::env::var(key) {
		Ok(raw) => Ok(Some(
			raw.parse::<T>()
				.map_err(|e| anyhow::anyhow!("invalid {key}: {e}"))?,
		)),
		Err(VarError::NotPresent) => Ok(None),
		Err(e) => Err(e.into()),
	}
}
