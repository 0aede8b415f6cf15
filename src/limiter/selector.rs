//! Resolves which `RateLimiter` variant applies to a request (spec §4.5
//! step 1): the configured default, optionally overridden by an
//! `x-rate-limiter` header when the deployment allows it.

use std::collections::HashMap;
use std::sync::Arc;

use super::{LimiterKey, RateLimiter};

pub const HEADER_NAME: &str = "x-rate-limiter";

pub struct LimiterSelector {
	default_key: LimiterKey,
	configurable_via_header: bool,
	limiters: HashMap<LimiterKey, Arc<dyn RateLimiter>>,
}

impl LimiterSelector {
	pub fn new(
		default_key: LimiterKey,
		configurable_via_header: bool,
		limiters: HashMap<LimiterKey, Arc<dyn RateLimiter>>,
	) -> Self {
		Self {
			default_key,
			configurable_via_header,
			limiters,
		}
	}

	/// Picks a limiter for the request. Any unknown or malformed header
	/// value falls back silently to the configured default — never an error.
	pub fn resolve(&self, header_value: Option<&str>) -> Arc<dyn RateLimiter> {
		let key = if self.configurable_via_header {
			header_value
				.and_then(LimiterKey::from_header_value)
				.unwrap_or(self.default_key)
		} else {
			self.default_key
		};

		self.limiters
			.get(&key)
			.or_else(|| self.limiters.get(&self.default_key))
			.expect("selector must be constructed with at least the default limiter registered")
			.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use crate::limiter::optimistic::OptimisticLimiter;
	use crate::store::memory::InMemoryCounterStore;

	fn selector(configurable: bool) -> LimiterSelector {
		let store = Arc::new(InMemoryCounterStore::new());
		let clock = Arc::new(FixedClock::new(0));
		let mut limiters: HashMap<LimiterKey, Arc<dyn RateLimiter>> = HashMap::new();
		limiters.insert(
			LimiterKey::ReducedAtomicityHybridV1,
			Arc::new(OptimisticLimiter::new(store.clone(), clock.clone())),
		);
		LimiterSelector::new(LimiterKey::ReducedAtomicityHybridV1, configurable, limiters)
	}

	#[test]
	fn falls_back_to_default_when_not_configurable() {
		let s = selector(false);
		// the only registered key is the default, so any header is ignored
		let _ = s.resolve(Some("fully-atomic-dynamo"));
	}

	#[test]
	fn unknown_header_value_falls_back_silently() {
		let s = selector(true);
		let _ = s.resolve(Some("not-a-real-limiter"));
	}

	#[test]
	fn missing_header_uses_default() {
		let s = selector(true);
		let _ = s.resolve(None);
	}
}
