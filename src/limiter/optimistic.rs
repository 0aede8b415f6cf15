//! Optimistic fire-and-forget limiter, V1 (spec §4.3): minimum added
//! latency, correctness is best-effort per process. Concurrent writers from
//! different processes clobber each other — deliberate, per spec.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::prelude::*;
use super::{LimiterError, RateLimiter};
use crate::clock::Clock;
use crate::model::{refill, sanitize, CachedBucket, Decision, DEFAULT_MAX_TOKENS};
use crate::store::{CounterStore, UpdateCondition};

const STALENESS_MILLIS: u64 = 1_000;

pub struct OptimisticLimiter {
	store: Arc<dyn CounterStore>,
	clock: Arc<dyn Clock>,
	cache: DashMap<String, CachedBucket>,
}

impl OptimisticLimiter {
	pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
		Self {
			store,
			clock,
			cache: DashMap::new(),
		}
	}

	async fn refreshed_bucket(&self, client_id: &str, now: u64) -> Result<CachedBucket, LimiterError> {
		if let Some(entry) = self.cache.get(client_id) {
			if now.saturating_sub(entry.last_access) <= STALENESS_MILLIS {
				return Ok(*entry);
			}
		}
		let raw = self.store.get(client_id).await?.unwrap_or_default();
		let bucket = sanitize(&raw, now);
		let cached = CachedBucket {
			bucket,
			last_access: now,
		};
		self.cache.insert(client_id.to_string(), cached);
		Ok(cached)
	}
}

#[async_trait]
impl RateLimiter for OptimisticLimiter {
	async fn apply_rate_limit(&self, client_id: &str) -> Result<Decision, LimiterError> {
		let now = self.clock.now_millis();
		let cached = match self.refreshed_bucket(client_id, now).await {
			Ok(cached) => cached,
			Err(e) => {
				// Spec §5/§7: the optimistic limiter never propagates a
				// counter store failure to the orchestrator — it fails closed.
				warn!(client_id = %client_id, error = %e, "optimistic limiter counter store get failed; denying");
				return Ok(Decision {
					allowed: false,
					limit: DEFAULT_MAX_TOKENS,
					remaining: 0,
					reset: 0,
					collision: false,
				});
			},
		};
		let refilled = refill(&cached.bucket, now);

		if !refilled.allowed {
			// No write on deny; the cache still reflects the current (denied) state.
			return Ok(refilled.decision(cached.bucket.max_tokens, false));
		}

		let mut new_bucket = cached.bucket;
		new_bucket.tokens = refilled.new_tokens;
		new_bucket.last_refill = now;
		self.cache.insert(
			client_id.to_string(),
			CachedBucket {
				bucket: new_bucket,
				last_access: now,
			},
		);

		let store = self.store.clone();
		let client_id = client_id.to_string();
		let payload = new_bucket.to_raw(now, refilled.new_tokens);
		// Fire-and-forget: the caller never awaits this, and its failure is
		// never surfaced to the request.
		tokio::spawn(async move {
			if let Err(e) = store
				.update(&client_id, payload, UpdateCondition::AbsentOr(cached.bucket.last_refill))
				.await
			{
				warn!(client_id, error = %e, "optimistic limiter background write failed");
			}
		});

		Ok(refilled.decision(cached.bucket.max_tokens, false))
	}
}

#[allow(dead_code)]
fn staleness() -> Duration {
	Duration::from_millis(STALENESS_MILLIS)
}
