//! Hybrid partially-atomic limiter, V2 (spec §4.4): low latency with
//! bounded over-issuance, self-healing on conflict via a background
//! conditional write.
//!
//! Design-note decisions (spec §9, recorded in DESIGN.md):
//! - staleness window is 1s, not 15s — lower over-issuance, same code path
//!   either way, and it keeps the end-to-end scenarios in spec §8
//!   deterministic without a config knob most deployments would never touch.
//! - the foreground `Decision::collision` is always `false`: collisions are
//!   resolved purely in the background sync and never revise a decision
//!   already returned to the caller.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::prelude::*;
use super::{LimiterError, RateLimiter};
use crate::clock::Clock;
use crate::model::{refill, sanitize, CachedBucket, Decision, SanitizedBucket, DEFAULT_MAX_TOKENS};
use crate::store::{CounterStore, StoreError, UpdateCondition};

pub const DEFAULT_STALENESS: Duration = Duration::from_millis(1_000);
const DEFAULT_BACKGROUND_RETRIES: u32 = 1;

pub struct HybridLimiter {
	store: Arc<dyn CounterStore>,
	clock: Arc<dyn Clock>,
	cache: Arc<DashMap<String, CachedBucket>>,
	staleness: Duration,
	background_retries: u32,
}

impl HybridLimiter {
	pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
		Self::with_staleness(store, clock, DEFAULT_STALENESS)
	}

	pub fn with_staleness(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, staleness: Duration) -> Self {
		Self {
			store,
			clock,
			cache: Arc::new(DashMap::new()),
			staleness,
			background_retries: DEFAULT_BACKGROUND_RETRIES,
		}
	}

	async fn refreshed_bucket(&self, client_id: &str, now: u64) -> Result<CachedBucket, LimiterError> {
		if let Some(entry) = self.cache.get(client_id) {
			if now.saturating_sub(entry.last_access) <= self.staleness.as_millis() as u64 {
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

	fn spawn_sync(&self, client_id: &str, snapshot: SanitizedBucket, now: u64, consumed: bool) {
		let store = self.store.clone();
		let cache = self.cache.clone();
		let client_id = client_id.to_string();
		let max_retries = self.background_retries;
		tokio::spawn(async move {
			sync_to_store(store, cache, client_id, snapshot, now, consumed, max_retries).await;
		});
	}
}

/// Recompute against `snapshot` and attempt the conditional write, refreshing
/// the cache and retrying once (by default) on a lost race (spec §4.4
/// "background sync").
async fn sync_to_store(
	store: Arc<dyn CounterStore>,
	cache: Arc<DashMap<String, CachedBucket>>,
	client_id: String,
	mut snapshot: SanitizedBucket,
	now: u64,
	consumed: bool,
	mut retries_left: u32,
) {
	loop {
		let refilled = refill(&snapshot, now);
		let value = if consumed {
			(refilled.capped_tokens - 1.0).max(0.0)
		} else {
			refilled.capped_tokens
		};
		let payload = snapshot.to_raw(now, value);

		match store
			.update(&client_id, payload, UpdateCondition::AbsentOr(snapshot.last_refill))
			.await
		{
			Ok(()) => return,
			Err(StoreError::ConditionFailed) => match store.get(&client_id).await {
				Ok(raw) => {
					let refreshed = sanitize(&raw.unwrap_or_default(), now);
					cache.insert(
						client_id.clone(),
						CachedBucket {
							bucket: refreshed,
							last_access: now,
						},
					);
					if retries_left == 0 {
						warn!(client_id = %client_id, "hybrid limiter background sync gave up after collision retries");
						return;
					}
					retries_left -= 1;
					snapshot = refreshed;
				},
				Err(e) => {
					warn!(client_id = %client_id, error = %e, "hybrid limiter refresh-after-collision failed");
					return;
				},
			},
			Err(other) => {
				warn!(client_id = %client_id, error = %other, "hybrid limiter background sync failed");
				return;
			},
		}
	}
}

#[async_trait]
impl RateLimiter for HybridLimiter {
	async fn apply_rate_limit(&self, client_id: &str) -> Result<Decision, LimiterError> {
		let now = self.clock.now_millis();
		let cached = match self.refreshed_bucket(client_id, now).await {
			Ok(cached) => cached,
			Err(e) => {
				// Spec §5/§7: a hybrid limiter never propagates a counter
				// store failure to the orchestrator — it fails closed.
				warn!(client_id = %client_id, error = %e, "hybrid limiter counter store get failed; denying");
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
			if refilled.capped_tokens > cached.bucket.tokens {
				self.spawn_sync(client_id, cached.bucket, now, false);
			}
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

		self.spawn_sync(client_id, cached.bucket, now, true);

		Ok(refilled.decision(cached.bucket.max_tokens, false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::FixedClock;
	use crate::model::RawBucketItem;
	use crate::store::memory::InMemoryCounterStore;

	#[tokio::test]
	async fn full_burst_for_new_client() {
		let store = Arc::new(InMemoryCounterStore::new());
		let clock = Arc::new(FixedClock::new(1_000));
		let limiter = HybridLimiter::new(store.clone(), clock.clone());

		let d = limiter.apply_rate_limit("client-a").await.unwrap();
		assert!(d.allowed);
		assert_eq!(d.remaining, 499);
		assert_eq!(d.limit, 500);
		assert_eq!(d.reset, 1);
		assert!(!d.collision);

		// let the background sync land
		tokio::task::yield_now().await;
		tokio::time::sleep(Duration::from_millis(10)).await;
		let persisted = store.get("client-a").await.unwrap().unwrap();
		assert_eq!(persisted.tokens, Some(499));
		assert_eq!(persisted.last_refill, Some(1_000));
		assert_eq!(persisted.max_tokens, Some(500));
		assert_eq!(persisted.refill_rate, Some(300));
	}

	#[tokio::test]
	async fn depleted_with_no_refill_does_not_write() {
		let store = Arc::new(InMemoryCounterStore::new());
		store.seed(
			"client-a",
			RawBucketItem {
				tokens: Some(0),
				last_refill: Some(1_000),
				refill_rate: Some(300),
				refill_interval: Some(60),
				max_tokens: Some(500),
			},
		);
		let clock = Arc::new(FixedClock::new(1_000));
		let limiter = HybridLimiter::new(store.clone(), clock);

		let d = limiter.apply_rate_limit("client-a").await.unwrap();
		assert!(!d.allowed);
		assert_eq!(d.remaining, 0);
		assert_eq!(d.reset, 100);

		tokio::time::sleep(Duration::from_millis(10)).await;
		assert_eq!(store.get("client-a").await.unwrap().unwrap().tokens, Some(0));
	}

	#[tokio::test]
	async fn cache_reuse_within_staleness_skips_get() {
		let store = Arc::new(InMemoryCounterStore::new());
		let clock = Arc::new(FixedClock::new(1_000));
		let limiter = HybridLimiter::new(store, clock.clone());

		let first = limiter.apply_rate_limit("client-a").await.unwrap();
		clock.advance(50);
		let second = limiter.apply_rate_limit("client-a").await.unwrap();
		assert_eq!(first.remaining - 1, second.remaining);
	}

	#[tokio::test]
	async fn configurable_header_selects_fully_atomic_limiter() {
		// Scenario 5 in spec §8 is exercised at the selector/orchestrator
		// level; this just documents that the hybrid limiter itself has no
		// notion of the header.
		let store = Arc::new(InMemoryCounterStore::new());
		let clock = Arc::new(FixedClock::new(1_000));
		let limiter = HybridLimiter::with_staleness(store, clock, Duration::from_millis(15_000));
		let d = limiter.apply_rate_limit("client-a").await.unwrap();
		assert!(d.allowed);
	}
}
