//! Fully-atomic limiter (spec §4.2): strict global correctness, one `get`
//! then one conditional `update`, both awaited, before returning.

use std::sync::Arc;

use async_trait::async_trait;

use super::{LimiterError, RateLimiter};
use crate::clock::Clock;
use crate::model::{compute_reset, refill, sanitize, Decision, RawBucketItem};
use crate::store::{CounterStore, StoreError, UpdateCondition};

pub struct FullyAtomicLimiter {
	store: Arc<dyn CounterStore>,
	clock: Arc<dyn Clock>,
}

impl FullyAtomicLimiter {
	pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
		Self { store, clock }
	}
}

#[async_trait]
impl RateLimiter for FullyAtomicLimiter {
	async fn apply_rate_limit(&self, client_id: &str) -> Result<Decision, LimiterError> {
		let now = self.clock.now_millis();
		let raw = self.store.get(client_id).await?.unwrap_or_default();
		let bucket = sanitize(&raw, now);
		let refilled = refill(&bucket, now);

		if !refilled.allowed {
			return Ok(refilled.decision(bucket.max_tokens, false));
		}

		let payload = bucket.to_raw(now, refilled.new_tokens);
		match self
			.store
			.update(client_id, payload, UpdateCondition::AbsentOr(bucket.last_refill))
			.await
		{
			Ok(()) => Ok(refilled.decision(bucket.max_tokens, false)),
			Err(StoreError::ConditionFailed) => {
				let reset = compute_reset(
					refilled.tokens_floored,
					bucket.max_tokens,
					bucket.refill_interval,
					bucket.refill_rate,
				);
				Ok(Decision {
					allowed: false,
					limit: bucket.max_tokens,
					remaining: refilled.tokens_floored,
					reset,
					collision: true,
				})
			},
			Err(other) => Err(other.into()),
		}
	}
}
