//! Exponential backoff with jitter for the fully-atomic limiter's external
//! retry wrapper (spec §4.2, §7: "retries are an internal concern of the
//! fully-atomic limiter's external wrapper ... when strict enforcement is
//! desired"). Not used by the hybrid/optimistic variants, which never
//! retry on the hot path.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::limiter::{LimiterError, RateLimiter};
use crate::model::Decision;

/// Full-jitter exponential backoff: `random(0, base * 2^attempt)`, capped.
pub fn backoff_jitter(attempt: u32, base: Duration, cap: Duration) -> Duration {
	let exp = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
	let upper = exp.min(cap);
	if upper.is_zero() {
		return upper;
	}
	let millis = rand::rng().random_range(0..=upper.as_millis().max(1) as u64);
	Duration::from_millis(millis)
}

/// Retries `attempt` while it reports a collision, up to `max_retries`
/// additional attempts, sleeping with jittered exponential backoff between
/// them. The final collision response (if retries are exhausted) is
/// returned as-is; the caller never sees an error purely from collisions.
pub async fn retry_on_collision<F, Fut>(
	max_retries: u32,
	base: Duration,
	cap: Duration,
	mut attempt: F,
) -> Result<Decision, LimiterError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Decision, LimiterError>>,
{
	let mut last = attempt().await?;
	let mut tries = 0;
	while last.collision && tries < max_retries {
		tokio::time::sleep(backoff_jitter(tries, base, cap)).await;
		last = attempt().await?;
		tries += 1;
	}
	Ok(last)
}

/// Wraps any `RateLimiter` with the retry-on-collision external wrapper
/// (spec §4.2, §7) for deployments that want stricter enforcement than a
/// bare collision-deny. Intended for `FullyAtomicLimiter`, whose
/// `collision: true` is the only case this wrapper can ever act on — the
/// hybrid/optimistic variants never report a collision on the hot path.
pub struct RetryingLimiter<L> {
	inner: L,
	max_retries: u32,
	base: Duration,
	cap: Duration,
}

impl<L: RateLimiter> RetryingLimiter<L> {
	pub fn new(inner: L, max_retries: u32, base: Duration, cap: Duration) -> Self {
		Self {
			inner,
			max_retries,
			base,
			cap,
		}
	}
}

#[async_trait]
impl<L: RateLimiter> RateLimiter for RetryingLimiter<L> {
	async fn apply_rate_limit(&self, client_id: &str) -> Result<Decision, LimiterError> {
		retry_on_collision(self.max_retries, self.base, self.cap, || {
			self.inner.apply_rate_limit(client_id)
		})
		.await
	}
}
