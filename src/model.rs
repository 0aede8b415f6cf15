//! Bucket data model and the state math shared by all three limiter variants
//! (spec §3 and §4.1).

use serde::{Deserialize, Serialize};

/// Hard limits and defaults a sanitized bucket can never exceed or fall
/// below. These are process-wide constants, not per-client configuration.
pub const DEFAULT_REFILL_RATE: u64 = 300;
pub const DEFAULT_REFILL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_TOKENS: u64 = 500;
pub const HARD_MAX_TOKENS: u64 = 2500;
pub const HARD_MAX_REFILL_RATE: u64 = 2500;

/// A bucket as read from (or written to) the counter store. Any field may
/// be absent for a client seen for the first time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBucketItem {
	/// Signed because a store may hand back a negative value (e.g. a
	/// concurrent decrement that raced past zero); `sanitize` clamps it to 0
	/// rather than treating it as absent.
	pub tokens: Option<i64>,
	pub last_refill: Option<u64>,
	pub refill_rate: Option<u64>,
	pub refill_interval: Option<u64>,
	pub max_tokens: Option<u64>,
}

/// The result of applying defaults, minima and hard caps to a `RawBucketItem`.
/// Sanitization is total and never fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanitizedBucket {
	pub tokens: f64,
	pub last_refill: u64,
	pub refill_rate: u64,
	pub refill_interval: u64,
	pub max_tokens: u64,
}

/// `now` is used only when `tokens`/`last_refill` are absent: a brand-new
/// client gets a full bucket with no elapsed time, not a stale one.
pub fn sanitize(raw: &RawBucketItem, now: u64) -> SanitizedBucket {
	let max_tokens = raw
		.max_tokens
		.filter(|&v| v > 0)
		.map(|v| v.clamp(1, HARD_MAX_TOKENS))
		.unwrap_or(DEFAULT_MAX_TOKENS);

	let refill_rate = raw
		.refill_rate
		.map(|v| v.clamp(1, HARD_MAX_REFILL_RATE))
		.unwrap_or(DEFAULT_REFILL_RATE);

	let refill_interval = raw
		.refill_interval
		.filter(|&v| v > 0)
		.unwrap_or(DEFAULT_REFILL_INTERVAL_SECS);

	let tokens = match raw.tokens {
		Some(t) => (t as f64).clamp(0.0, max_tokens as f64),
		None => max_tokens as f64,
	};

	let last_refill = raw.last_refill.unwrap_or(now);

	SanitizedBucket {
		tokens,
		last_refill,
		refill_rate,
		refill_interval,
		max_tokens,
	}
}

impl SanitizedBucket {
	/// Floor `tokens` to the integer representation that gets persisted.
	pub fn floored_tokens(&self) -> u64 {
		self.tokens.floor() as u64
	}

	pub fn to_raw(&self, last_refill: u64, tokens: f64) -> RawBucketItem {
		RawBucketItem {
			tokens: Some(tokens.floor() as i64),
			last_refill: Some(last_refill),
			refill_rate: Some(self.refill_rate),
			refill_interval: Some(self.refill_interval),
			max_tokens: Some(self.max_tokens),
		}
	}
}

/// A sanitized bucket held in a process-local memory cache, plus the time
/// it was last touched (spec §3 "Cached bucket").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedBucket {
	pub bucket: SanitizedBucket,
	pub last_access: u64,
}

/// Outcome of a single rate-limit check (spec §3 `Decision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
	pub allowed: bool,
	pub limit: u64,
	pub remaining: u64,
	pub reset: u64,
	pub collision: bool,
}

/// The refill + consume math of spec §4.1, applied to a sanitized bucket at
/// time `now`. This is pure and has no knowledge of where the bucket came
/// from or where the result will be written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refilled {
	/// Capped token count after refill, before consumption.
	pub capped_tokens: f64,
	/// `floor(capped_tokens)`, i.e. the pre-consumption integer count.
	pub tokens_floored: u64,
	pub allowed: bool,
	/// Token count after consumption (equal to `capped_tokens` on deny).
	pub new_tokens: f64,
	pub remaining: u64,
	pub reset: u64,
}

pub fn refill(bucket: &SanitizedBucket, now: u64) -> Refilled {
	let time_delta = now.saturating_sub(bucket.last_refill) as f64;
	let refill_amount =
		bucket.refill_rate as f64 * time_delta / (bucket.refill_interval as f64 * 1000.0);
	let potential_tokens = bucket.tokens + refill_amount;
	let capped_tokens = potential_tokens.min(bucket.max_tokens as f64);
	let tokens_floored = capped_tokens.floor() as u64;
	let allowed = tokens_floored >= 1;

	let (new_tokens, remaining) = if allowed {
		let new_tokens = capped_tokens - 1.0;
		(new_tokens, new_tokens.floor() as u64)
	} else {
		(capped_tokens, tokens_floored)
	};

	let reset = compute_reset(remaining, bucket.max_tokens, bucket.refill_interval, bucket.refill_rate);

	Refilled {
		capped_tokens,
		tokens_floored,
		allowed,
		new_tokens,
		remaining,
		reset,
	}
}

pub fn compute_reset(remaining: u64, max_tokens: u64, refill_interval: u64, refill_rate: u64) -> u64 {
	if remaining >= max_tokens {
		0
	} else {
		let missing = (max_tokens - remaining) as f64;
		(missing * refill_interval as f64 / refill_rate as f64).ceil() as u64
	}
}

impl Refilled {
	pub fn decision(&self, max_tokens: u64, collision: bool) -> Decision {
		Decision {
			allowed: self.allowed,
			limit: max_tokens,
			remaining: self.remaining,
			reset: self.reset,
			collision,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sanitize_absent_item_is_full_bucket() {
		let b = sanitize(&RawBucketItem::default(), 1_000);
		assert_eq!(b.tokens, DEFAULT_MAX_TOKENS as f64);
		assert_eq!(b.last_refill, 1_000);
		assert_eq!(b.refill_rate, DEFAULT_REFILL_RATE);
		assert_eq!(b.refill_interval, DEFAULT_REFILL_INTERVAL_SECS);
		assert_eq!(b.max_tokens, DEFAULT_MAX_TOKENS);
	}

	#[test]
	fn sanitize_clamps_negative_tokens_to_zero() {
		let raw = RawBucketItem {
			tokens: Some(-50),
			last_refill: Some(0),
			max_tokens: Some(500),
			..Default::default()
		};
		let b = sanitize(&raw, 0);
		assert_eq!(b.tokens, 0.0);
	}

	#[test]
	fn sanitize_clamps_refill_rate_zero_to_one() {
		let raw = RawBucketItem {
			refill_rate: Some(0),
			..Default::default()
		};
		let b = sanitize(&raw, 0);
		assert_eq!(b.refill_rate, 1);
	}

	#[test]
	fn sanitize_clamps_hard_caps() {
		let raw = RawBucketItem {
			max_tokens: Some(9_999_999),
			refill_rate: Some(9_999_999),
			..Default::default()
		};
		let b = sanitize(&raw, 0);
		assert_eq!(b.max_tokens, HARD_MAX_TOKENS);
		assert_eq!(b.refill_rate, HARD_MAX_REFILL_RATE);
	}

	#[test]
	fn sanitize_is_idempotent_through_raw_round_trip() {
		let raw = RawBucketItem {
			tokens: Some(10),
			last_refill: Some(42),
			refill_rate: Some(0),
			refill_interval: Some(0),
			max_tokens: Some(9_999_999),
		};
		let once = sanitize(&raw, 0);
		let raw2 = once.to_raw(once.last_refill, once.tokens);
		let twice = sanitize(&raw2, 0);
		assert_eq!(once, twice);
	}

	#[test]
	fn one_token_allows_then_denies() {
		let bucket = SanitizedBucket {
			tokens: 1.0,
			last_refill: 1_000,
			refill_rate: 300,
			refill_interval: 60,
			max_tokens: 500,
		};
		let first = refill(&bucket, 1_000);
		assert!(first.allowed);
		assert_eq!(first.remaining, 0);

		let depleted = SanitizedBucket {
			tokens: first.new_tokens,
			last_refill: 1_000,
			..bucket
		};
		let second = refill(&depleted, 1_000);
		assert!(!second.allowed);
		assert_eq!(second.remaining, 0);
	}

	#[test]
	fn large_time_delta_caps_at_max_tokens() {
		let bucket = SanitizedBucket {
			tokens: 0.0,
			last_refill: 0,
			refill_rate: 300,
			refill_interval: 60,
			max_tokens: 500,
		};
		let r = refill(&bucket, 1_000_000_000);
		assert_eq!(r.capped_tokens, 500.0);
	}

	#[test]
	fn reset_is_zero_iff_remaining_at_least_max() {
		assert_eq!(compute_reset(500, 500, 60, 300), 0);
		assert!(compute_reset(499, 500, 60, 300) > 0);
	}

	#[test]
	fn full_burst_for_new_client() {
		let bucket = sanitize(&RawBucketItem::default(), 1_000);
		let r = refill(&bucket, 1_000);
		assert!(r.allowed);
		assert_eq!(r.remaining, 499);
		assert_eq!(r.reset, 1);
	}

	#[test]
	fn depleted_with_no_refill() {
		let raw = RawBucketItem {
			tokens: Some(0),
			last_refill: Some(1_000),
			refill_rate: Some(300),
			refill_interval: Some(60),
			max_tokens: Some(500),
		};
		let bucket = sanitize(&raw, 1_000);
		let r = refill(&bucket, 1_000);
		assert!(!r.allowed);
		assert_eq!(r.remaining, 0);
		assert_eq!(r.reset, 100);
	}

	#[test]
	fn partial_refill() {
		let raw = RawBucketItem {
			tokens: Some(0),
			last_refill: Some(0),
			refill_rate: Some(750),
			refill_interval: Some(60),
			max_tokens: Some(750),
		};
		let bucket = sanitize(&raw, 0);
		let r = refill(&bucket, 30_000);
		assert!(r.allowed);
		assert_eq!(r.remaining, 374);
		assert_eq!(r.reset, 31);
	}
}
