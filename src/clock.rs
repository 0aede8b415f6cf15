//! Monotonic-ish wall clock, injectable for tests.
//!
//! The limiters only ever need "milliseconds since some epoch" and never
//! compare across processes, so `SystemTime` is precise enough; tests swap
//! in a `FixedClock` to drive refill math deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current time, in milliseconds.
pub trait Clock: Send + Sync {
	fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now_millis(&self) -> u64 {
		SystemTime::now()
			.duration_since(UNIX_EPOCH)
			.expect("system clock before unix epoch")
			.as_millis() as u64
	}
}

/// A clock with a value the test sets and advances explicitly.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
	pub fn new(now_millis: u64) -> Self {
		Self(AtomicU64::new(now_millis))
	}

	pub fn set(&self, now_millis: u64) {
		self.0.store(now_millis, Ordering::SeqCst);
	}

	pub fn advance(&self, millis: u64) {
		self.0.fetch_add(millis, Ordering::SeqCst);
	}
}

impl Clock for FixedClock {
	fn now_millis(&self) -> u64 {
		self.0.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fixed_clock_advances() {
		let clock = FixedClock::new(1_000);
		assert_eq!(clock.now_millis(), 1_000);
		clock.advance(500);
		assert_eq!(clock.now_millis(), 1_500);
		clock.set(0);
		assert_eq!(clock.now_millis(), 0);
	}
}
