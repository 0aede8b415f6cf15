//! The three interchangeable rate limiter consistency profiles (spec §4.2,
//! §4.3, §4.4) behind one `RateLimiter` capability, plus the selector that
//! picks among them (spec §4.5 step 1, §9: "model the three as variants of
//! a single capability interface").

pub mod atomic;
pub mod hybrid;
pub mod optimistic;
pub mod selector;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Decision;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LimiterError {
	#[error("counter store error: {0}")]
	Store(#[from] StoreError),
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
	async fn apply_rate_limit(&self, client_id: &str) -> Result<Decision, LimiterError>;
}

/// The three limiter keys a request may select, matching spec §6's
/// `DYNAMODB_TABLE`-adjacent config constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimiterKey {
	#[serde(rename = "reduced-atomicity-hybrid-v1")]
	ReducedAtomicityHybridV1,
	#[serde(rename = "reduced-atomicity-hybrid-v2")]
	ReducedAtomicityHybridV2,
	#[serde(rename = "fully-atomic-dynamo")]
	FullyAtomicDynamo,
}

impl LimiterKey {
	pub fn as_header_value(&self) -> &'static str {
		match self {
			LimiterKey::ReducedAtomicityHybridV1 => "reduced-atomicity-hybrid-v1",
			LimiterKey::ReducedAtomicityHybridV2 => "reduced-atomicity-hybrid-v2",
			LimiterKey::FullyAtomicDynamo => "fully-atomic-dynamo",
		}
	}

	pub fn from_header_value(v: &str) -> Option<Self> {
		match v {
			"reduced-atomicity-hybrid-v1" => Some(LimiterKey::ReducedAtomicityHybridV1),
			"reduced-atomicity-hybrid-v2" => Some(LimiterKey::ReducedAtomicityHybridV2),
			"fully-atomic-dynamo" => Some(LimiterKey::FullyAtomicDynamo),
			_ => None,
		}
	}
}
