//! The remote counter store abstraction (spec §2.2, §6): a conditional
//! key-value store keyed by client id, exposing `get` and a conditional
//! `update`.

#[cfg(feature = "dynamo")]
pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::RawBucketItem;

/// The predecessor `lastRefill` an `update` is conditioned on. Mirrors the
/// expression `lastRefill is absent OR lastRefill = :expected` from spec §6.
#[derive(Debug, Clone, Copy)]
pub enum UpdateCondition {
	/// `attribute_not_exists(lastRefill) OR lastRefill = :expected`
	AbsentOr(u64),
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("counter store condition failed")]
	ConditionFailed,
	#[error("counter store request timed out")]
	Timeout,
	#[error("counter store transport error: {0}")]
	Transport(#[source] anyhow::Error),
}

/// Contract every remote counter store binding must satisfy. Modeled
/// abstractly per spec §2.2; `DynamoCounterStore` and `InMemoryCounterStore`
/// are the two bindings this crate ships.
#[async_trait]
pub trait CounterStore: Send + Sync {
	/// Returns `Ok(None)` when the client has never been seen — absence is
	/// not an error (spec §7).
	async fn get(&self, client_id: &str) -> Result<Option<RawBucketItem>, StoreError>;

	/// Writes `item`, guarded by `condition`. Returns `Err(ConditionFailed)`
	/// as a business outcome, not a transport failure.
	async fn update(
		&self,
		client_id: &str,
		item: RawBucketItem,
		condition: UpdateCondition,
	) -> Result<(), StoreError>;
}
