//! An in-memory `CounterStore`, used by tests and the worked examples. It
//! implements the same optimistic-concurrency contract as the DynamoDB
//! binding: `update` is conditioned on the previously observed `lastRefill`.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CounterStore, StoreError, UpdateCondition};
use crate::model::RawBucketItem;

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
	items: DashMap<String, RawBucketItem>,
}

impl InMemoryCounterStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Test helper: seed a client's bucket directly, bypassing the
	/// conditional-write path.
	pub fn seed(&self, client_id: impl Into<String>, item: RawBucketItem) {
		self.items.insert(client_id.into(), item);
	}
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
	async fn get(&self, client_id: &str) -> Result<Option<RawBucketItem>, StoreError> {
		Ok(self.items.get(client_id).map(|e| *e.value()))
	}

	async fn update(
		&self,
		client_id: &str,
		item: RawBucketItem,
		condition: UpdateCondition,
	) -> Result<(), StoreError> {
		let UpdateCondition::AbsentOr(expected) = condition;
		match self.items.entry(client_id.to_string()) {
			dashmap::mapref::entry::Entry::Vacant(e) => {
				e.insert(item);
				Ok(())
			},
			dashmap::mapref::entry::Entry::Occupied(mut e) => {
				let observed = e.get().last_refill;
				if observed == Some(expected) {
					e.insert(item);
					Ok(())
				} else {
					Err(StoreError::ConditionFailed)
				}
			},
		}
	}
}
