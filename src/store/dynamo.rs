//! Reference `CounterStore` binding over DynamoDB (spec §2.2's "the
//! reference binding is a document store keyed by client id", §6's schema
//! and conditional update expression).
//!
//! Only compiled with the `dynamo` feature so the rest of the crate (and
//! every test) can build without an AWS SDK in the dependency graph.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::warn;

use super::{CounterStore, StoreError, UpdateCondition};
use crate::model::RawBucketItem;

const ATTR_CLIENT_ID: &str = "clientId";
const ATTR_TOKENS: &str = "tokens";
const ATTR_LAST_REFILL: &str = "lastRefill";
const ATTR_REFILL_RATE: &str = "refillRate";
const ATTR_REFILL_INTERVAL: &str = "refillInterval";
const ATTR_MAX_TOKENS: &str = "maxTokens";

pub struct DynamoCounterStore {
	client: Client,
	table: String,
	call_timeout: Duration,
}

impl DynamoCounterStore {
	pub fn new(client: Client, table: impl Into<String>, call_timeout: Duration) -> Self {
		Self {
			client,
			table: table.into(),
			call_timeout,
		}
	}

	/// Builds the client from the ambient AWS environment (env vars, shared
	/// config/credentials files, instance/task role) rather than requiring
	/// the caller to assemble one, matching how a Lambda@Edge deployment
	/// would pick up credentials.
	pub async fn from_env(table: impl Into<String>, call_timeout: Duration) -> Self {
		let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
		Self::new(Client::new(&config), table, call_timeout)
	}

	async fn with_timeout<F, T>(&self, fut: F) -> Result<T, StoreError>
	where
		F: std::future::Future<Output = Result<T, StoreError>>,
	{
		tokio::time::timeout(self.call_timeout, fut)
			.await
			.map_err(|_| StoreError::Timeout)?
	}
}

#[async_trait]
impl CounterStore for DynamoCounterStore {
	async fn get(&self, client_id: &str) -> Result<Option<RawBucketItem>, StoreError> {
		self
			.with_timeout(async {
				let resp = self
					.client
					.get_item()
					.table_name(&self.table)
					.key(ATTR_CLIENT_ID, AttributeValue::S(client_id.to_string()))
					.send()
					.await
					.map_err(|e| StoreError::Transport(e.into()))?;

				Ok(resp.item.map(|item| RawBucketItem {
					tokens: attr_i64(&item, ATTR_TOKENS),
					last_refill: attr_u64(&item, ATTR_LAST_REFILL),
					refill_rate: attr_u64(&item, ATTR_REFILL_RATE),
					refill_interval: attr_u64(&item, ATTR_REFILL_INTERVAL),
					max_tokens: attr_u64(&item, ATTR_MAX_TOKENS),
				}))
			})
			.await
	}

	async fn update(
		&self,
		client_id: &str,
		item: RawBucketItem,
		condition: UpdateCondition,
	) -> Result<(), StoreError> {
		let UpdateCondition::AbsentOr(expected) = condition;

		self
			.with_timeout(async {
				let result = self
					.client
					.update_item()
					.table_name(&self.table)
					.key(ATTR_CLIENT_ID, AttributeValue::S(client_id.to_string()))
					.update_expression(
						"SET tokens = :tokens, lastRefill = :lastRefill, refillRate = :refillRate, \
						 refillInterval = :refillInterval, maxTokens = :maxTokens",
					)
					.condition_expression("attribute_not_exists(lastRefill) OR lastRefill = :expected")
					.expression_attribute_values(":tokens", num_i64(item.tokens.unwrap_or_default()))
					.expression_attribute_values(":lastRefill", num(item.last_refill.unwrap_or_default()))
					.expression_attribute_values(":refillRate", num(item.refill_rate.unwrap_or_default()))
					.expression_attribute_values(
						":refillInterval",
						num(item.refill_interval.unwrap_or_default()),
					)
					.expression_attribute_values(":maxTokens", num(item.max_tokens.unwrap_or_default()))
					.expression_attribute_values(":expected", num(expected))
					.send()
					.await;

				match result {
					Ok(_) => Ok(()),
					Err(aws_sdk_dynamodb::error::SdkError::ServiceError(e))
						if e.err().is_conditional_check_failed_exception() =>
					{
						Err(StoreError::ConditionFailed)
					},
					Err(e) => {
						warn!(error = %e, "dynamodb update_item failed");
						Err(StoreError::Transport(e.into()))
					},
				}
			})
			.await
	}
}

fn num(v: u64) -> AttributeValue {
	AttributeValue::N(v.to_string())
}

fn num_i64(v: i64) -> AttributeValue {
	AttributeValue::N(v.to_string())
}

fn attr_u64(item: &std::collections::HashMap<String, AttributeValue>, key: &str) -> Option<u64> {
	item
		.get(key)
		.and_then(|v| v.as_n().ok())
		.and_then(|s| s.parse().ok())
}

/// Like `attr_u64`, but for `tokens`: a stored value may be negative (spec
/// §7's "negative stored tokens clamp to 0"), which `u64::from_str` would
/// silently fail to parse and turn into "absent".
fn attr_i64(item: &std::collections::HashMap<String, AttributeValue>, key: &str) -> Option<i64> {
	item
		.get(key)
		.and_then(|v| v.as_n().ok())
		.and_then(|s| s.parse().ok())
}
