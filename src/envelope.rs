//! The CDN viewer-request/response envelope (spec §6). Treated as an
//! input/output adapter only — the orchestrator never inspects anything
//! beyond `uri` and `headers`, and always returns one of these shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One `{key, value}` pair, the unit the CDN envelope uses for every header
/// instead of a plain string — a request can carry more than one instance
/// of the same header name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderPair {
	pub key: String,
	pub value: String,
}

/// Headers keyed by lower-cased name, each mapping to its `{key, value}`
/// pairs (spec §6).
pub type HeaderMap = HashMap<String, Vec<HeaderPair>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfRequest {
	pub uri: String,
	#[serde(default)]
	pub headers: HeaderMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cf {
	pub request: CfRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfRecord {
	pub cf: Cf,
}

/// The top-level inbound event (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewerRequestEvent {
	pub records: Vec<CfRecord>,
}

impl ViewerRequestEvent {
	pub fn request(&self) -> Option<&CfRequest> {
		self.records.first().map(|r| &r.cf.request)
	}
}

/// A short-circuit CDN response: 401, 403 or 429 with the canonical JSON
/// body (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct CfResponse {
	pub status: String,
	#[serde(rename = "statusDescription")]
	pub status_description: String,
	pub body: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub headers: Option<HeaderMap>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
	pub status: String,
	pub title: String,
	pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
	pub errors: Vec<ErrorDetail>,
}

impl CfResponse {
	pub fn unauthorized() -> Self {
		Self::error_response(
			"401",
			"Unauthorized",
			"Authentication credentials were missing, incorrect or expired. Please re-authenticate and try again.",
			None,
		)
	}

	pub fn forbidden() -> Self {
		Self::error_response(
			"403",
			"Forbidden",
			"You do not have permission to access this resource.",
			None,
		)
	}

	pub fn too_many_requests(headers: HeaderMap) -> Self {
		Self::error_response(
			"429",
			"Too Many Requests",
			"You have exceeded your rate limit. Please try your request again later.",
			Some(headers),
		)
	}

	fn error_response(status: &str, title: &str, detail: &str, headers: Option<HeaderMap>) -> Self {
		let body = ErrorBody {
			errors: vec![ErrorDetail {
				status: status.to_string(),
				title: title.to_string(),
				detail: detail.to_string(),
			}],
		};
		Self {
			status: status.to_string(),
			status_description: title.to_string(),
			body: serde_json::to_string(&body).expect("ErrorBody always serializes"),
			headers,
		}
	}
}

/// Looks up a single header's first value, matching on a lower-cased name
/// as the CDN envelope requires.
pub fn get_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(&name.to_ascii_lowercase())
		.and_then(|pairs| pairs.first())
		.map(|p| p.value.as_str())
}

/// Sets (overwriting) a single-valued header, the way the orchestrator
/// stamps rate-limit and client-id headers onto the forwarded request.
pub fn set_header(headers: &mut HeaderMap, name: &str, value: impl Into<String>) {
	let name = name.to_ascii_lowercase();
	headers.insert(
		name.clone(),
		vec![HeaderPair {
			key: name,
			value: value.into(),
		}],
	);
}
