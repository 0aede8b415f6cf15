//! The request-scoped orchestrator (spec §4.5): composes token
//! verification, scope authorization and the selected rate limiter into a
//! single forward-or-short-circuit decision.

use crate::prelude::*;
use crate::authorization::ScopeAuthorizer;
use crate::envelope::{get_header, set_header, CfRequest, CfResponse, HeaderMap};
use crate::limiter::selector::{LimiterSelector, HEADER_NAME};
use crate::model::Decision;
use crate::verifier::TokenVerifier;

const CLIENT_ID_UNKNOWN: &str = "unknown";

pub enum Outcome {
	Forward(CfRequest),
	Respond(CfResponse),
}

pub struct RequestOrchestrator {
	selector: LimiterSelector,
	verifier: Arc<dyn TokenVerifier>,
	authorizer: ScopeAuthorizer,
}

impl RequestOrchestrator {
	pub fn new(selector: LimiterSelector, verifier: Arc<dyn TokenVerifier>, authorizer: ScopeAuthorizer) -> Self {
		Self {
			selector,
			verifier,
			authorizer,
		}
	}

	/// Runs the full spec §4.5 flow for one viewer-request and returns
	/// either the (possibly annotated) request to forward or a
	/// short-circuit response. Never returns an `Err`: every failure mode
	/// maps to a concrete HTTP outcome.
	pub async fn handle(&self, mut request: CfRequest) -> Outcome {
		let auth_header = get_header(&request.headers, "authorization").map(str::to_string);

		let Some(auth_header) = auth_header else {
			set_header(&mut request.headers, "x-client-id", CLIENT_ID_UNKNOWN);
			return Outcome::Forward(request);
		};

		let Some(token) = auth_header.strip_prefix("Bearer ") else {
			return Outcome::Respond(CfResponse::unauthorized());
		};

		let claims = match self.verifier.verify(token).await {
			Ok(claims) => claims,
			Err(e) => {
				warn!(error = %e, "token verification failed");
				return Outcome::Respond(CfResponse::unauthorized());
			},
		};

		if claims.client_id.is_empty() {
			warn!("verified token carried no client id claim");
			return Outcome::Respond(CfResponse::unauthorized());
		}

		if !self.authorizer.authorized(&claims.scopes, &request.uri) {
			return Outcome::Respond(CfResponse::forbidden());
		}

		let header_value = get_header(&request.headers, HEADER_NAME);
		let limiter = self.selector.resolve(header_value);

		let decision = match limiter.apply_rate_limit(&claims.client_id).await {
			Ok(decision) => decision,
			Err(e) => {
				// Store transport errors on the hot path are, by default,
				// folded into the same outcome as a verifier failure — this
				// preserves the original system's behavior (spec §9's last
				// open question) rather than introducing a new 503 path.
				warn!(error = %e, client_id = %claims.client_id, "rate limiter call failed");
				return Outcome::Respond(CfResponse::unauthorized());
			},
		};

		let rate_limit_headers = decision_headers(&decision);

		if !decision.allowed {
			info!(client_id = %claims.client_id, "request denied by rate limiter");
			return Outcome::Respond(CfResponse::too_many_requests(rate_limit_headers));
		}

		for (name, pairs) in rate_limit_headers {
			request.headers.insert(name, pairs);
		}
		set_header(&mut request.headers, "x-client-id", claims.client_id.clone());

		info!(client_id = %claims.client_id, remaining = decision.remaining, "request forwarded");
		Outcome::Forward(request)
	}
}

fn decision_headers(decision: &Decision) -> HeaderMap {
	let mut headers = HeaderMap::new();
	set_header(&mut headers, "x-ratelimit-limit", decision.limit.to_string());
	set_header(&mut headers, "x-ratelimit-remaining", decision.remaining.to_string());
	set_header(&mut headers, "x-ratelimit-reset", decision.reset.to_string());
	if decision.collision {
		set_header(&mut headers, "x-ratelimit-collision", "true");
	}
	headers
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use super::*;
	use crate::authorization::ScopeConfig;
	use crate::clock::FixedClock;
	use crate::limiter::optimistic::OptimisticLimiter;
	use crate::limiter::LimiterKey;
	use crate::store::memory::InMemoryCounterStore;
	use crate::verifier::{StaticVerifier, VerifyError};

	fn request(uri: &str, headers: HeaderMap) -> CfRequest {
		CfRequest {
			uri: uri.to_string(),
			headers,
		}
	}

	fn authorizer() -> ScopeAuthorizer {
		let mut scopes = HashMap::new();
		scopes.insert(
			"uk/api".to_string(),
			ScopeConfig {
				excluded_paths: vec![],
				allowed_paths: vec!["/uk/api".to_string()],
			},
		);
		ScopeAuthorizer::new(scopes)
	}

	fn selector() -> LimiterSelector {
		let store = Arc::new(InMemoryCounterStore::new());
		let clock = Arc::new(FixedClock::new(1_000));
		let mut limiters: HashMap<LimiterKey, Arc<dyn crate::limiter::RateLimiter>> = HashMap::new();
		limiters.insert(
			LimiterKey::ReducedAtomicityHybridV2,
			Arc::new(OptimisticLimiter::new(store, clock)),
		);
		LimiterSelector::new(LimiterKey::ReducedAtomicityHybridV2, false, limiters)
	}

	#[tokio::test]
	async fn no_authorization_header_forwards_as_unknown() {
		let orch = RequestOrchestrator::new(selector(), Arc::new(StaticVerifier::allow("c1", "uk/api")), authorizer());
		match orch.handle(request("/uk/api/x", HeaderMap::new())).await {
			Outcome::Forward(req) => assert_eq!(get_header(&req.headers, "x-client-id"), Some("unknown")),
			Outcome::Respond(_) => panic!("expected forward"),
		}
	}

	#[tokio::test]
	async fn bad_token_is_401() {
		let orch = RequestOrchestrator::new(
			selector(),
			Arc::new(StaticVerifier::deny(VerifyError::Invalid("bad signature".into()))),
			authorizer(),
		);
		let mut headers = HeaderMap::new();
		set_header(&mut headers, "authorization", "Bearer garbage");
		match orch.handle(request("/uk/api/x", headers)).await {
			Outcome::Respond(resp) => assert_eq!(resp.status, "401"),
			Outcome::Forward(_) => panic!("expected 401"),
		}
	}

	#[tokio::test]
	async fn non_bearer_authorization_is_401() {
		let orch = RequestOrchestrator::new(selector(), Arc::new(StaticVerifier::allow("c1", "uk/api")), authorizer());
		let mut headers = HeaderMap::new();
		set_header(&mut headers, "authorization", "Basic garbage");
		match orch.handle(request("/uk/api/x", headers)).await {
			Outcome::Respond(resp) => assert_eq!(resp.status, "401"),
			Outcome::Forward(_) => panic!("expected 401"),
		}
	}

	#[tokio::test]
	async fn scope_mismatch_is_403() {
		let orch = RequestOrchestrator::new(
			selector(),
			Arc::new(StaticVerifier::allow("c1", "invalid/scope")),
			authorizer(),
		);
		let mut headers = HeaderMap::new();
		set_header(&mut headers, "authorization", "Bearer t");
		match orch.handle(request("/uk/api/commodities/1", headers)).await {
			Outcome::Respond(resp) => assert_eq!(resp.status, "403"),
			Outcome::Forward(_) => panic!("expected 403"),
		}
	}

	#[tokio::test]
	async fn allowed_request_forwards_with_rate_limit_headers() {
		let orch = RequestOrchestrator::new(selector(), Arc::new(StaticVerifier::allow("c1", "uk/api")), authorizer());
		let mut headers = HeaderMap::new();
		set_header(&mut headers, "authorization", "Bearer t");
		match orch.handle(request("/uk/api/commodities/1", headers)).await {
			Outcome::Forward(req) => {
				assert_eq!(get_header(&req.headers, "x-client-id"), Some("c1"));
				assert_eq!(get_header(&req.headers, "x-ratelimit-remaining"), Some("499"));
			},
			Outcome::Respond(_) => panic!("expected forward"),
		}
	}
}
