//! Thin CLI for exercising the orchestrator against a CDN viewer-request
//! JSON event locally. Lambda@Edge itself only hosts Node.js/Python, so a
//! Rust binary can never be the deployed handler (spec §1 Non-goals); this
//! is a local harness, not a runtime.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use jsonwebtoken::jwk::JwkSet;

use edgeguard::authorization::ScopeAuthorizer;
use edgeguard::clock::SystemClock;
use edgeguard::config::Config;
use edgeguard::envelope::ViewerRequestEvent;
use edgeguard::limiter::atomic::FullyAtomicLimiter;
use edgeguard::limiter::hybrid::HybridLimiter;
use edgeguard::limiter::optimistic::OptimisticLimiter;
use edgeguard::limiter::selector::LimiterSelector;
use edgeguard::limiter::{LimiterKey, RateLimiter};
use edgeguard::orchestrator::{Outcome, RequestOrchestrator};
use edgeguard::store::memory::InMemoryCounterStore;
use edgeguard::verifier::{JwksVerifier, StaticVerifier, TokenVerifier};
use edgeguard::GatewayError;

#[derive(Parser)]
#[command(name = "edgeguard", about = "Exercise the edge auth/rate-limit filter against one viewer-request event")]
struct Cli {
	/// Path to a viewer-request JSON event (spec §6); reads stdin if omitted.
	#[arg(long)]
	event: Option<String>,

	/// Client id the local (always-accepting) test verifier binds to, used
	/// when `--jwks-path` is not given.
	#[arg(long, default_value = "local-client")]
	client_id: String,

	/// Space-separated scopes the local test verifier binds to, used when
	/// `--jwks-path` is not given.
	#[arg(long, default_value = "uk/api")]
	scopes: String,

	/// Path to a JWKS document. When set, incoming bearer tokens are verified
	/// against it instead of the always-accepting test verifier.
	#[arg(long)]
	jwks_path: Option<String>,

	/// Claim carrying the client id, used only with `--jwks-path`.
	#[arg(long, default_value = "sub")]
	client_id_claim: String,

	/// Claim carrying the space-separated scopes, used only with `--jwks-path`.
	#[arg(long, default_value = "scope")]
	scope_claim: String,
}

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
	edgeguard::logging::init();
	let cli = Cli::parse();
	let config = Config::from_env().map_err(GatewayError::Config)?;

	let raw = read_event(cli.event.as_deref()).map_err(GatewayError::Config)?;
	let event: ViewerRequestEvent = serde_json::from_str(&raw).map_err(|e| GatewayError::Config(e.into()))?;
	let request = event
		.request()
		.cloned()
		.ok_or_else(|| GatewayError::Config(anyhow::anyhow!("event carried no Records[0].cf.request")))?;

	let store = Arc::new(InMemoryCounterStore::new());
	let clock = Arc::new(SystemClock);
	let mut limiters: HashMap<LimiterKey, Arc<dyn RateLimiter>> = HashMap::new();
	limiters.insert(
		LimiterKey::ReducedAtomicityHybridV1,
		Arc::new(OptimisticLimiter::new(store.clone(), clock.clone())),
	);
	limiters.insert(
		LimiterKey::ReducedAtomicityHybridV2,
		Arc::new(HybridLimiter::with_staleness(
			store.clone(),
			clock.clone(),
			config.hybrid_v2_staleness,
		)),
	);
	limiters.insert(
		LimiterKey::FullyAtomicDynamo,
		Arc::new(FullyAtomicLimiter::new(store, clock)),
	);
	let selector = LimiterSelector::new(config.default_limiter, config.rate_limiter_configurable_via_header, limiters);

	let verifier = build_verifier(&cli)?;
	let authorizer = ScopeAuthorizer::new(config.scopes);
	let orchestrator = RequestOrchestrator::new(selector, verifier, authorizer);

	match orchestrator.handle(request).await {
		Outcome::Forward(req) => {
			println!("{}", serde_json::to_string_pretty(&req).map_err(|e| GatewayError::Config(e.into()))?)
		},
		Outcome::Respond(resp) => {
			println!("{}", serde_json::to_string_pretty(&resp).map_err(|e| GatewayError::Config(e.into()))?)
		},
	}

	Ok(())
}

fn read_event(path: Option<&str>) -> anyhow::Result<String> {
	match path {
		Some(path) => Ok(std::fs::read_to_string(path)?),
		None => {
			let mut buf = String::new();
			std::io::stdin().read_to_string(&mut buf)?;
			Ok(buf)
		},
	}
}

/// Builds the real JWKS-backed verifier when `--jwks-path` is given, or the
/// always-accepting test double otherwise.
fn build_verifier(cli: &Cli) -> Result<Arc<dyn TokenVerifier>, GatewayError> {
	let Some(path) = &cli.jwks_path else {
		return Ok(Arc::new(StaticVerifier::allow(cli.client_id.clone(), cli.scopes.clone())));
	};
	let raw = std::fs::read_to_string(path).map_err(|e| GatewayError::Config(e.into()))?;
	let jwks: JwkSet = serde_json::from_str(&raw).map_err(|e| GatewayError::Config(e.into()))?;
	let verifier = JwksVerifier::from_jwk_set(jwks, &[], &cli.client_id_claim, &cli.scope_claim)
		.map_err(GatewayError::Verifier)?;
	Ok(Arc::new(verifier))
}
