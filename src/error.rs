//! Top-level error type for startup/config-time failures (spec §7's error
//! taxonomy extended to the ambient stack). Per-request failures are
//! handled entirely inside the orchestrator, which never propagates a
//! `Result::Err` — every outcome maps to an HTTP response.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("configuration error: {0}")]
	Config(#[from] anyhow::Error),

	#[error("failed to construct token verifier: {0}")]
	Verifier(#[from] crate::verifier::VerifyError),
}
