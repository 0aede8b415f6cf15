//! Token verification is an external collaborator per spec §1 — the real
//! system calls out to a separate token-verifier service. This module
//! defines the interface the orchestrator composes against plus a small
//! concrete JWKS-backed implementation (spec §4.6) and a static test double.

use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq)]
pub enum VerifyError {
	#[error("no bearer token present")]
	Missing,
	#[error("the token is malformed or failed validation: {0}")]
	Invalid(String),
	#[error("the token header does not specify a `kid`")]
	MissingKeyId,
	#[error("token refers to an unknown signing key {0:?}")]
	UnknownKeyId(String),
	#[error("token is missing the claim bound to client id")]
	MissingClientId,
}

/// Decoded claims plus the raw token, analogous to the teacher's
/// `http::jwt::Claims`.
#[derive(Debug)]
pub struct Claims {
	pub client_id: String,
	/// Space-separated scope list, as used by the authorization predicate.
	pub scopes: String,
	pub raw: Map<String, Value>,
	/// The bearer token itself, wrapped so it can be held for downstream use
	/// (e.g. forwarding to an origin) without it ever printing via `{:?}`.
	pub jwt: SecretString,
}

impl Default for Claims {
	fn default() -> Self {
		Self {
			client_id: String::new(),
			scopes: String::new(),
			raw: Map::new(),
			jwt: SecretString::new(String::new().into()),
		}
	}
}

impl Clone for Claims {
	fn clone(&self) -> Self {
		Self {
			client_id: self.client_id.clone(),
			scopes: self.scopes.clone(),
			raw: self.raw.clone(),
			jwt: SecretString::new(self.jwt.expose_secret().to_string().into()),
		}
	}
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
	async fn verify(&self, token: &str) -> Result<Claims, VerifyError>;
}

/// A JWKS-based verifier. Unlike the teacher's `http::jwt::Jwt`, the JWKS
/// set is loaded once at construction time and never refreshed — spec
/// explicitly scopes JWT acquisition/verification out, so this exists only
/// so the orchestrator has a real collaborator to exercise end to end.
pub struct JwksVerifier {
	keys: HashMap<String, VerifierKey>,
	client_id_claim: String,
	scope_claim: String,
}

struct VerifierKey {
	decoding: DecodingKey,
	validation: Validation,
}

impl JwksVerifier {
	pub fn from_jwk_set(
		jwks: JwkSet,
		audiences: &[String],
		client_id_claim: impl Into<String>,
		scope_claim: impl Into<String>,
	) -> Result<Self, VerifyError> {
		let mut keys = HashMap::new();
		for jwk in jwks.keys {
			let Some(kid) = jwk.common.key_id.clone() else {
				continue;
			};
			let decoding = match &jwk.algorithm {
				AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
					.map_err(|e| VerifyError::Invalid(e.to_string()))?,
				AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
					.map_err(|e| VerifyError::Invalid(e.to_string()))?,
				_ => continue,
			};
			let mut validation = Validation::new(Algorithm::RS256);
			if !audiences.is_empty() {
				validation.set_audience(audiences);
			}
			keys.insert(kid, VerifierKey { decoding, validation });
		}
		Ok(Self {
			keys,
			client_id_claim: client_id_claim.into(),
			scope_claim: scope_claim.into(),
		})
	}
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
	async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
		let header = decode_header(token).map_err(|e| VerifyError::Invalid(e.to_string()))?;
		let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;
		let key = self
			.keys
			.get(&kid)
			.ok_or_else(|| VerifyError::UnknownKeyId(kid.clone()))?;

		let decoded = decode::<Map<String, Value>>(token, &key.decoding, &key.validation).map_err(|e| {
			debug!(?e, "token failed validation");
			VerifyError::Invalid(e.to_string())
		})?;

		let client_id = decoded
			.claims
			.get(&self.client_id_claim)
			.and_then(Value::as_str)
			.ok_or(VerifyError::MissingClientId)?
			.to_string();

		let scopes = decoded
			.claims
			.get(&self.scope_claim)
			.and_then(Value::as_str)
			.unwrap_or("")
			.to_string();

		Ok(Claims {
			client_id,
			scopes,
			raw: decoded.claims,
			// Held for potential downstream use (e.g. forwarding to an
			// origin); never logged.
			jwt: SecretString::new(token.into()),
		})
	}
}

/// Test double returning a fixed outcome regardless of the token presented.
pub struct StaticVerifier(pub Result<Claims, VerifyError>);

impl StaticVerifier {
	pub fn allow(client_id: impl Into<String>, scopes: impl Into<String>) -> Self {
		Self(Ok(Claims {
			client_id: client_id.into(),
			scopes: scopes.into(),
			raw: Map::new(),
			jwt: SecretString::new(String::new().into()),
		}))
	}

	pub fn deny(err: VerifyError) -> Self {
		Self(Err(err))
	}
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
	async fn verify(&self, _token: &str) -> Result<Claims, VerifyError> {
		match &self.0 {
			Ok(claims) => Ok(claims.clone()),
			Err(e) => Err(clone_err(e)),
		}
	}
}

fn clone_err(e: &VerifyError) -> VerifyError {
	match e {
		VerifyError::Missing => VerifyError::Missing,
		VerifyError::Invalid(s) => VerifyError::Invalid(s.clone()),
		VerifyError::MissingKeyId => VerifyError::MissingKeyId,
		VerifyError::UnknownKeyId(s) => VerifyError::UnknownKeyId(s.clone()),
		VerifyError::MissingClientId => VerifyError::MissingClientId,
	}
}
