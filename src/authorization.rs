//! Scope-to-path authorization predicate (spec §4.5). Trivially composed
//! with the core, so its policy is data (the `SCOPES` config map), not
//! design — unlike the teacher's CEL-based `HTTPAuthorizationSet`, this has
//! no expression language: a scope either names a path policy or is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeConfig {
	#[serde(default)]
	pub excluded_paths: Vec<String>,
	#[serde(default)]
	pub allowed_paths: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScopeAuthorizer {
	scopes: HashMap<String, ScopeConfig>,
}

impl ScopeAuthorizer {
	pub fn new(scopes: HashMap<String, ScopeConfig>) -> Self {
		Self { scopes }
	}

	/// `scope_list` is the space-separated scope claim from the verified
	/// token. Returns true on the first scope whose policy matches; false
	/// if no configured scope grants access to `path`.
	pub fn authorized(&self, scope_list: &str, path: &str) -> bool {
		for scope in scope_list.split_whitespace() {
			let Some(cfg) = self.scopes.get(scope) else {
				continue;
			};
			if cfg.excluded_paths.iter().any(|excluded| path.contains(excluded.as_str())) {
				continue;
			}
			if cfg.allowed_paths.iter().any(|allowed| path.starts_with(allowed.as_str())) {
				return true;
			}
		}
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn authorizer() -> ScopeAuthorizer {
		let mut scopes = HashMap::new();
		scopes.insert(
			"uk/api".to_string(),
			ScopeConfig {
				excluded_paths: vec!["/uk/api/internal".to_string()],
				allowed_paths: vec!["/uk/api".to_string()],
			},
		);
		ScopeAuthorizer::new(scopes)
	}

	#[test]
	fn allows_matching_scope_and_prefix() {
		assert!(authorizer().authorized("uk/api", "/uk/api/commodities/1234"));
	}

	#[test]
	fn excluded_path_skips_the_scope() {
		assert!(!authorizer().authorized("uk/api", "/uk/api/internal/debug"));
	}

	#[test]
	fn unknown_scope_denies() {
		assert!(!authorizer().authorized("invalid/scope", "/uk/api/commodities/1234"));
	}

	#[test]
	fn first_matching_scope_wins() {
		let mut scopes = HashMap::new();
		scopes.insert(
			"a".to_string(),
			ScopeConfig {
				excluded_paths: vec![],
				allowed_paths: vec!["/x".to_string()],
			},
		);
		scopes.insert(
			"b".to_string(),
			ScopeConfig {
				excluded_paths: vec![],
				allowed_paths: vec!["/y".to_string()],
			},
		);
		let authz = ScopeAuthorizer::new(scopes);
		assert!(authz.authorized("a b", "/y/z"));
	}
}
