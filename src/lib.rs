//! Edge authentication and rate-limiting filter for a CDN viewer-request hook.
//!
//! The core of this crate is the distributed token-bucket rate limiter
//! (`limiter`) and the request-scoped orchestrator (`orchestrator`) that
//! composes authentication, authorization and rate limiting into a single
//! decision per request.

pub mod authorization;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod verifier;

/// Pulled in via `use crate::prelude::*;` by the modules on the hot request
/// path (`orchestrator`, `limiter::hybrid`, `limiter::optimistic`), the way
/// the teacher's `agent_core::prelude` is pulled into every module.
pub mod prelude {
	pub use std::sync::Arc;
	pub use std::time::Duration;

	pub use tracing::{debug, error, info, trace, warn};
}

pub use config::Config;
pub use error::GatewayError;
pub use orchestrator::RequestOrchestrator;
