//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming /api request:
//!     → rate_limit.rs (per-IP ceiling for the prefix)
//!     → csrf.rs (token gate on mutating methods)
//!     → rate_limit.rs strict tier (sensitive endpoints)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Uniform CSRF denial: callers never learn which check failed
//! - No trust in client input

pub mod csrf;
pub mod rate_limit;
pub mod secret;

pub use csrf::{CsrfGuard, CSRF_HEADER};
pub use rate_limit::RateLimiter;
pub use secret::{resolve_secret, SecretError, SecretKey};
