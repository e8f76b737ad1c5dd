//! Security gateway API for a consumer loan-application web flow.
//!
//! The browser flow (identity capture, OCR form filling, contract
//! rendering) talks to this service for anti-CSRF tokens, and every
//! mutating request it makes is gated behind token verification and
//! per-IP rate limits.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::AppConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{CsrfGuard, SecretKey};
