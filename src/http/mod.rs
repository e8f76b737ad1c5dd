//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, security layers)
//!     → handlers.rs (token issuance, error-report intake, health)
//!     → Send response to client
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
