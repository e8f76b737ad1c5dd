//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Resolve secret → Init metrics → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C or trigger → Stop accepting → Drain in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal (a missing production secret
//!   must never degrade into an ephemeral key silently)
//! - Listener starts last (traffic only when ready)

pub mod shutdown;

pub use shutdown::Shutdown;
