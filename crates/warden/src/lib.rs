//! # Warden - resilient breach checking
//!
//! Checks candidate passwords against a remote breach corpus without ever
//! sending or logging the password itself, and keeps answering sensibly when
//! the corpus is slow, rate limiting, or unreachable.
//!
//! ## Architecture
//! ```text
//! HTTP / UI → ValidationOrchestrator (debounce, cancel)
//!                 ↓
//!           VerificationClient → ResultCache
//!                 ↓
//!           CircuitBreaker + RetryExecutor → BreachSource (range API)
//!                 ↓ (failure)
//!           ErrorHandlerRegistry → snapshot fallback
//!
//! ConnectivityMonitor → RetryExecutor (offline gate), OfflineQueue (replay)
//! ```

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod fingerprint;
pub mod offline;
pub mod resilience;
pub mod routes;
pub mod state;
pub mod validation;

pub use cancel::CancelToken;
pub use client::{BreachSource, VerificationClient, VerificationOutcome};
pub use config::AppConfig;
pub use state::Services;
pub use validation::{UserContext, ValidationOrchestrator};
