//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Remote call:
//!     → circuit.rs (admit, or fail fast while open)
//!     → retry.rs (bounded attempts, connectivity gate before each retry)
//!     → backoff.rs (exponential delay + jitter between attempts)
//! ```

pub mod backoff;
pub mod circuit;
pub mod retry;

pub use circuit::{Admission, CircuitBreaker};
pub use retry::{RetryAttempt, RetryExecutor, RetryPolicy, RetryPredicate};
