//! # Warden Common
//!
//! Shared types, errors, and defaults used across Warden components.
//!
//! ## Modules
//! - `types` - Core data structures (VerificationVerdict, CircuitState, ValidationSnapshot, etc.)
//! - `error` - Common error taxonomy
//! - `constants` - Configuration defaults and user-facing messages

pub mod constants;
pub mod error;
pub mod types;

pub use error::WardenError;
pub use types::*;
