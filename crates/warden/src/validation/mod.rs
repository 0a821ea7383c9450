//! Password validation.
//!
//! # Data Flow
//! ```text
//! value change
//!     → requirements.rs (length, character classes, personal info)
//!     → orchestrator.rs (debounce, cancel superseded checks)
//!     → client (breach verdict)
//!     → snapshot.rs (fold into a fresh ValidationSnapshot)
//! ```

pub mod orchestrator;
pub mod requirements;
pub mod snapshot;

pub use orchestrator::{ValidationOrchestrator, evaluate};
pub use requirements::{LocalReport, SPECIAL_CHARACTERS, UserContext, evaluate_local};
pub use snapshot::{RemoteStatus, compose};
