//! Error classification and handling.
//!
//! Errors are classified into a [`warden_common::ErrorCategory`], then
//! dispatched to the highest-priority handler of that category that accepts
//! them. Unhandled errors get a critical default result that still allows
//! fallback, so a broken handler never blocks the user.

pub mod handlers;
pub mod registry;

pub use registry::{ErrorContext, ErrorHandler, ErrorHandlerRegistry, HandlerOutcome, classify};
