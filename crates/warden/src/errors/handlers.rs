//! Built-in error handlers, one per failure shape.

use std::sync::Arc;

use warden_common::constants::messages;
use warden_common::{ErrorCategory, Severity, WardenError};

use super::registry::{ErrorContext, ErrorHandler, ErrorHandlerRegistry, HandlerOutcome};

/// Register every built-in handler
pub fn register_defaults(registry: &ErrorHandlerRegistry) {
    registry.register_handler(ErrorCategory::Network, Arc::new(NetworkHandler));
    registry.register_handler(ErrorCategory::Network, Arc::new(OfflineHandler));
    registry.register_handler(ErrorCategory::Api, Arc::new(RateLimitHandler));
    registry.register_handler(ErrorCategory::Api, Arc::new(ServiceUnavailableHandler));
    registry.register_handler(ErrorCategory::Api, Arc::new(MalformedResponseHandler));
    registry.register_handler(ErrorCategory::Validation, Arc::new(ValidationHandler));
}

/// Timeouts and connection failures
pub struct NetworkHandler;

impl ErrorHandler for NetworkHandler {
    fn name(&self) -> &str {
        "network"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, error: &WardenError, _: &ErrorContext) -> bool {
        matches!(
            error,
            WardenError::Timeout(_) | WardenError::Network(_) | WardenError::Internal(_)
        )
    }

    fn handle(&self, _: &WardenError, _: &ErrorContext) -> HandlerOutcome {
        HandlerOutcome {
            severity: Severity::Medium,
            user_message: messages::NETWORK.to_string(),
            should_fallback: true,
            can_retry: true,
            retry_after_secs: None,
        }
    }
}

/// No connectivity at all
pub struct OfflineHandler;

impl ErrorHandler for OfflineHandler {
    fn name(&self) -> &str {
        "offline"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn can_handle(&self, error: &WardenError, _: &ErrorContext) -> bool {
        matches!(error, WardenError::Offline)
    }

    fn handle(&self, _: &WardenError, _: &ErrorContext) -> HandlerOutcome {
        HandlerOutcome {
            severity: Severity::Low,
            user_message: messages::OFFLINE.to_string(),
            should_fallback: true,
            can_retry: true,
            retry_after_secs: None,
        }
    }
}

/// Provider load shedding (HTTP 429)
pub struct RateLimitHandler;

impl ErrorHandler for RateLimitHandler {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, error: &WardenError, _: &ErrorContext) -> bool {
        matches!(error, WardenError::RateLimited { .. })
            || matches!(error, WardenError::Internal(m) if m.contains("429") || m.to_lowercase().contains("rate limit"))
    }

    fn handle(&self, error: &WardenError, context: &ErrorContext) -> HandlerOutcome {
        let retry_after_secs = match error {
            WardenError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        };
        tracing::warn!(
            provider = context.provider.as_deref().unwrap_or("unknown"),
            retry_after_secs = ?retry_after_secs,
            "Breach check rate limited"
        );
        HandlerOutcome {
            severity: Severity::Medium,
            user_message: messages::RATE_LIMITED.to_string(),
            should_fallback: true,
            can_retry: false,
            retry_after_secs,
        }
    }
}

/// Service down, circuit open, or a recent failure still cached
pub struct ServiceUnavailableHandler;

impl ErrorHandler for ServiceUnavailableHandler {
    fn name(&self) -> &str {
        "service-unavailable"
    }

    fn priority(&self) -> i32 {
        90
    }

    fn can_handle(&self, error: &WardenError, _: &ErrorContext) -> bool {
        matches!(
            error,
            WardenError::ServiceUnavailable(_)
                | WardenError::CircuitOpen { .. }
                | WardenError::RecentlyFailed
                | WardenError::Internal(_)
        )
    }

    fn handle(&self, error: &WardenError, _: &ErrorContext) -> HandlerOutcome {
        let retry_after_secs = match error {
            WardenError::CircuitOpen { retry_in_ms } => Some(retry_in_ms.div_ceil(1000)),
            _ => None,
        };
        HandlerOutcome {
            severity: Severity::High,
            user_message: messages::SERVICE_UNAVAILABLE.to_string(),
            should_fallback: true,
            can_retry: true,
            retry_after_secs,
        }
    }
}

/// The provider answered, but not in a usable way
pub struct MalformedResponseHandler;

impl ErrorHandler for MalformedResponseHandler {
    fn name(&self) -> &str {
        "malformed-response"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn can_handle(&self, error: &WardenError, _: &ErrorContext) -> bool {
        matches!(
            error,
            WardenError::MalformedResponse(_) | WardenError::Rejected { .. }
        )
    }

    fn handle(&self, error: &WardenError, _: &ErrorContext) -> HandlerOutcome {
        tracing::error!(error = %error, "Breach provider returned an unusable response");
        HandlerOutcome {
            severity: Severity::High,
            user_message: messages::SERVICE_UNAVAILABLE.to_string(),
            should_fallback: true,
            can_retry: false,
            retry_after_secs: None,
        }
    }
}

/// Local input problems; never a reason to wave the value through
pub struct ValidationHandler;

impl ErrorHandler for ValidationHandler {
    fn name(&self) -> &str {
        "validation"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn can_handle(&self, _: &WardenError, _: &ErrorContext) -> bool {
        true
    }

    fn handle(&self, error: &WardenError, _: &ErrorContext) -> HandlerOutcome {
        let user_message = match error {
            WardenError::InvalidInput(message) => message.clone(),
            other => other.to_string(),
        };
        HandlerOutcome {
            severity: Severity::Low,
            user_message,
            should_fallback: false,
            can_retry: false,
            retry_after_secs: None,
        }
    }
}
