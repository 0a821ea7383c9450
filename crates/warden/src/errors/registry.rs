//! Priority-ordered, category-keyed error dispatch.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use warden_common::constants::{ERROR_STATS_WINDOW, messages};
use warden_common::{CategoryStats, ErrorCategory, ErrorHandlingResult, Severity, WardenError};

use super::handlers;

/// Where an error happened
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub operation: String,
    pub provider: Option<String>,
    /// Short fingerprint of the candidate, never the candidate itself
    pub fingerprint: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Default::default()
        }
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn fingerprint(mut self, short: impl Into<String>) -> Self {
        self.fingerprint = Some(short.into());
        self
    }
}

/// What a handler decided; the registry adds category, identity, and timing
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub severity: Severity,
    pub user_message: String,
    pub should_fallback: bool,
    pub can_retry: bool,
    pub retry_after_secs: Option<u64>,
}

/// A category-specific error strategy
pub trait ErrorHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs first
    fn priority(&self) -> i32 {
        0
    }

    fn can_handle(&self, error: &WardenError, context: &ErrorContext) -> bool;

    fn handle(&self, error: &WardenError, context: &ErrorContext) -> HandlerOutcome;
}

type SignatureRule = (ErrorCategory, fn(&WardenError) -> bool);

/// Classification chain, evaluated in order; first match wins
const RULES: [SignatureRule; 3] = [
    (ErrorCategory::Network, is_network_signature),
    (ErrorCategory::Api, is_api_signature),
    (ErrorCategory::Validation, is_validation_signature),
];

/// Resolve the category of an error. Falls back to `System`.
pub fn classify(error: &WardenError) -> ErrorCategory {
    RULES
        .iter()
        .find(|(_, matches)| matches(error))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::System)
}

fn message_mentions(error: &WardenError, needles: &[&str]) -> bool {
    let WardenError::Internal(message) = error else {
        return false;
    };
    let message = message.to_lowercase();
    needles.iter().any(|needle| message.contains(needle))
}

fn is_network_signature(error: &WardenError) -> bool {
    matches!(
        error,
        WardenError::Timeout(_) | WardenError::Network(_) | WardenError::Offline
    ) || message_mentions(error, &["network", "timeout", "timed out", "connection", "fetch"])
}

fn is_api_signature(error: &WardenError) -> bool {
    matches!(
        error,
        WardenError::RateLimited { .. }
            | WardenError::ServiceUnavailable(_)
            | WardenError::Rejected { .. }
            | WardenError::MalformedResponse(_)
            | WardenError::CircuitOpen { .. }
            | WardenError::RecentlyFailed
    ) || message_mentions(error, &["429", "rate limit", "503", "unavailable", "api"])
}

fn is_validation_signature(error: &WardenError) -> bool {
    matches!(error, WardenError::InvalidInput(_))
        || message_mentions(error, &["invalid", "validation"])
}

#[derive(Default)]
struct StatsWindow {
    count: u64,
    samples: VecDeque<u64>,
}

impl StatsWindow {
    fn record(&mut self, micros: u64) {
        self.count += 1;
        if self.samples.len() == ERROR_STATS_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(micros);
    }

    fn summary(&self) -> CategoryStats {
        if self.samples.is_empty() {
            return CategoryStats::default();
        }
        let total: u64 = self.samples.iter().sum();
        CategoryStats {
            count: self.count,
            average_micros: total as f64 / self.samples.len() as f64,
            min_micros: self.samples.iter().copied().min().unwrap_or_default(),
            max_micros: self.samples.iter().copied().max().unwrap_or_default(),
        }
    }
}

/// Process-wide error dispatch table
pub struct ErrorHandlerRegistry {
    handlers: RwLock<HashMap<ErrorCategory, Vec<Arc<dyn ErrorHandler>>>>,
    stats: Mutex<HashMap<ErrorCategory, StatsWindow>>,
}

impl ErrorHandlerRegistry {
    /// Empty registry; every error goes to the default handler
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the built-in category handlers
    pub fn with_default_handlers() -> Self {
        let registry = Self::new();
        handlers::register_defaults(&registry);
        registry
    }

    /// Insert keeping descending priority; equal priorities keep registration order
    pub fn register_handler(&self, category: ErrorCategory, handler: Arc<dyn ErrorHandler>) {
        let mut table = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let list = table.entry(category).or_default();
        let position = list
            .iter()
            .position(|existing| existing.priority() < handler.priority())
            .unwrap_or(list.len());
        tracing::debug!(
            category = ?category,
            handler = handler.name(),
            priority = handler.priority(),
            "Registered error handler"
        );
        list.insert(position, handler);
    }

    /// Handler names for a category in dispatch order
    pub fn handler_names(&self, category: ErrorCategory) -> Vec<String> {
        let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        table
            .get(&category)
            .map(|list| list.iter().map(|h| h.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Dispatch `error` to the first capable handler of its category
    pub fn handle_error(
        &self,
        error: &WardenError,
        context: &ErrorContext,
        category: Option<ErrorCategory>,
    ) -> ErrorHandlingResult {
        let started = Instant::now();
        let category = category.unwrap_or_else(|| classify(error));

        let handler = {
            let table = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            table.get(&category).and_then(|list| {
                list.iter()
                    .find(|handler| handler.can_handle(error, context))
                    .cloned()
            })
        };

        let (name, outcome) = match handler {
            Some(handler) => (handler.name().to_string(), handler.handle(error, context)),
            None => ("default".to_string(), default_outcome()),
        };

        let handling_micros = started.elapsed().as_micros() as u64;
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(category)
            .or_default()
            .record(handling_micros);

        tracing::debug!(
            category = ?category,
            handler = %name,
            severity = ?outcome.severity,
            operation = %context.operation,
            error = %error,
            "Handled error"
        );

        ErrorHandlingResult {
            category,
            severity: outcome.severity,
            user_message: outcome.user_message,
            should_fallback: outcome.should_fallback,
            can_retry: outcome.can_retry,
            handler: name,
            retry_after_secs: outcome.retry_after_secs,
            handling_micros,
        }
    }

    /// Per-category handling statistics
    pub fn stats(&self) -> BTreeMap<ErrorCategory, CategoryStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(category, window)| (*category, window.summary()))
            .collect()
    }
}

impl Default for ErrorHandlerRegistry {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

fn default_outcome() -> HandlerOutcome {
    HandlerOutcome {
        severity: Severity::Critical,
        user_message: messages::UNEXPECTED.to_string(),
        should_fallback: true,
        can_retry: false,
        retry_after_secs: None,
    }
}
