//! Breach corpus providers.

use async_trait::async_trait;
use warden_common::WardenError;

use crate::fingerprint::RangeQuery;

/// A remote breach corpus queried by hash range.
///
/// Implementations see only the [`RangeQuery`]; the raw candidate never
/// crosses this boundary.
#[async_trait]
pub trait BreachSource: Send + Sync {
    /// Provider identifier used in logs and error context
    fn provider(&self) -> &str;

    /// Wait until the provider may be called again.
    ///
    /// Runs before circuit admission and outside the per-attempt timeout.
    async fn ready(&self) {}

    /// Times the candidate's hash appears in the corpus (0 = not breached)
    async fn lookup(&self, query: &RangeQuery) -> Result<u64, WardenError>;
}
