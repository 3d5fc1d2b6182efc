//! Storage seams for the analytics core.
//!
//! The core treats storage as a queryable append-only time series plus a
//! uniqueness-constrained event log. Real backends live outside the crate;
//! [`MemoryStore`] serves tests and single-instance deployments.

pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{Budget, BudgetEvent, UsagePoint};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("storage backend error: {message}")]
    Backend { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to the daily cost series.
#[async_trait]
pub trait UsageSeriesReader: Send + Sync {
    /// Aggregated rows in `[from, to]` (inclusive), ascending by day, at
    /// most one row per (day, dimension). An empty result is not an error.
    async fn read_daily_cost(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        dimension: Option<&str>,
    ) -> StoreResult<Vec<UsagePoint>>;
}

/// Read access to budget definitions (written by an external admin surface).
#[async_trait]
pub trait BudgetStore: Send + Sync {
    async fn read_active_budgets(&self, tenant_id: &str) -> StoreResult<Vec<Budget>>;
}

/// The core's own write model: threshold-crossing events.
#[async_trait]
pub trait BudgetEventStore: Send + Sync {
    async fn exists(
        &self,
        budget_id: &str,
        period_start: NaiveDate,
        threshold: u32,
    ) -> StoreResult<bool>;

    /// Atomic insert-if-absent on (budget_id, period_start, threshold).
    /// Returns `Ok(true)` when this call created the event, `Ok(false)`
    /// when one already existed, including a concurrent loser. Losing the
    /// race is expected and must not be treated as a failure.
    async fn create_if_absent(&self, event: BudgetEvent) -> StoreResult<bool>;
}
