//! Alert dispatch seam.
//!
//! Delivery transport (email, webhooks) lives outside the crate. The
//! evaluator fires and forgets: a failed delivery is logged, never rolled
//! back into the already-recorded event.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("alert delivery failed: {message}")]
    Delivery { message: String },
}

impl DispatchError {
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
        }
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Payload handed to dispatch when a budget threshold fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAlert {
    pub budget_id: String,
    pub budget_name: String,
    pub spend: Decimal,
    pub limit: Decimal,
    /// Month-to-date usage as a floored percentage of the limit.
    pub pct: i64,
    pub threshold: u32,
    pub period_start: NaiveDate,
    pub currency: String,
}

#[async_trait]
pub trait AlertDispatch: Send + Sync {
    async fn budget_alert(&self, tenant_id: &str, alert: &BudgetAlert) -> DispatchResult<()>;
}

/// Discards alerts. For callers that only want the recorded events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatch;

#[async_trait]
impl AlertDispatch for NoopDispatch {
    async fn budget_alert(&self, _tenant_id: &str, _alert: &BudgetAlert) -> DispatchResult<()> {
        Ok(())
    }
}

/// Logs alerts through `tracing` instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatch;

#[async_trait]
impl AlertDispatch for TracingDispatch {
    async fn budget_alert(&self, tenant_id: &str, alert: &BudgetAlert) -> DispatchResult<()> {
        warn!(
            tenant_id,
            budget = %alert.budget_name,
            threshold = alert.threshold,
            pct = alert.pct,
            spend = %alert.spend,
            limit = %alert.limit,
            "budget threshold crossed"
        );
        Ok(())
    }
}

/// Captures alerts in memory (for testing).
#[derive(Debug, Default)]
pub struct RecordingDispatch {
    alerts: Mutex<Vec<(String, BudgetAlert)>>,
}

impl RecordingDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<(String, BudgetAlert)> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AlertDispatch for RecordingDispatch {
    async fn budget_alert(&self, tenant_id: &str, alert: &BudgetAlert) -> DispatchResult<()> {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push((tenant_id.to_string(), alert.clone()));
        }
        Ok(())
    }
}

/// Always fails (for testing the evaluator's fire-and-forget behavior).
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingDispatch;

#[async_trait]
impl AlertDispatch for FailingDispatch {
    async fn budget_alert(&self, _tenant_id: &str, _alert: &BudgetAlert) -> DispatchResult<()> {
        Err(DispatchError::delivery("transport unreachable"))
    }
}
