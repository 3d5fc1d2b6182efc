//! # costwatch
//!
//! Multi-tenant cloud cost analytics: budget-threshold alerts, daily spend
//! anomaly detection, and short-horizon forecasting over one shared daily
//! cost series.
//!
//! Storage and alert delivery are trait seams ([`store::UsageSeriesReader`],
//! [`store::BudgetStore`], [`store::BudgetEventStore`],
//! [`dispatch::AlertDispatch`]); the crate owns the analytical semantics
//! and ships an in-memory backend for tests and single-instance use.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use costwatch::{Budget, CostEngine, MemoryStore, UsagePoint};
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), costwatch::BudgetError> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.upsert_budget(Budget::new("acme", "monthly", dec!(10000)));
//!     store.insert_usage(UsagePoint::new(
//!         "acme",
//!         "2025-03-10".parse().unwrap(),
//!         "EC2",
//!         dec!(7500),
//!     ));
//!
//!     let engine = CostEngine::with_tracing_dispatch(
//!         store.clone(),
//!         store.clone(),
//!         store.clone(),
//!     );
//!     let outcome = engine
//!         .run_daily("acme", "2025-03-10".parse().unwrap())
//!         .await?;
//!     println!(
//!         "{} thresholds fired, {} anomalies",
//!         outcome.budgets.fired.len(),
//!         outcome.anomalies.len()
//!     );
//!     Ok(())
//! }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod anomaly;
pub mod budget;
pub mod dispatch;
pub mod engine;
pub mod forecast;
pub mod stats;
pub mod store;
pub mod types;

// Re-exports for convenience
pub use anomaly::{Anomaly, AnomalyDetector, DetectionMethod, DetectorConfig, Severity};
pub use budget::{
    BudgetError, BudgetEvaluator, BudgetFailure, BudgetResult, EvaluationOutcome, month_start,
    next_month_start,
};
pub use dispatch::{
    AlertDispatch, BudgetAlert, DispatchError, DispatchResult, NoopDispatch, RecordingDispatch,
    TracingDispatch,
};
pub use engine::{CostEngine, DailyRunOutcome};
pub use forecast::{
    DimensionForecasts, DimensionSeries, ForecastConfig, ForecastEngine, ForecastPoint,
    ForecastSeries, TotalPoint, forecast,
};
pub use store::{
    BudgetEventStore, BudgetStore, MemoryStore, StoreError, StoreResult, UsageSeriesReader,
};
pub use types::{
    Budget, BudgetEvent, DEFAULT_THRESHOLDS, DayCost, ScopeFilter, UsagePoint,
};
