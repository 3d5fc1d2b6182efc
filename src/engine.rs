//! Facade bundling the three engines over shared storage seams.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use crate::anomaly::{Anomaly, AnomalyDetector, DetectorConfig};
use crate::budget::{BudgetEvaluator, BudgetResult, EvaluationOutcome};
use crate::dispatch::{AlertDispatch, TracingDispatch};
use crate::forecast::{DimensionForecasts, ForecastConfig, ForecastEngine, ForecastSeries};
use crate::store::{BudgetEventStore, BudgetStore, StoreResult, UsageSeriesReader};

/// Combined result of a one-shot per-tenant daily run.
#[derive(Debug)]
pub struct DailyRunOutcome {
    pub budgets: EvaluationOutcome,
    pub anomalies: Vec<Anomaly>,
}

/// Everything a per-tenant caller needs in one place: budget evaluation,
/// anomaly detection, and forecasting over the same usage series.
///
/// Each call is stateless, synchronous-per-call, and tenant-scoped;
/// recurring invocation is the caller's concern.
pub struct CostEngine {
    evaluator: BudgetEvaluator,
    detector: AnomalyDetector,
    forecaster: ForecastEngine,
}

impl CostEngine {
    pub fn new(
        usage: Arc<dyn UsageSeriesReader>,
        budgets: Arc<dyn BudgetStore>,
        events: Arc<dyn BudgetEventStore>,
        dispatch: Arc<dyn AlertDispatch>,
    ) -> Self {
        Self {
            evaluator: BudgetEvaluator::new(
                Arc::clone(&usage),
                budgets,
                events,
                dispatch,
            ),
            detector: AnomalyDetector::new(Arc::clone(&usage)),
            forecaster: ForecastEngine::new(usage),
        }
    }

    /// Log alerts instead of delivering them.
    pub fn with_tracing_dispatch(
        usage: Arc<dyn UsageSeriesReader>,
        budgets: Arc<dyn BudgetStore>,
        events: Arc<dyn BudgetEventStore>,
    ) -> Self {
        Self::new(usage, budgets, events, Arc::new(TracingDispatch))
    }

    pub fn with_detector_config(mut self, config: DetectorConfig) -> Self {
        self.detector = self.detector.with_config(config);
        self
    }

    pub fn with_forecast_config(mut self, config: ForecastConfig) -> Self {
        self.forecaster = self.forecaster.with_config(config);
        self
    }

    /// See [`BudgetEvaluator::evaluate`].
    pub async fn evaluate_budgets(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
    ) -> BudgetResult<EvaluationOutcome> {
        self.evaluator.evaluate(tenant_id, as_of).await
    }

    /// See [`AnomalyDetector::detect`].
    pub async fn detect_anomalies(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Anomaly>> {
        self.detector.detect(tenant_id, from, to).await
    }

    /// See [`AnomalyDetector::detect_daily`].
    pub async fn detect_daily(&self, tenant_id: &str, day: NaiveDate) -> StoreResult<Vec<Anomaly>> {
        self.detector.detect_daily(tenant_id, day).await
    }

    /// See [`ForecastEngine::forecast_tenant`].
    pub async fn forecast(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
        dimension: Option<&str>,
    ) -> StoreResult<ForecastSeries> {
        self.forecaster.forecast_tenant(tenant_id, as_of, dimension).await
    }

    /// See [`ForecastEngine::forecast_by_dimension`].
    pub async fn forecast_by_dimension(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
    ) -> StoreResult<DimensionForecasts> {
        self.forecaster.forecast_by_dimension(tenant_id, as_of).await
    }

    /// The one-shot daily unit a scheduler runs once per tenant per day:
    /// budget evaluation for `day`'s month, then that day's anomalies.
    /// Budget failures are carried in the outcome; a detector read failure
    /// surfaces as the error so the caller can retry the tenant.
    pub async fn run_daily(
        &self,
        tenant_id: &str,
        day: NaiveDate,
    ) -> BudgetResult<DailyRunOutcome> {
        let budgets = self.evaluator.evaluate(tenant_id, day).await?;
        let anomalies = self.detector.detect_daily(tenant_id, day).await?;
        info!(
            tenant_id,
            %day,
            fired = budgets.fired.len(),
            anomalies = anomalies.len(),
            "daily run complete"
        );
        Ok(DailyRunOutcome { budgets, anomalies })
    }
}
