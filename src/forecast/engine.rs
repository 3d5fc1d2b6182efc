//! Seasonal EWMA forecast with residual-based confidence bands.
//!
//! One model: weekly multipliers normalized to mean 1.0, a single
//! exponential smoothing level over the de-seasonalized series, and bands
//! sized from one-step-ahead residuals.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::stats;
use crate::store::{StoreResult, UsageSeriesReader};
use crate::types::DayCost;

/// Normal quantile for the 80% band.
const Z_80: f64 = 1.2816;
/// Normal quantile for the 95% band.
const Z_95: f64 = 1.96;
/// Residual stdev is floored at this fraction of the mean historical cost,
/// so short or flat histories still get non-degenerate bands.
const RESIDUAL_FLOOR_FRACTION: f64 = 0.05;

/// One forecast day. Monetary values are rounded to 2 decimal places and
/// floored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub day: NaiveDate,
    pub predicted: Decimal,
    pub lower_80: Decimal,
    pub upper_80: Decimal,
    pub lower_95: Decimal,
    pub upper_95: Decimal,
}

/// Forecast output: the fitted weekly multipliers, the history the model
/// saw, and the forward predictions. Transient, never persisted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSeries {
    pub alpha: f64,
    pub horizon: u32,
    /// Per-weekday multipliers, Sunday first; their mean is 1.0.
    pub seasonal: [f64; 7],
    pub history: Vec<DayCost>,
    pub forecast: Vec<ForecastPoint>,
}

impl ForecastSeries {
    /// True when there was no history: every prediction is zero and must
    /// be read as "insufficient data", not a genuine zero-spend forecast.
    pub fn is_degenerate(&self) -> bool {
        self.history.is_empty()
    }
}

fn weekday_index(day: NaiveDate) -> usize {
    day.weekday().num_days_from_sunday() as usize
}

/// Forecast `horizon` days past `base_date` from an ordered daily history.
///
/// `alpha` is the smoothing factor in (0, 1); history must be ascending by
/// day with at most one point per day. Empty history yields all-1.0
/// seasonality and zero predictions with zero-width bands.
pub fn forecast(
    history: &[DayCost],
    alpha: f64,
    horizon: u32,
    base_date: NaiveDate,
) -> ForecastSeries {
    if history.is_empty() {
        let forecast = (1..=horizon)
            .filter_map(|i| base_date.checked_add_days(Days::new(u64::from(i))))
            .map(|day| ForecastPoint {
                day,
                predicted: Decimal::ZERO,
                lower_80: Decimal::ZERO,
                upper_80: Decimal::ZERO,
                lower_95: Decimal::ZERO,
                upper_95: Decimal::ZERO,
            })
            .collect();
        return ForecastSeries {
            alpha,
            horizon,
            seasonal: [1.0; 7],
            history: Vec::new(),
            forecast,
        };
    }

    let costs: Vec<f64> = history
        .iter()
        .map(|p| p.cost.to_f64().unwrap_or(0.0))
        .collect();
    let global_avg = stats::mean(&costs);

    let seasonal = weekly_seasonality(history, &costs, global_avg);

    // EWMA over the de-seasonalized series, collecting one-step-ahead
    // residuals under the pre-update level.
    let first_factor = seasonal[weekday_index(history[0].day)];
    let mut level = if first_factor > 0.0 {
        costs[0] / first_factor
    } else {
        costs[0]
    };
    let mut residuals = Vec::with_capacity(history.len());
    for (point, &actual) in history.iter().zip(&costs) {
        let factor = seasonal[weekday_index(point.day)];
        residuals.push(actual - level * factor);
        let deseasonalized = if factor > 0.0 { actual / factor } else { actual };
        level = alpha * deseasonalized + (1.0 - alpha) * level;
    }

    let residual_sd = stats::sample_stdev(&residuals).max(RESIDUAL_FLOOR_FRACTION * global_avg);

    let forecast = (1..=horizon)
        .filter_map(|i| base_date.checked_add_days(Days::new(u64::from(i))))
        .map(|day| {
            let predicted = level * seasonal[weekday_index(day)];
            ForecastPoint {
                day,
                predicted: stats::to_money_floored(predicted),
                lower_80: stats::to_money_floored(predicted - Z_80 * residual_sd),
                upper_80: stats::to_money_floored(predicted + Z_80 * residual_sd),
                lower_95: stats::to_money_floored(predicted - Z_95 * residual_sd),
                upper_95: stats::to_money_floored(predicted + Z_95 * residual_sd),
            }
        })
        .collect();

    ForecastSeries {
        alpha,
        horizon,
        seasonal,
        history: history.to_vec(),
        forecast,
    }
}

/// Per-weekday means normalized against the global mean, then re-normalized
/// so the seven multipliers themselves average exactly 1.0. Weekdays with
/// no observations get factor 1.0.
fn weekly_seasonality(history: &[DayCost], costs: &[f64], global_avg: f64) -> [f64; 7] {
    let mut sums = [0.0f64; 7];
    let mut counts = [0usize; 7];
    for (point, &cost) in history.iter().zip(costs) {
        let dow = weekday_index(point.day);
        sums[dow] += cost;
        counts[dow] += 1;
    }

    let mut seasonal = [1.0f64; 7];
    if global_avg > 0.0 {
        for dow in 0..7 {
            if counts[dow] > 0 {
                seasonal[dow] = (sums[dow] / counts[dow] as f64) / global_avg;
            }
        }
    }

    let factor_mean = stats::mean(&seasonal);
    if factor_mean > 0.0 {
        for factor in &mut seasonal {
            *factor /= factor_mean;
        }
    }
    seasonal
}

/// One dimension's series in the multi-series output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSeries {
    pub dimension: String,
    pub history: Vec<DayCost>,
    pub forecast: Vec<ForecastPoint>,
}

/// Aggregate of per-dimension predictions for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalPoint {
    pub day: NaiveDate,
    pub total_predicted: Decimal,
}

/// Output of the per-dimension multi-series mode: independent single-series
/// forecasts for the top dimensions plus their per-day sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionForecasts {
    pub alpha: f64,
    pub horizon: u32,
    /// Dimensions ranked by recent spend, highest first.
    pub dimensions: Vec<String>,
    pub series: Vec<DimensionSeries>,
    pub totals: Vec<TotalPoint>,
}

/// Forecast tunables. Alpha is clamped into [0.01, 0.99] and the horizon
/// into [1, 90] at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub alpha: f64,
    pub horizon: u32,
    /// History pulled for model fitting.
    pub lookback_days: u32,
    /// Window used to rank dimensions by recent spend.
    pub rank_window_days: u32,
    /// How many top dimensions the multi-series mode covers.
    pub top_dimensions: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            horizon: 30,
            lookback_days: 180,
            rank_window_days: 30,
            top_dimensions: 5,
        }
    }
}

impl ForecastConfig {
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days.max(1);
        self
    }

    pub fn with_top_dimensions(mut self, n: usize) -> Self {
        self.top_dimensions = n;
        self
    }

    fn clamped_alpha(&self) -> f64 {
        self.alpha.clamp(0.01, 0.99)
    }

    fn clamped_horizon(&self) -> u32 {
        self.horizon.clamp(1, 90)
    }
}

/// Reader-backed wrapper resolving history before running the model.
pub struct ForecastEngine {
    usage: Arc<dyn UsageSeriesReader>,
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(usage: Arc<dyn UsageSeriesReader>) -> Self {
        Self {
            usage,
            config: ForecastConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ForecastConfig) -> Self {
        self.config = config;
        self
    }

    /// Forecast total tenant spend (or one dimension's spend) from history
    /// ending at `as_of`. Predictions start the day after the last
    /// observation, or after `as_of` when there is no history.
    pub async fn forecast_tenant(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
        dimension: Option<&str>,
    ) -> StoreResult<ForecastSeries> {
        let from = self.lookback_start(as_of);
        let rows = self
            .usage
            .read_daily_cost(tenant_id, from, as_of, dimension)
            .await?;

        // Sum across dimensions into one daily series.
        let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for row in rows {
            *per_day.entry(row.day).or_default() += row.cost;
        }
        let history: Vec<DayCost> = per_day
            .into_iter()
            .map(|(day, cost)| DayCost::new(day, cost))
            .collect();

        let base_date = history.last().map_or(as_of, |p| p.day);
        let series = forecast(
            &history,
            self.config.clamped_alpha(),
            self.config.clamped_horizon(),
            base_date,
        );
        info!(
            tenant_id,
            dimension = dimension.unwrap_or("*"),
            history_days = series.history.len(),
            horizon = series.horizon,
            "forecast computed"
        );
        Ok(series)
    }

    /// Run the single-series model independently for each of the top-N
    /// dimensions by recent spend and sum their per-day predictions.
    pub async fn forecast_by_dimension(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
    ) -> StoreResult<DimensionForecasts> {
        let alpha = self.config.clamped_alpha();
        let horizon = self.config.clamped_horizon();
        let dimensions = self.rank_dimensions(tenant_id, as_of).await?;

        let from = self.lookback_start(as_of);
        let mut series = Vec::with_capacity(dimensions.len());
        let mut last_observed: Option<NaiveDate> = None;
        let mut histories = Vec::with_capacity(dimensions.len());
        for dimension in &dimensions {
            let rows = self
                .usage
                .read_daily_cost(tenant_id, from, as_of, Some(dimension))
                .await?;
            let history: Vec<DayCost> = rows
                .into_iter()
                .map(|row| DayCost::new(row.day, row.cost))
                .collect();
            if let Some(last) = history.last() {
                last_observed = Some(last_observed.map_or(last.day, |d| d.max(last.day)));
            }
            histories.push(history);
        }

        // One shared base day keeps the per-dimension forecasts aligned so
        // the totals table can sum them.
        let base_date = last_observed.unwrap_or(as_of);
        let mut totals: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for (dimension, history) in dimensions.iter().zip(histories) {
            let fc = forecast(&history, alpha, horizon, base_date);
            for point in &fc.forecast {
                *totals.entry(point.day).or_default() += point.predicted;
            }
            series.push(DimensionSeries {
                dimension: dimension.clone(),
                history: fc.history,
                forecast: fc.forecast,
            });
        }

        Ok(DimensionForecasts {
            alpha,
            horizon,
            dimensions,
            series,
            totals: totals
                .into_iter()
                .map(|(day, total_predicted)| TotalPoint {
                    day,
                    total_predicted,
                })
                .collect(),
        })
    }

    fn lookback_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of
            .checked_sub_days(Days::new(u64::from(self.config.lookback_days.max(1) - 1)))
            .unwrap_or(as_of)
    }

    /// Dimensions ordered by spend over the ranking window, highest first,
    /// truncated to the configured top-N. Name breaks ties.
    async fn rank_dimensions(&self, tenant_id: &str, as_of: NaiveDate) -> StoreResult<Vec<String>> {
        let from = as_of
            .checked_sub_days(Days::new(u64::from(self.config.rank_window_days.max(1) - 1)))
            .unwrap_or(as_of);
        let rows = self
            .usage
            .read_daily_cost(tenant_id, from, as_of, None)
            .await?;

        let mut spend: BTreeMap<String, Decimal> = BTreeMap::new();
        for row in rows {
            *spend.entry(row.dimension).or_default() += row.cost;
        }
        let mut ranked: Vec<(String, Decimal)> = spend.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.config.top_dimensions);
        Ok(ranked.into_iter().map(|(dimension, _)| dimension).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::store::MemoryStore;
    use crate::types::UsagePoint;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn history_from(start: &str, costs: &[i64]) -> Vec<DayCost> {
        let start = day(start);
        costs
            .iter()
            .enumerate()
            .map(|(i, c)| {
                DayCost::new(
                    start.checked_add_days(Days::new(i as u64)).unwrap(),
                    Decimal::from(*c),
                )
            })
            .collect()
    }

    /// 14 days starting on a Sunday: 1000 on weekdays, 200 on weekends.
    fn weekday_weekend_history() -> Vec<DayCost> {
        // 2025-03-02 is a Sunday.
        let costs: Vec<i64> = (0..14)
            .map(|i| if i % 7 == 0 || i % 7 == 6 { 200 } else { 1000 })
            .collect();
        history_from("2025-03-02", &costs)
    }

    #[test]
    fn test_empty_history_degenerate() {
        let series = forecast(&[], 0.3, 7, day("2025-03-15"));

        assert!(series.is_degenerate());
        assert_eq!(series.seasonal, [1.0; 7]);
        assert_eq!(series.forecast.len(), 7);
        for point in &series.forecast {
            assert_eq!(point.predicted, Decimal::ZERO);
            assert_eq!(point.lower_95, Decimal::ZERO);
            assert_eq!(point.upper_95, Decimal::ZERO);
        }
    }

    #[test]
    fn test_seasonal_mean_is_one() {
        let series = forecast(&weekday_weekend_history(), 0.3, 7, day("2025-03-15"));
        let mean: f64 = series.seasonal.iter().sum::<f64>() / 7.0;
        assert!((mean - 1.0).abs() < 1e-9);

        // Uneven, gappy history still normalizes.
        let series = forecast(&history_from("2025-03-03", &[5, 900, 17]), 0.5, 3, day("2025-03-06"));
        let mean: f64 = series.seasonal.iter().sum::<f64>() / 7.0;
        assert!((mean - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_history_predicts_flat() {
        let history = history_from("2025-03-01", &[500; 21]);
        let series = forecast(&history, 0.3, 7, day("2025-03-21"));

        for point in &series.forecast {
            assert_eq!(point.predicted, dec!(500.00));
        }
        // Residuals are all zero, so bands come from the 5% floor.
        let point = &series.forecast[0];
        assert_eq!(point.lower_80, dec!(467.96)); // 500 - 1.2816 * 25
        assert_eq!(point.upper_80, dec!(532.04));
        assert_eq!(point.lower_95, dec!(451.00)); // 500 - 1.96 * 25
        assert_eq!(point.upper_95, dec!(549.00));
    }

    #[test]
    fn test_band_ordering() {
        let series = forecast(&weekday_weekend_history(), 0.3, 14, day("2025-03-15"));
        assert_eq!(series.forecast.len(), 14);
        for p in &series.forecast {
            assert!(p.lower_95 <= p.lower_80);
            assert!(p.lower_80 <= p.predicted);
            assert!(p.predicted <= p.upper_80);
            assert!(p.upper_80 <= p.upper_95);
        }
    }

    #[test]
    fn test_weekly_pattern_forecast() {
        let history = weekday_weekend_history();
        let series = forecast(&history, 0.3, 7, day("2025-03-15"));

        // Weekday multipliers above 1, weekend below.
        for dow in 1..=5 {
            assert!(series.seasonal[dow] > 1.0, "weekday {dow} multiplier");
        }
        assert!(series.seasonal[0] < 1.0);
        assert!(series.seasonal[6] < 1.0);

        // Forecast starts Sunday 2025-03-16 and alternates low/high.
        for point in &series.forecast {
            let dow = point.day.weekday().num_days_from_sunday();
            if dow == 0 || dow == 6 {
                assert!(point.predicted < dec!(300), "weekend {}", point.day);
            } else {
                assert!(point.predicted > dec!(900), "weekday {}", point.day);
            }
        }
    }

    #[test]
    fn test_bounds_floored_at_zero() {
        // Tiny volatile costs push lower bounds negative before flooring.
        let history = history_from("2025-03-01", &[1, 30, 2, 25, 1, 28, 2]);
        let series = forecast(&history, 0.5, 7, day("2025-03-07"));
        for p in &series.forecast {
            assert!(p.lower_95 >= Decimal::ZERO);
            assert!(p.lower_80 >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_forecast_days_follow_base_date() {
        let series = forecast(&history_from("2025-03-01", &[100; 5]), 0.3, 3, day("2025-03-05"));
        let days: Vec<NaiveDate> = series.forecast.iter().map(|p| p.day).collect();
        assert_eq!(
            days,
            vec![day("2025-03-06"), day("2025-03-07"), day("2025-03-08")]
        );
    }

    fn seed_dimension(store: &MemoryStore, dimension: &str, start: &str, costs: &[i64]) {
        let start = day(start);
        for (i, cost) in costs.iter().enumerate() {
            let d = start.checked_add_days(Days::new(i as u64)).unwrap();
            store.insert_usage(UsagePoint::new("t1", d, dimension, Decimal::from(*cost)));
        }
    }

    #[tokio::test]
    async fn test_engine_aggregates_dimensions() {
        let store = Arc::new(MemoryStore::new());
        seed_dimension(&store, "EC2", "2025-03-01", &[100; 7]);
        seed_dimension(&store, "S3", "2025-03-01", &[50; 7]);

        let engine = ForecastEngine::new(store)
            .with_config(ForecastConfig::default().with_alpha(0.3).with_horizon(3));
        let series = engine.forecast_tenant("t1", day("2025-03-07"), None).await.unwrap();

        assert_eq!(series.history.len(), 7);
        assert_eq!(series.history[0].cost, dec!(150));
        // Flat 150/day total keeps predicting 150.
        assert_eq!(series.forecast[0].predicted, dec!(150.00));
        // Predictions start after the last observed day.
        assert_eq!(series.forecast[0].day, day("2025-03-08"));
    }

    #[tokio::test]
    async fn test_engine_dimension_filter() {
        let store = Arc::new(MemoryStore::new());
        seed_dimension(&store, "EC2", "2025-03-01", &[100; 7]);
        seed_dimension(&store, "S3", "2025-03-01", &[50; 7]);

        let engine = ForecastEngine::new(store);
        let series = engine
            .forecast_tenant("t1", day("2025-03-07"), Some("S3"))
            .await
            .unwrap();
        assert_eq!(series.history[0].cost, dec!(50));
    }

    #[tokio::test]
    async fn test_engine_empty_tenant_degenerate() {
        let store = Arc::new(MemoryStore::new());
        let engine = ForecastEngine::new(store)
            .with_config(ForecastConfig::default().with_horizon(5));
        let series = engine.forecast_tenant("t1", day("2025-03-07"), None).await.unwrap();

        assert!(series.is_degenerate());
        assert_eq!(series.forecast.len(), 5);
        assert_eq!(series.forecast[0].day, day("2025-03-08"));
        assert_eq!(series.forecast[0].predicted, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_alpha_and_horizon_clamped() {
        let store = Arc::new(MemoryStore::new());
        seed_dimension(&store, "EC2", "2025-03-01", &[100; 7]);

        let engine = ForecastEngine::new(store).with_config(
            ForecastConfig::default().with_alpha(7.5).with_horizon(1000),
        );
        let series = engine.forecast_tenant("t1", day("2025-03-07"), None).await.unwrap();
        assert_eq!(series.alpha, 0.99);
        assert_eq!(series.horizon, 90);
        assert_eq!(series.forecast.len(), 90);
    }

    #[tokio::test]
    async fn test_multi_series_ranks_and_sums() {
        let store = Arc::new(MemoryStore::new());
        seed_dimension(&store, "EC2", "2025-03-01", &[300; 7]);
        seed_dimension(&store, "S3", "2025-03-01", &[100; 7]);
        seed_dimension(&store, "Lambda", "2025-03-01", &[10; 7]);

        let engine = ForecastEngine::new(store).with_config(
            ForecastConfig::default()
                .with_alpha(0.3)
                .with_horizon(3)
                .with_top_dimensions(2),
        );
        let result = engine.forecast_by_dimension("t1", day("2025-03-07")).await.unwrap();

        // Lambda is out-ranked; EC2 leads.
        assert_eq!(result.dimensions, vec!["EC2".to_string(), "S3".to_string()]);
        assert_eq!(result.series.len(), 2);
        assert_eq!(result.totals.len(), 3);

        // Flat series: totals are the sum of the two flat predictions.
        for total in &result.totals {
            assert_eq!(total.total_predicted, dec!(400.00));
        }
        assert_eq!(result.totals[0].day, day("2025-03-08"));
    }

    #[tokio::test]
    async fn test_multi_series_empty_tenant() {
        let store = Arc::new(MemoryStore::new());
        let engine = ForecastEngine::new(store);
        let result = engine.forecast_by_dimension("t1", day("2025-03-07")).await.unwrap();

        assert!(result.dimensions.is_empty());
        assert!(result.series.is_empty());
        assert!(result.totals.is_empty());
    }
}
