//! Rolling-baseline anomaly detection over per-dimension daily series.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::stats;
use crate::store::{StoreResult, UsageSeriesReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Bucket by z-score: >= 4 high, >= 2.5 medium, else low.
    fn from_z(z: f64) -> Self {
        if z >= 4.0 {
            Self::High
        } else if z >= 2.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Which rule flagged the day. When both trigger, the statistical rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    ZScore,
    Jump,
}

/// One flagged day of one dimension's series. Produced fresh on every run;
/// overlapping lookback windows may re-report a day on a later run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub tenant_id: String,
    pub dimension: String,
    pub detected_at: DateTime<Utc>,
    pub day: NaiveDate,
    /// Baseline mean of the trailing window.
    pub expected: Decimal,
    pub actual: Decimal,
    pub baseline_sd: Decimal,
    pub z_score: f64,
    /// Day-over-day change against the previous observation, in percent.
    pub jump_pct: f64,
    pub severity: Severity,
    pub method: DetectionMethod,
}

/// Detection tunables. Defaults match the production rules: a 7-point
/// trailing baseline needing at least 3 observations, z cutoff 2.0, and a
/// jump rule of +80% day-over-day with an absolute delta above 500.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub baseline_window: usize,
    pub min_baseline: usize,
    pub z_cutoff: f64,
    pub jump_ratio: f64,
    pub jump_abs: Decimal,
    /// Lookback for `detect_daily`, in days including the target day.
    pub daily_window: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            baseline_window: 7,
            min_baseline: 3,
            z_cutoff: 2.0,
            jump_ratio: 0.8,
            jump_abs: dec!(500),
            daily_window: 14,
        }
    }
}

impl DetectorConfig {
    pub fn with_z_cutoff(mut self, z_cutoff: f64) -> Self {
        self.z_cutoff = z_cutoff;
        self
    }

    pub fn with_daily_window(mut self, days: u32) -> Self {
        self.daily_window = days.max(1);
        self
    }
}

/// Flags statistically significant deviations and large absolute
/// day-over-day jumps in each dimension's daily cost series.
pub struct AnomalyDetector {
    usage: Arc<dyn UsageSeriesReader>,
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(usage: Arc<dyn UsageSeriesReader>) -> Self {
        Self {
            usage,
            config: DetectorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DetectorConfig) -> Self {
        self.config = config;
        self
    }

    /// Detect anomalies over `[from, to]` (inclusive) using the configured
    /// z cutoff. Most recent day first.
    pub async fn detect(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<Anomaly>> {
        self.detect_with_cutoff(tenant_id, from, to, self.config.z_cutoff)
            .await
    }

    /// Detect anomalies over `[from, to]` with an explicit z cutoff.
    pub async fn detect_with_cutoff(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        z_cutoff: f64,
    ) -> StoreResult<Vec<Anomaly>> {
        let rows = self.usage.read_daily_cost(tenant_id, from, to, None).await?;

        let mut by_dimension: BTreeMap<String, Vec<(NaiveDate, Decimal)>> = BTreeMap::new();
        for row in rows {
            by_dimension
                .entry(row.dimension)
                .or_default()
                .push((row.day, row.cost));
        }

        let mut anomalies = Vec::new();
        for (dimension, mut series) in by_dimension {
            series.sort_by_key(|(day, _)| *day);
            self.scan_series(tenant_id, &dimension, &series, z_cutoff, &mut anomalies);
        }

        anomalies.sort_by(|a, b| b.day.cmp(&a.day));
        info!(
            tenant_id,
            %from,
            %to,
            found = anomalies.len(),
            "anomaly detection complete"
        );
        Ok(anomalies)
    }

    /// Convenience for once-per-day callers: looks back over the configured
    /// window ending at `day` and returns only that day's anomalies.
    pub async fn detect_daily(&self, tenant_id: &str, day: NaiveDate) -> StoreResult<Vec<Anomaly>> {
        let from = day
            .checked_sub_days(Days::new(u64::from(self.config.daily_window.max(1) - 1)))
            .unwrap_or(day);
        let mut anomalies = self
            .detect_with_cutoff(tenant_id, from, day, self.config.z_cutoff)
            .await?;
        anomalies.retain(|a| a.day == day);
        Ok(anomalies)
    }

    fn scan_series(
        &self,
        tenant_id: &str,
        dimension: &str,
        series: &[(NaiveDate, Decimal)],
        z_cutoff: f64,
        anomalies: &mut Vec<Anomaly>,
    ) {
        for i in 0..series.len() {
            let window = &series[i.saturating_sub(self.config.baseline_window)..i];
            // A baseline needs enough prior observations to mean anything.
            if window.len() < self.config.min_baseline {
                continue;
            }

            let baseline: Vec<f64> = window
                .iter()
                .map(|(_, cost)| cost.to_f64().unwrap_or(0.0))
                .collect();
            let mean = stats::mean(&baseline);
            let sd = stats::population_stdev(&baseline);

            let (day, cost) = series[i];
            let actual = cost.to_f64().unwrap_or(0.0);
            let z = if sd > 0.0 { (actual - mean) / sd } else { 0.0 };

            // Day-over-day jump against the previous observation.
            let prev_cost = (i > 0).then(|| series[i - 1].1);
            let jump = match prev_cost {
                Some(prev) if prev > Decimal::ZERO => {
                    let prev = prev.to_f64().unwrap_or(0.0);
                    (actual - prev) / prev
                }
                _ => 0.0,
            };

            let z_hit = z >= z_cutoff;
            let jump_hit = jump >= self.config.jump_ratio
                && prev_cost.is_some_and(|prev| cost - prev > self.config.jump_abs);
            if !z_hit && !jump_hit {
                continue;
            }

            debug!(
                tenant_id,
                dimension,
                %day,
                z = stats::round_dp(z, 2),
                jump_pct = stats::round_dp(jump * 100.0, 1),
                "anomalous day"
            );
            anomalies.push(Anomaly {
                tenant_id: tenant_id.to_string(),
                dimension: dimension.to_string(),
                detected_at: Utc::now(),
                day,
                expected: stats::to_money(mean),
                actual: cost,
                baseline_sd: stats::to_money(sd),
                z_score: stats::round_dp(z, 2),
                jump_pct: stats::round_dp(jump * 100.0, 1),
                severity: Severity::from_z(z),
                method: if z_hit {
                    DetectionMethod::ZScore
                } else {
                    DetectionMethod::Jump
                },
            });
        }
    }
}
