//! Month-to-date budget evaluation with at-most-once threshold firing.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

use super::BudgetResult;
use crate::dispatch::{AlertDispatch, BudgetAlert};
use crate::store::{BudgetEventStore, BudgetStore, StoreError, UsageSeriesReader};
use crate::types::{Budget, BudgetEvent, UsagePoint};

/// First day of the calendar month containing `day`.
pub fn month_start(day: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(day.year(), day.month(), 1).unwrap_or(day)
}

/// First day of the following month (exclusive upper bound of the period).
pub fn next_month_start(day: NaiveDate) -> NaiveDate {
    let (year, month) = if day.month() == 12 {
        (day.year() + 1, 1)
    } else {
        (day.year(), day.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(day)
}

/// One budget's evaluation failure, carried without aborting the batch.
#[derive(Debug)]
pub struct BudgetFailure {
    pub budget_id: String,
    /// The threshold being recorded when the failure happened, if any.
    pub threshold: Option<u32>,
    pub error: StoreError,
}

/// Result of one `evaluate` call. Partial success is expected: some
/// thresholds may have fired while others failed to record.
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    /// Events newly created by this call, in firing order.
    pub fired: Vec<BudgetEvent>,
    pub failures: Vec<BudgetFailure>,
}

impl EvaluationOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Evaluates every active budget of a tenant against month-to-date spend.
///
/// Each threshold fires exactly once per (budget, period) regardless of how
/// many times `evaluate` runs; the event store's insert-if-absent is the
/// gate. Events are durably recorded before dispatch, never the reverse.
pub struct BudgetEvaluator {
    usage: Arc<dyn UsageSeriesReader>,
    budgets: Arc<dyn BudgetStore>,
    events: Arc<dyn BudgetEventStore>,
    dispatch: Arc<dyn AlertDispatch>,
}

impl BudgetEvaluator {
    pub fn new(
        usage: Arc<dyn UsageSeriesReader>,
        budgets: Arc<dyn BudgetStore>,
        events: Arc<dyn BudgetEventStore>,
        dispatch: Arc<dyn AlertDispatch>,
    ) -> Self {
        Self {
            usage,
            budgets,
            events,
            dispatch,
        }
    }

    /// Evaluate all active budgets of `tenant_id` for the calendar month
    /// containing `as_of`, returning newly fired events.
    pub async fn evaluate(
        &self,
        tenant_id: &str,
        as_of: NaiveDate,
    ) -> BudgetResult<EvaluationOutcome> {
        let period_start = month_start(as_of);
        let period_end = next_month_start(as_of);
        let last_day = period_end.pred_opt().unwrap_or(period_start);

        let budgets = self.budgets.read_active_budgets(tenant_id).await?;
        let mut outcome = EvaluationOutcome::default();
        if budgets.is_empty() {
            return Ok(outcome);
        }

        let usage = self
            .usage
            .read_daily_cost(tenant_id, period_start, last_day, None)
            .await?;

        for budget in &budgets {
            self.evaluate_budget(tenant_id, budget, period_start, &usage, &mut outcome)
                .await;
        }

        info!(
            tenant_id,
            budgets = budgets.len(),
            fired = outcome.fired.len(),
            failures = outcome.failures.len(),
            %period_start,
            "budget evaluation complete"
        );
        Ok(outcome)
    }

    async fn evaluate_budget(
        &self,
        tenant_id: &str,
        budget: &Budget,
        period_start: NaiveDate,
        usage: &[UsagePoint],
        outcome: &mut EvaluationOutcome,
    ) {
        let spend: Decimal = usage
            .iter()
            .filter(|p| budget.scope.matches(p))
            .map(|p| p.cost)
            .sum();

        // Floor semantics: 999.99 of 1000 is 99%, not 100%.
        let pct: i64 = if budget.monthly_limit > Decimal::ZERO {
            ((spend * dec!(100)) / budget.monthly_limit)
                .floor()
                .to_i64()
                .unwrap_or(0)
        } else {
            0
        };

        debug!(
            tenant_id,
            budget = %budget.name,
            %spend,
            limit = %budget.monthly_limit,
            pct,
            "budget month-to-date"
        );

        // Ascending order, so lower thresholds record before higher ones.
        let mut thresholds = budget.thresholds.clone();
        thresholds.sort_unstable();
        thresholds.dedup();

        for threshold in thresholds {
            if pct < i64::from(threshold) {
                break;
            }

            let event = BudgetEvent::new(tenant_id, &budget.id, period_start, threshold);
            match self.events.create_if_absent(event.clone()).await {
                Ok(true) => {
                    let alert = BudgetAlert {
                        budget_id: budget.id.clone(),
                        budget_name: budget.name.clone(),
                        spend,
                        limit: budget.monthly_limit,
                        pct,
                        threshold,
                        period_start,
                        currency: budget.currency.clone(),
                    };
                    // The event is already durable; a delivery failure is
                    // logged and swallowed, redelivery is out of scope.
                    if let Err(error) = self.dispatch.budget_alert(tenant_id, &alert).await {
                        warn!(
                            tenant_id,
                            budget = %budget.name,
                            threshold,
                            %error,
                            "budget alert dispatch failed"
                        );
                    }
                    outcome.fired.push(event);
                }
                Ok(false) => {
                    // Already fired this period (or a concurrent evaluator
                    // won the insert). Expected, not an error.
                }
                Err(error) => {
                    outcome.failures.push(BudgetFailure {
                        budget_id: budget.id.clone(),
                        threshold: Some(threshold),
                        error,
                    });
                }
            }
        }
    }
}
