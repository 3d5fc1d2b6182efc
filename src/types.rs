//! Shared data model for the cost analytics core.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Default alert thresholds applied when a budget is created without any.
pub const DEFAULT_THRESHOLDS: [u32; 3] = [70, 90, 100];

/// One aggregated daily cost row.
///
/// Immutable once written; at most one row exists per
/// (tenant, day, dimension), so callers pre-aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub tenant_id: String,
    pub day: NaiveDate,
    /// Categorical facet of cost, e.g. a cloud service name.
    pub dimension: String,
    pub cost: Decimal,
    pub currency: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl UsagePoint {
    pub fn new(
        tenant_id: impl Into<String>,
        day: NaiveDate,
        dimension: impl Into<String>,
        cost: Decimal,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            day,
            dimension: dimension.into(),
            cost,
            currency: "USD".to_string(),
            tags: HashMap::new(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// A single point of an aggregated daily series (summed across dimensions
/// or restricted to one).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayCost {
    pub day: NaiveDate,
    pub cost: Decimal,
}

impl DayCost {
    pub fn new(day: NaiveDate, cost: Decimal) -> Self {
        Self { day, cost }
    }
}

/// Filter narrowing which usage rows count toward a budget.
///
/// An empty filter matches every row. A dimension constraint matches rows
/// with that exact dimension; every tag pair must be present verbatim in
/// the row's tag set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}

impl ScopeFilter {
    /// Matches everything.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn dimension(value: impl Into<String>) -> Self {
        Self {
            dimension: Some(value.into()),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.dimension.is_none() && self.tags.is_empty()
    }

    pub fn matches(&self, point: &UsagePoint) -> bool {
        if let Some(dim) = &self.dimension {
            if point.dimension != *dim {
                return false;
            }
        }
        self.tags
            .iter()
            .all(|(k, v)| point.tags.get(k) == Some(v))
    }
}

/// A monthly spend budget owned by the admin surface; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub scope: ScopeFilter,
    /// Zero disables evaluation for this budget.
    pub monthly_limit: Decimal,
    /// Percentages, deduplicated and ascending.
    pub thresholds: Vec<u32>,
    pub currency: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        monthly_limit: Decimal,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            scope: ScopeFilter::any(),
            monthly_limit,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            currency: "USD".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_scope(mut self, scope: ScopeFilter) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Vec<u32>) -> Self {
        self.thresholds = thresholds;
        self.normalize_thresholds();
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Sorted-ascending, deduplicated threshold list. Evaluation relies on
    /// this ordering.
    pub fn normalize_thresholds(&mut self) {
        self.thresholds.sort_unstable();
        self.thresholds.dedup();
    }
}

/// Record of a threshold crossing. At most one exists per
/// (budget_id, period_start, threshold); this is the idempotency invariant
/// that prevents duplicate alerts within a billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetEvent {
    pub tenant_id: String,
    pub budget_id: String,
    /// First day of the calendar month being evaluated.
    pub period_start: NaiveDate,
    pub threshold: u32,
    pub fired_at: DateTime<Utc>,
}

impl BudgetEvent {
    pub fn new(
        tenant_id: impl Into<String>,
        budget_id: impl Into<String>,
        period_start: NaiveDate,
        threshold: u32,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            budget_id: budget_id.into(),
            period_start,
            threshold,
            fired_at: Utc::now(),
        }
    }
}
