//! In-memory storage backend (for testing and single-instance deployments).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{BudgetEventStore, BudgetStore, StoreResult, UsageSeriesReader};
use crate::types::{Budget, BudgetEvent, UsagePoint};

/// All three storage seams over concurrent keyed maps.
///
/// Usage rows are keyed by (day, dimension) per tenant, so re-inserting a
/// row replaces it and the one-aggregated-row-per-key invariant holds by
/// construction. The event map's entry API provides the atomic
/// insert-if-absent the evaluator's idempotency depends on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    usage: DashMap<String, BTreeMap<(NaiveDate, String), UsagePoint>>,
    budgets: DashMap<String, Budget>,
    events: DashMap<(String, NaiveDate, u32), BudgetEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one aggregated usage row.
    pub fn insert_usage(&self, point: UsagePoint) {
        self.usage
            .entry(point.tenant_id.clone())
            .or_default()
            .insert((point.day, point.dimension.clone()), point);
    }

    /// Insert or replace a budget definition.
    pub fn upsert_budget(&self, budget: Budget) {
        self.budgets.insert(budget.id.clone(), budget);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> Vec<BudgetEvent> {
        self.events.iter().map(|e| e.value().clone()).collect()
    }

    pub fn clear(&self) {
        self.usage.clear();
        self.budgets.clear();
        self.events.clear();
    }
}

#[async_trait]
impl UsageSeriesReader for MemoryStore {
    async fn read_daily_cost(
        &self,
        tenant_id: &str,
        from: NaiveDate,
        to: NaiveDate,
        dimension: Option<&str>,
    ) -> StoreResult<Vec<UsagePoint>> {
        let Some(rows) = self.usage.get(tenant_id) else {
            return Ok(Vec::new());
        };
        // BTreeMap keys are (day, dimension), so iteration is already
        // ascending by day.
        let points = rows
            .values()
            .filter(|p| p.day >= from && p.day <= to)
            .filter(|p| dimension.is_none_or(|d| p.dimension == d))
            .cloned()
            .collect();
        Ok(points)
    }
}

#[async_trait]
impl BudgetStore for MemoryStore {
    async fn read_active_budgets(&self, tenant_id: &str) -> StoreResult<Vec<Budget>> {
        let mut budgets: Vec<Budget> = self
            .budgets
            .iter()
            .filter(|b| b.tenant_id == tenant_id && b.active)
            .map(|b| b.value().clone())
            .collect();
        budgets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(budgets)
    }
}

#[async_trait]
impl BudgetEventStore for MemoryStore {
    async fn exists(
        &self,
        budget_id: &str,
        period_start: NaiveDate,
        threshold: u32,
    ) -> StoreResult<bool> {
        Ok(self
            .events
            .contains_key(&(budget_id.to_string(), period_start, threshold)))
    }

    async fn create_if_absent(&self, event: BudgetEvent) -> StoreResult<bool> {
        let key = (event.budget_id.clone(), event.period_start, event.threshold);
        match self.events.entry(key) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(event);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_read_daily_cost_range_and_order() {
        let store = MemoryStore::new();
        store.insert_usage(UsagePoint::new("t1", day("2025-03-03"), "EC2", dec!(30)));
        store.insert_usage(UsagePoint::new("t1", day("2025-03-01"), "EC2", dec!(10)));
        store.insert_usage(UsagePoint::new("t1", day("2025-03-02"), "S3", dec!(20)));
        store.insert_usage(UsagePoint::new("t2", day("2025-03-01"), "EC2", dec!(99)));

        let rows = store
            .read_daily_cost("t1", day("2025-03-01"), day("2025-03-02"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].day, day("2025-03-01"));
        assert_eq!(rows[1].day, day("2025-03-02"));

        let ec2 = store
            .read_daily_cost("t1", day("2025-03-01"), day("2025-03-31"), Some("EC2"))
            .await
            .unwrap();
        assert_eq!(ec2.len(), 2);
        assert!(ec2.iter().all(|p| p.dimension == "EC2"));
    }

    #[tokio::test]
    async fn test_insert_usage_replaces_same_key() {
        let store = MemoryStore::new();
        store.insert_usage(UsagePoint::new("t1", day("2025-03-01"), "EC2", dec!(10)));
        store.insert_usage(UsagePoint::new("t1", day("2025-03-01"), "EC2", dec!(25)));

        let rows = store
            .read_daily_cost("t1", day("2025-03-01"), day("2025-03-01"), None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cost, dec!(25));
    }

    #[tokio::test]
    async fn test_read_unknown_tenant_is_empty_not_error() {
        let store = MemoryStore::new();
        let rows = store
            .read_daily_cost("nobody", day("2025-03-01"), day("2025-03-31"), None)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_active_budget_filtering() {
        let store = MemoryStore::new();
        store.upsert_budget(Budget::new("t1", "a", dec!(100)));
        store.upsert_budget(Budget::new("t1", "b", dec!(100)).inactive());
        store.upsert_budget(Budget::new("t2", "c", dec!(100)));

        let budgets = store.read_active_budgets("t1").await.unwrap();
        assert_eq!(budgets.len(), 1);
        assert_eq!(budgets[0].name, "a");
    }

    #[tokio::test]
    async fn test_create_if_absent_is_once() {
        let store = MemoryStore::new();
        let event = BudgetEvent::new("t1", "b1", day("2025-03-01"), 70);

        assert!(store.create_if_absent(event.clone()).await.unwrap());
        assert!(!store.create_if_absent(event).await.unwrap());
        assert_eq!(store.event_count(), 1);
        assert!(store.exists("b1", day("2025-03-01"), 70).await.unwrap());
        assert!(!store.exists("b1", day("2025-03-01"), 90).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_if_absent_concurrent() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let event = BudgetEvent::new("t1", "b1", day("2025-03-01"), 90);
                store.create_if_absent(event).await.unwrap()
            }));
        }

        let mut created = 0;
        for h in handles {
            if h.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.event_count(), 1);
    }
}
