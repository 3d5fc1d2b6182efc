//! Budget threshold evaluation.

mod evaluator;

use thiserror::Error;

use crate::store::StoreError;

pub use evaluator::{
    BudgetEvaluator, BudgetFailure, EvaluationOutcome, month_start, next_month_start,
};

#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

pub type BudgetResult<T> = std::result::Result<T, BudgetError>;
