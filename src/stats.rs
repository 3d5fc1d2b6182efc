//! Shared numeric helpers for the three engines.
//!
//! Statistics run in `f64`; monetary outputs convert back to [`Decimal`]
//! rounded to 2 decimal places.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n); 0.0 for an empty slice.
pub fn population_stdev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sample standard deviation (divides by n-1 when n > 1); 0.0 otherwise.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Round a float to `dp` decimal places.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    let k = 10f64.powi(dp as i32);
    (value * k).round() / k
}

/// Convert a computed amount to money: non-finite collapses to zero,
/// rounded to 2 decimal places.
pub fn to_money(value: f64) -> Decimal {
    Decimal::from_f64(if value.is_finite() { value } else { 0.0 })
        .unwrap_or_default()
        .round_dp(2)
}

/// Convert a computed amount to money, floored at zero. Costs cannot be
/// negative.
pub fn to_money_floored(value: f64) -> Decimal {
    to_money(value.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn test_population_stdev() {
        // [2, 4, 4, 4, 5, 5, 7, 9] has population stdev exactly 2
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_stdev(&xs) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_population_stdev_constant_series() {
        assert_eq!(population_stdev(&[100.0, 100.0, 100.0]), 0.0);
    }

    #[test]
    fn test_sample_stdev_needs_two_points() {
        assert_eq!(sample_stdev(&[]), 0.0);
        assert_eq!(sample_stdev(&[5.0]), 0.0);
    }

    #[test]
    fn test_sample_stdev() {
        // [1, 2, 3, 4] sample variance = 5/3
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!((sample_stdev(&xs) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_round_dp() {
        assert_eq!(round_dp(1.2345, 2), 1.23);
        assert_eq!(round_dp(2.678, 1), 2.7);
        assert_eq!(round_dp(-1.26, 1), -1.3);
    }

    #[test]
    fn test_to_money() {
        assert_eq!(to_money(12.346), dec!(12.35));
        assert_eq!(to_money(12.344), dec!(12.34));
        assert_eq!(to_money(f64::NAN), dec!(0));
        assert_eq!(to_money(f64::INFINITY), dec!(0));
    }

    #[test]
    fn test_to_money_floored() {
        assert_eq!(to_money_floored(-3.5), dec!(0));
        assert_eq!(to_money_floored(3.5), dec!(3.5));
    }
}
