//! Seasonally-adjusted spend forecasting.

mod engine;

pub use engine::{
    DimensionForecasts, DimensionSeries, ForecastConfig, ForecastEngine, ForecastPoint,
    ForecastSeries, TotalPoint, forecast,
};
