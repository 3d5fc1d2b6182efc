//! Daily spend anomaly detection.

mod detector;

pub use detector::{
    Anomaly, AnomalyDetector, DetectionMethod, DetectorConfig, Severity,
};
