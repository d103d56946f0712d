//! Seasonal-baseline anomaly detection over operational metrics: BGP
//! session flaps, CPU temperature, and interface errors.

#![warn(missing_docs)]

pub mod detector;

pub use detector::{AnomalyDetector, SeasonalityMode};
