//! Seasonal baseline fitting and the rolling-window 3-σ anomaly rule.

use bgp_common::{Anomaly, AnomalyType, Severity};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::HashMap;

/// How the daily/weekly seasonal effects combine with the series mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Per-point predicted baseline with a 95% confidence band, standing in
/// for a fitted seasonal model.
struct Baseline {
    yhat: Vec<f64>,
    lo: Vec<f64>,
    hi: Vec<f64>,
}

/// Fits daily (hour-of-day) and weekly (day-of-week) seasonal effects by
/// simple group averaging against the series mean, then combines them
/// additively or multiplicatively per `mode`.
fn fit_seasonal_baseline(timestamps: &[DateTime<Utc>], values: &[f64], mode: SeasonalityMode) -> Baseline {
    let global_mean = mean(values);
    let global_std = std_dev(values, global_mean);

    let mut by_hour: HashMap<u32, Vec<f64>> = HashMap::new();
    let mut by_dow: HashMap<u32, Vec<f64>> = HashMap::new();
    for (ts, v) in timestamps.iter().zip(values) {
        by_hour.entry(ts.hour()).or_default().push(*v);
        by_dow.entry(ts.weekday().num_days_from_monday()).or_default().push(*v);
    }

    let hour_effect = |hour: u32| -> f64 {
        let bucket = by_hour.get(&hour).map(|v| mean(v)).unwrap_or(global_mean);
        match mode {
            SeasonalityMode::Additive => bucket - global_mean,
            SeasonalityMode::Multiplicative if global_mean != 0.0 => bucket / global_mean,
            SeasonalityMode::Multiplicative => 1.0,
        }
    };
    let dow_effect = |dow: u32| -> f64 {
        let bucket = by_dow.get(&dow).map(|v| mean(v)).unwrap_or(global_mean);
        match mode {
            SeasonalityMode::Additive => bucket - global_mean,
            SeasonalityMode::Multiplicative if global_mean != 0.0 => bucket / global_mean,
            SeasonalityMode::Multiplicative => 1.0,
        }
    };

    let mut yhat = Vec::with_capacity(values.len());
    for ts in timestamps {
        let h = hour_effect(ts.hour());
        let d = dow_effect(ts.weekday().num_days_from_monday());
        let predicted = match mode {
            SeasonalityMode::Additive => global_mean + h + d,
            SeasonalityMode::Multiplicative => global_mean * h * d,
        };
        yhat.push(predicted);
    }

    let band = 1.96 * global_std;
    let lo = yhat.iter().map(|y| y - band).collect();
    let hi = yhat.iter().map(|y| y + band).collect();
    Baseline { yhat, lo, hi }
}

/// Rolling mean/std of `residuals` over a window centered at each point,
/// falling back to the global mean/std wherever a full window isn't
/// available (the series edges).
fn rolling_residual_stats(residuals: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = residuals.len();
    let window = (30usize).min(n / 2).max(1);
    let before = window / 2;
    let after = window - before - 1;

    let global_mean = mean(residuals);
    let global_std = std_dev(residuals, global_mean);

    let mut means = Vec::with_capacity(n);
    let mut stds = Vec::with_capacity(n);
    for i in 0..n {
        let has_full_window = i >= before && i + after < n;
        if has_full_window {
            let slice = &residuals[i - before..=i + after];
            let local_mean = mean(slice);
            means.push(local_mean);
            stds.push(std_dev(slice, local_mean));
        } else {
            means.push(global_mean);
            stds.push(global_std);
        }
    }
    (means, stds)
}

fn classify_severity(sigma_ratio: f64, std: f64) -> Severity {
    if std == 0.0 {
        return Severity::Medium;
    }
    if sigma_ratio >= 5.0 {
        Severity::Critical
    } else if sigma_ratio >= 4.0 {
        Severity::High
    } else if sigma_ratio >= 3.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Fits a seasonal baseline to a metric's time series and flags points
/// whose residual exceeds the rolling 3-σ band. Detected anomalies are
/// kept in an in-memory store queryable by [`AnomalyDetector::recent`].
pub struct AnomalyDetector {
    sigma_threshold: f64,
    mode: SeasonalityMode,
    store: parking_lot::RwLock<Vec<Anomaly>>,
}

impl AnomalyDetector {
    /// Builds a detector with the given σ threshold (spec default: `3.0`)
    /// and seasonality combination mode.
    pub fn new(sigma_threshold: f64, mode: SeasonalityMode) -> Self {
        Self { sigma_threshold, mode, store: parking_lot::RwLock::new(Vec::new()) }
    }

    /// Detects and persists anomalies in `(timestamps, values)` for
    /// `metric_name`. Returns an empty vec without fitting anything when
    /// fewer than 10 points are supplied.
    pub fn detect(
        &self,
        metric_name: &str,
        timestamps: &[DateTime<Utc>],
        values: &[f64],
        device: Option<&str>,
    ) -> Vec<Anomaly> {
        if timestamps.len() < 10 || timestamps.len() != values.len() {
            tracing::warn!(metric_name, points = timestamps.len(), "insufficient data for anomaly detection");
            return Vec::new();
        }

        let baseline = fit_seasonal_baseline(timestamps, values, self.mode);
        let residuals: Vec<f64> = values.iter().zip(&baseline.yhat).map(|(y, yhat)| y - yhat).collect();
        let (rolling_mean, rolling_std) = rolling_residual_stats(&residuals);

        let anomaly_type = AnomalyType::from_metric_name(metric_name);
        let mut detected = Vec::new();

        for i in 0..values.len() {
            let centered = residuals[i] - rolling_mean[i];
            let sigma = rolling_std[i];
            let is_anomaly = centered.abs() > self.sigma_threshold * sigma;
            if !is_anomaly {
                continue;
            }

            let sigma_ratio = if sigma > 0.0 { centered.abs() / sigma } else { 0.0 };
            let severity = classify_severity(sigma_ratio, sigma);

            let mut metadata = HashMap::new();
            metadata.insert("residual_std".into(), serde_json::json!(sigma));
            metadata.insert("sigma_threshold".into(), serde_json::json!(self.sigma_threshold));
            metadata.insert("lower_bound".into(), serde_json::json!(baseline.lo[i]));
            metadata.insert("upper_bound".into(), serde_json::json!(baseline.hi[i]));

            detected.push(Anomaly {
                id: uuid::Uuid::new_v4(),
                metric_name: metric_name.to_string(),
                anomaly_type,
                timestamp: timestamps[i],
                value: values[i],
                expected_value: baseline.yhat[i],
                deviation: centered.abs(),
                severity,
                device: device.map(String::from),
                metadata,
            });
        }

        if !detected.is_empty() {
            tracing::info!(metric_name, count = detected.len(), "detected anomalies");
            self.store.write().extend(detected.iter().cloned());
        }
        detected
    }

    /// Lists anomalies observed within the last `hours`, optionally
    /// filtered by metric name, device, and severity. Default look-back
    /// per the registry contract is 24 hours.
    pub fn recent(&self, metric_name: Option<&str>, device: Option<&str>, severity: Option<Severity>, hours: i64) -> Vec<Anomaly> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let mut rows: Vec<Anomaly> = self
            .store
            .read()
            .iter()
            .filter(|a| a.timestamp >= cutoff)
            .filter(|a| metric_name.map_or(true, |m| a.metric_name == m))
            .filter(|a| device.map_or(true, |d| a.device.as_deref() == Some(d)))
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Generates a synthetic series with daily and weekly seasonality plus
    /// noise, injecting a handful of out-of-band spikes/drops so detection
    /// tests have something to find.
    fn generate_synthetic_series(n_points: usize, seed_offset: f64) -> (Vec<DateTime<Utc>>, Vec<f64>) {
        let start = Utc::now() - chrono::Duration::hours(n_points as i64);
        let mut rng = rand::thread_rng();
        let mut timestamps = Vec::with_capacity(n_points);
        let mut values = Vec::with_capacity(n_points);

        for i in 0..n_points {
            let t = i as f64;
            let mut value = 50.0 + seed_offset
                + 20.0 * (2.0 * std::f64::consts::PI * t / 24.0).sin()
                + 10.0 * (2.0 * std::f64::consts::PI * t / (24.0 * 7.0)).sin()
                + rng.gen_range(-5.0..5.0);
            if i % 97 == 0 {
                value *= 4.0;
            }
            values.push(value.max(0.0));
            timestamps.push(start + chrono::Duration::hours(i as i64));
        }
        (timestamps, values)
    }

    #[test]
    fn fewer_than_ten_points_returns_empty() {
        let detector = AnomalyDetector::new(3.0, SeasonalityMode::Additive);
        let (timestamps, values) = generate_synthetic_series(5, 0.0);
        assert!(detector.detect("cpu_temp", &timestamps, &values, None).is_empty());
    }

    #[test]
    fn detects_injected_spikes() {
        let detector = AnomalyDetector::new(3.0, SeasonalityMode::Additive);
        let (timestamps, values) = generate_synthetic_series(500, 0.0);
        let anomalies = detector.detect("bgp_session_flaps", &timestamps, &values, Some("edge1"));
        assert!(!anomalies.is_empty());
        assert!(anomalies.iter().all(|a| a.anomaly_type == AnomalyType::BgpFlap));
    }

    #[test]
    fn recent_filters_by_metric_and_severity() {
        let detector = AnomalyDetector::new(3.0, SeasonalityMode::Additive);
        let (timestamps, values) = generate_synthetic_series(500, 0.0);
        detector.detect("interface_errors", &timestamps, &values, Some("core1"));

        let by_metric = detector.recent(Some("interface_errors"), None, None, 24 * 365);
        assert!(!by_metric.is_empty());
        let by_other_metric = detector.recent(Some("nonexistent"), None, None, 24 * 365);
        assert!(by_other_metric.is_empty());
    }

    #[test]
    fn metric_name_maps_to_expected_anomaly_type() {
        assert_eq!(AnomalyType::from_metric_name("bgp_session_flaps"), AnomalyType::BgpFlap);
        assert_eq!(AnomalyType::from_metric_name("cpu_temp"), AnomalyType::CpuTemperature);
        assert_eq!(AnomalyType::from_metric_name("interface_errors"), AnomalyType::InterfaceError);
        assert_eq!(AnomalyType::from_metric_name("unknown_metric"), AnomalyType::Other);
    }
}
