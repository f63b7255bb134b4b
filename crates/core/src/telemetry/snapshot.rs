//! Point-in-time statistics over recorded samples, used by the live
//! per-second progress logs.

use chrono::Utc;

use crate::telemetry::metrics::Metric;

/// An immutable copy of a hub's samples.
pub struct Snapshot {
    pub metrics: Vec<Metric>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Sum of all samples of a series.
    pub fn total(&self, name: &str) -> f64 {
        self.metrics
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.value)
            .sum()
    }

    /// Sum of samples recorded within the last second, i.e. an
    /// instantaneous per-second rate for counter-style series.
    pub fn rate_last_second(&self, name: &str) -> f64 {
        let now = Utc::now();
        self.metrics
            .iter()
            .filter(|m| m.name == name)
            .filter(|m| (now - m.at).num_milliseconds() <= 1_000)
            .map(|m| m.value)
            .sum()
    }

    /// Mean of a series, 0.0 when empty.
    pub fn avg(&self, name: &str) -> f64 {
        let mut count = 0usize;
        let mut total = 0.0;
        for m in self.metrics.iter().filter(|m| m.name == name) {
            total += m.value;
            count += 1;
        }
        if count > 0 {
            total / count as f64
        } else {
            0.0
        }
    }

    /// Nearest-rank quantile of a series, 0.0 when empty.
    pub fn quantile(&self, name: &str, q: f64) -> f64 {
        let mut values: Vec<f64> = self
            .metrics
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.value)
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let len = values.len();
        let idx = ((q * (len as f64 - 1.0)).round() as usize).min(len - 1);
        values[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MetricsHub;

    fn snapshot_with(values: &[f64]) -> Snapshot {
        let hub = MetricsHub::new();
        let m = hub.recorder([("run", "t")]);
        for v in values {
            m.record("series", *v);
        }
        hub.snapshot()
    }

    #[test]
    fn total_and_avg() {
        let s = snapshot_with(&[1.0, 2.0, 3.0]);
        assert_eq!(s.total("series"), 6.0);
        assert_eq!(s.avg("series"), 2.0);
        assert_eq!(s.total("missing"), 0.0);
        assert_eq!(s.avg("missing"), 0.0);
    }

    #[test]
    fn quantile_nearest_rank() {
        let s = snapshot_with(&[5.0, 1.0, 3.0, 2.0, 4.0]);
        assert_eq!(s.quantile("series", 0.0), 1.0);
        assert_eq!(s.quantile("series", 0.5), 3.0);
        assert_eq!(s.quantile("series", 1.0), 5.0);
        assert_eq!(s.quantile("missing", 0.5), 0.0);
    }

    #[test]
    fn rate_counts_recent_samples() {
        // All samples are recorded "now", so they all fall in the window.
        let s = snapshot_with(&[1.0, 1.0, 1.0]);
        assert_eq!(s.rate_last_second("series"), 3.0);
    }
}
