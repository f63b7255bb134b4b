//! Metric samples, the per-task hub that stores them, and recorders.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::telemetry::snapshot::Snapshot;

/// One recorded sample.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Series name, e.g. `bench.query.latency_ms`.
    pub name: String,
    /// Sample value.
    pub value: f64,
    /// Wall-clock time the sample was recorded.
    pub at: DateTime<Utc>,
    /// Shared label set identifying the run, pass, and configuration.
    pub labels: Arc<BTreeMap<String, String>>,
}

/// Instance-scoped sample store owned by one benchmark task.
#[derive(Debug, Clone, Default)]
pub struct MetricsHub {
    store: Arc<Mutex<Vec<Metric>>>,
}

impl MetricsHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a recorder whose samples carry the given labels.
    pub fn recorder<K, V>(&self, labels: impl IntoIterator<Item = (K, V)>) -> Recorder
    where
        K: Into<String>,
        V: Into<String>,
    {
        Recorder {
            store: Some(self.store.clone()),
            labels: Arc::new(
                labels
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// A point-in-time copy of all samples for live progress statistics.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            metrics: self.store.lock().clone(),
        }
    }

    /// Removes and returns all samples, ready for persistence.
    pub fn drain(&self) -> Vec<Metric> {
        std::mem::take(&mut *self.store.lock())
    }
}

/// Records samples into a hub under a fixed label set.
///
/// Clones are cheap (two `Arc`s). The no-op variant is used for warmup
/// passes, whose samples are discarded from metrics by construction.
#[derive(Debug, Clone)]
pub struct Recorder {
    store: Option<Arc<Mutex<Vec<Metric>>>>,
    labels: Arc<BTreeMap<String, String>>,
}

impl Recorder {
    /// A recorder that drops every sample.
    pub fn noop() -> Self {
        Self {
            store: None,
            labels: Arc::new(BTreeMap::new()),
        }
    }

    /// A copy of this recorder with additional (or overriding) labels,
    /// used to tag the samples of one measured pass.
    pub fn with_labels<K, V>(&self, extra: impl IntoIterator<Item = (K, V)>) -> Recorder
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = (*self.labels).clone();
        for (k, v) in extra {
            labels.insert(k.into(), v.into());
        }
        Recorder {
            store: self.store.clone(),
            labels: Arc::new(labels),
        }
    }

    /// A point-in-time copy of the backing store's samples, empty for the
    /// no-op recorder. Feeds the per-second progress logs.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            metrics: self
                .store
                .as_ref()
                .map(|store| store.lock().clone())
                .unwrap_or_default(),
        }
    }

    /// Records one sample at the current wall-clock time.
    pub fn record(&self, name: &str, value: f64) {
        if let Some(store) = &self.store {
            store.lock().push(Metric {
                name: name.to_string(),
                value,
                at: Utc::now(),
                labels: self.labels.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_attaches_labels() {
        let hub = MetricsHub::new();
        let m = hub.recorder([("provider", "memory"), ("size", "100k")]);
        m.record("bench.query.oks", 1.0);

        let samples = hub.drain();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels.get("provider").unwrap(), "memory");
        assert_eq!(samples[0].labels.get("size").unwrap(), "100k");
    }

    #[test]
    fn with_labels_overrides_and_extends() {
        let hub = MetricsHub::new();
        let base = hub.recorder([("concurrency", "1"), ("mode", "qps")]);
        let pass = base.with_labels([("concurrency", "8")]);
        pass.record("bench.query.oks", 1.0);

        let samples = hub.drain();
        assert_eq!(samples[0].labels.get("concurrency").unwrap(), "8");
        assert_eq!(samples[0].labels.get("mode").unwrap(), "qps");
    }

    #[test]
    fn noop_recorder_discards_samples() {
        let hub = MetricsHub::new();
        Recorder::noop().record("bench.query.oks", 1.0);
        assert!(hub.drain().is_empty());
    }

    #[test]
    fn recorder_snapshot_sees_the_backing_store() {
        let hub = MetricsHub::new();
        let m = hub.recorder([("mode", "qps")]);
        m.record("bench.query.oks", 1.0);
        m.record("bench.query.oks", 1.0);

        assert_eq!(m.snapshot().total("bench.query.oks"), 2.0);
        assert!(Recorder::noop().snapshot().is_empty());
    }

    #[test]
    fn drain_empties_the_hub() {
        let hub = MetricsHub::new();
        hub.recorder([("a", "b")]).record("x", 1.0);
        assert_eq!(hub.drain().len(), 1);
        assert!(hub.drain().is_empty());
    }
}
