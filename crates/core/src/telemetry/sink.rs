//! Metrics artifact persistence.
//!
//! One artifact is written per `(benchmark_id, provider, mode, size)` tuple.
//! Object-storage upload is an external collaborator; the harness depends
//! only on the [`MetricsSink`] seam, and [`JsonlSink`] writes JSON-lines
//! files under a local base directory from which the external uploader
//! ships them.

use async_trait::async_trait;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::bench::Mode;
use crate::error::SinkError;
use crate::telemetry::metrics::Metric;

/// Identifies one metrics artifact.
#[derive(Debug, Clone)]
pub struct ArtifactId {
    /// Run-scoped unique identifier shared across all tasks of an invocation.
    pub benchmark_id: String,
    /// Provider name, as reported by `Provider::name`.
    pub provider: String,
    /// Workload mode of the task that produced the samples.
    pub mode: Mode,
    /// Dataset size label.
    pub size: String,
}

/// External seam for persisting a task's samples.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Persists `metrics` under `artifact`, returning the written location.
    async fn persist(&self, artifact: &ArtifactId, metrics: &[Metric])
        -> Result<PathBuf, SinkError>;
}

/// Writes one JSON-lines file per artifact:
/// `{base}/{benchmark_id}/{provider}_{mode}_{size}.jsonl`.
///
/// Each line is a flat object: `ts`, `metric`, `value`, plus one key per
/// label, matching the columnar layout downstream analysis expects.
pub struct JsonlSink {
    base: PathBuf,
}

impl JsonlSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn artifact_path(&self, artifact: &ArtifactId) -> PathBuf {
        self.base.join(&artifact.benchmark_id).join(format!(
            "{}_{}_{}.jsonl",
            artifact.provider, artifact.mode, artifact.size
        ))
    }
}

#[async_trait]
impl MetricsSink for JsonlSink {
    async fn persist(
        &self,
        artifact: &ArtifactId,
        metrics: &[Metric],
    ) -> Result<PathBuf, SinkError> {
        let path = self.artifact_path(artifact);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut buffer = String::new();
        for metric in metrics {
            let mut row = json!({
                "ts": metric.at.to_rfc3339(),
                "metric": metric.name,
                "value": metric.value,
            });
            for (key, value) in metric.labels.iter() {
                row[key] = json!(value);
            }
            buffer.push_str(&row.to_string());
            buffer.push('\n');
        }

        tokio::fs::write(&path, buffer).await?;
        info!(path = %path.display(), samples = metrics.len(), "Metrics artifact written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MetricsHub;

    #[tokio::test]
    async fn jsonl_sink_writes_one_file_per_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path());

        let hub = MetricsHub::new();
        let m = hub.recorder([("provider", "memory"), ("run_id", "r1")]);
        m.record("bench.query.oks", 1.0);
        m.record("bench.query.latency_ms", 12.5);

        let artifact = ArtifactId {
            benchmark_id: "b1".to_string(),
            provider: "memory".to_string(),
            mode: Mode::Qps,
            size: "100k".to_string(),
        };
        let path = sink.persist(&artifact, &hub.drain()).await.unwrap();

        assert_eq!(
            path,
            dir.path().join("b1").join("memory_qps_100k.jsonl")
        );
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["metric"], "bench.query.oks");
        assert_eq!(first["provider"], "memory");
        assert_eq!(first["run_id"], "r1");
    }
}
