//! Benchmark telemetry: sample recording, live statistics, and artifact
//! persistence.
//!
//! Each task owns one [`MetricsHub`]; pass runners record samples through
//! cheap [`Recorder`] clones and a task persists its samples once, at the
//! end, through a [`MetricsSink`]. There is no process-wide registry: hubs
//! are instance-scoped, so independent tasks never share telemetry state.

/// Sample storage and recording.
pub mod metrics;
/// Point-in-time statistics over recorded samples.
pub mod snapshot;
/// Artifact persistence behind the external-storage seam.
pub mod sink;

pub use metrics::{Metric, MetricsHub, Recorder};
pub use sink::{ArtifactId, JsonlSink, MetricsSink};
pub use snapshot::Snapshot;
