//! Benchmark task bodies, one per workload mode.
//!
//! Each task owns its provider connection end to end: construct from the
//! environment, setup, optional warmup, strictly sequential measured
//! passes, persist one metrics artifact, close. A failure at any step
//! aborts the task without rollback; sibling tasks are unaffected.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::TaskError;
use crate::matrix::ProviderSpec;
use vexbench_core::bench::{
    cleanup, collection_name, run_ingest, run_query_pass, run_recall_pass, run_rw_pass,
    IngestConfig, Mode, QueryPassConfig,
};
use vexbench_core::config::{
    doc_count, DEFAULT_TOP_K, EMBEDDING_DIM, FILTER_SWEEP, INGEST_CHANNEL_CAPACITY,
    INT_FILTER_MAX, KEYWORD_FULL_CORPUS, QPS_CONCURRENCY_SWEEP, QUERY_SET_SIZE, RW_WRITE_BATCH,
};
use vexbench_core::dataset::{load_queries, synthetic_queries, QueryRecord, SyntheticDocuments};
use vexbench_core::error::BenchError;
use vexbench_core::filter::QueryFilter;
use vexbench_core::provider::{Provider, ProviderKind};
use vexbench_core::telemetry::{ArtifactId, JsonlSink, MetricsHub, MetricsSink, Recorder};

// Fixed seeds keep the corpus and query set identical across providers
// and across the ingest and query phases of one size.
const DOC_SEED: u64 = 42;
const QUERY_SEED: u64 = 43;

// Recall scores are unaffected by worker count.
const RECALL_CONCURRENCY: usize = 8;

/// Run-scoped settings shared by every task of one invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Unique id shared across all tasks of the invocation.
    pub benchmark_id: String,
    /// Base directory metrics artifacts are written under.
    pub metrics_dir: PathBuf,
    /// Duration of one measured query pass.
    pub query_timeout: Duration,
    /// Whether to run an unmeasured warmup pass first.
    pub warmup: bool,
    /// Pre-fetched JSON-lines query file; queries loaded from it carry
    /// ground-truth ids for recall scoring. Synthetic queries otherwise.
    pub queries_file: Option<PathBuf>,
}

/// Task identity used for executor labels and failure reporting.
pub fn task_label(mode: Mode, kind: ProviderKind, size: &str) -> String {
    format!("{mode}/{kind}/{size}")
}

/// Bulk-ingests the full dataset for one (provider, size) combination.
pub async fn run_ingest_bench(
    spec: ProviderSpec,
    size: &'static str,
    ctx: TaskContext,
) -> Result<(), TaskError> {
    let provider: Arc<dyn Provider> = Arc::from(spec.kind.create()?);
    let collection = collection_name(size);
    provider.setup(&collection).await?;

    let hub = MetricsHub::new();
    let recorder = base_recorder(&hub, &ctx, spec.kind, size, Mode::Ingest);

    let config = IngestConfig {
        collection,
        batch_size: spec.batch_size,
        concurrency: spec.concurrency,
        channel_capacity: INGEST_CHANNEL_CAPACITY,
    };
    let stream = Box::new(SyntheticDocuments::new(
        doc_count(size),
        EMBEDDING_DIM,
        DOC_SEED,
    ));
    run_ingest(provider.clone(), &config, stream, recorder).await?;

    persist(&hub, &ctx, spec.kind, Mode::Ingest, size).await?;
    provider.close().await?;
    Ok(())
}

/// Query-throughput sweep at concurrency 1, 2, 4, 8 with no filters.
pub async fn run_qps_bench(
    spec: ProviderSpec,
    size: &'static str,
    ctx: TaskContext,
) -> Result<(), TaskError> {
    let provider: Arc<dyn Provider> = Arc::from(spec.kind.create()?);
    let collection = collection_name(size);
    provider.setup(&collection).await?;

    let queries = query_set(&ctx)?;
    let hub = MetricsHub::new();
    let recorder = base_recorder(&hub, &ctx, spec.kind, size, Mode::Qps);

    if ctx.warmup {
        warmup(&provider, &collection, &queries, &ctx, QueryFilter::none()).await?;
    }
    for concurrency in QPS_CONCURRENCY_SWEEP {
        let config = QueryPassConfig {
            collection: collection.clone(),
            top_k: DEFAULT_TOP_K,
            concurrency,
            timeout: ctx.query_timeout,
            filter: QueryFilter::none(),
        };
        let pass = recorder.with_labels([("concurrency", concurrency.to_string())]);
        run_query_pass(provider.clone(), &config, queries.clone(), pass).await?;
    }

    persist(&hub, &ctx, spec.kind, Mode::Qps, size).await?;
    provider.close().await?;
    Ok(())
}

/// Selectivity sweep: unfiltered, then three integer and three keyword
/// selectivities, strictly sequentially at concurrency 1.
pub async fn run_filter_bench(
    spec: ProviderSpec,
    size: &'static str,
    ctx: TaskContext,
) -> Result<(), TaskError> {
    let provider: Arc<dyn Provider> = Arc::from(spec.kind.create()?);
    let collection = collection_name(size);
    provider.setup(&collection).await?;

    let queries = query_set(&ctx)?;
    let hub = MetricsHub::new();
    let recorder = base_recorder(&hub, &ctx, spec.kind, size, Mode::Filter);

    if ctx.warmup {
        // Maximal-selectivity filters exercise both predicate paths while
        // still matching the whole corpus.
        let filter = QueryFilter::from_parts(Some(INT_FILTER_MAX), Some(KEYWORD_FULL_CORPUS));
        warmup(&provider, &collection, &queries, &ctx, filter).await?;
    }
    for (int_lte, keyword) in FILTER_SWEEP {
        let config = QueryPassConfig {
            collection: collection.clone(),
            top_k: DEFAULT_TOP_K,
            concurrency: 1,
            timeout: ctx.query_timeout,
            filter: QueryFilter::from_parts(int_lte, keyword),
        };
        let pass = recorder.with_labels([
            (
                "int_lte",
                int_lte.map_or("none".to_string(), |v| v.to_string()),
            ),
            ("keyword", keyword.unwrap_or("none").to_string()),
        ]);
        run_query_pass(provider.clone(), &config, queries.clone(), pass).await?;
    }

    // Recall is scored after the timed passes so the full-set sweep never
    // contends with a measured pass. Synthetic query sets carry no ground
    // truth and skip this entirely.
    if queries.iter().any(|q| !q.recall.is_empty()) {
        for (int_lte, keyword) in FILTER_SWEEP {
            let config = QueryPassConfig {
                collection: collection.clone(),
                top_k: DEFAULT_TOP_K,
                concurrency: RECALL_CONCURRENCY,
                timeout: ctx.query_timeout,
                filter: QueryFilter::from_parts(int_lte, keyword),
            };
            let pass = recorder.with_labels([
                (
                    "int_lte",
                    int_lte.map_or("none".to_string(), |v| v.to_string()),
                ),
                ("keyword", keyword.unwrap_or("none").to_string()),
            ]);
            run_recall_pass(provider.clone(), &config, queries.clone(), pass).await?;
        }
    }

    persist(&hub, &ctx, spec.kind, Mode::Filter, size).await?;
    provider.close().await?;
    Ok(())
}

/// Read-only baseline followed by a mixed read/write pass at concurrency 1.
pub async fn run_rw_bench(
    spec: ProviderSpec,
    size: &'static str,
    ctx: TaskContext,
) -> Result<(), TaskError> {
    let provider: Arc<dyn Provider> = Arc::from(spec.kind.create()?);
    let collection = collection_name(size);
    provider.setup(&collection).await?;

    let queries = query_set(&ctx)?;
    let hub = MetricsHub::new();
    let recorder = base_recorder(&hub, &ctx, spec.kind, size, Mode::Rw);

    if ctx.warmup {
        warmup(&provider, &collection, &queries, &ctx, QueryFilter::none()).await?;
    }
    let config = QueryPassConfig {
        collection: collection.clone(),
        top_k: DEFAULT_TOP_K,
        concurrency: 1,
        timeout: ctx.query_timeout,
        filter: QueryFilter::none(),
    };

    let read_pass = recorder.with_labels([("phase", "read")]);
    run_query_pass(provider.clone(), &config, queries.clone(), read_pass).await?;

    // Re-upserting the ingest corpus overwrites live ids, so the writer
    // contends with readers on real data.
    let stream = Box::new(SyntheticDocuments::new(
        doc_count(size),
        EMBEDDING_DIM,
        DOC_SEED,
    ));
    let rw_pass = recorder.with_labels([("phase", "readwrite")]);
    run_rw_pass(
        provider.clone(),
        &config,
        queries,
        stream,
        RW_WRITE_BATCH,
        rw_pass,
    )
    .await?;

    persist(&hub, &ctx, spec.kind, Mode::Rw, size).await?;
    provider.close().await?;
    Ok(())
}

/// Cleanup task: dry run unless `wet` is set.
pub async fn run_cleanup(kind: ProviderKind, wet: bool) -> Result<(), TaskError> {
    let provider = kind.create()?;
    if wet {
        cleanup::purge(provider.as_ref()).await?;
    } else {
        cleanup::plan(provider.as_ref()).await?;
    }
    provider.close().await?;
    Ok(())
}

fn query_set(ctx: &TaskContext) -> Result<Arc<Vec<QueryRecord>>, TaskError> {
    let records = match &ctx.queries_file {
        Some(path) => load_queries(path).map_err(BenchError::from)?,
        None => synthetic_queries(QUERY_SET_SIZE, EMBEDDING_DIM, QUERY_SEED),
    };
    Ok(Arc::new(records))
}

fn base_recorder(
    hub: &MetricsHub,
    ctx: &TaskContext,
    kind: ProviderKind,
    size: &str,
    mode: Mode,
) -> Recorder {
    hub.recorder([
        ("run_id", ctx.benchmark_id.as_str()),
        ("provider", kind.as_str()),
        ("size", size),
        ("mode", mode.as_str()),
    ])
}

/// Unmeasured warmup pass: concurrency 1, doubled timeout, samples
/// discarded through a no-op recorder.
async fn warmup(
    provider: &Arc<dyn Provider>,
    collection: &str,
    queries: &Arc<Vec<QueryRecord>>,
    ctx: &TaskContext,
    filter: QueryFilter,
) -> Result<(), TaskError> {
    info!(%collection, "Warmup pass");
    let config = QueryPassConfig {
        collection: collection.to_string(),
        top_k: DEFAULT_TOP_K,
        concurrency: 1,
        timeout: ctx.query_timeout * 2,
        filter,
    };
    run_query_pass(
        provider.clone(),
        &config,
        queries.clone(),
        Recorder::noop(),
    )
    .await?;
    Ok(())
}

async fn persist(
    hub: &MetricsHub,
    ctx: &TaskContext,
    kind: ProviderKind,
    mode: Mode,
    size: &str,
) -> Result<(), TaskError> {
    let sink = JsonlSink::new(ctx.metrics_dir.clone());
    let artifact = ArtifactId {
        benchmark_id: ctx.benchmark_id.clone(),
        provider: kind.as_str().to_string(),
        mode,
        size: size.to_string(),
    };
    sink.persist(&artifact, &hub.drain()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_labels_identify_mode_provider_and_size() {
        assert_eq!(
            task_label(Mode::Ingest, ProviderKind::Qdrant, "1m"),
            "ingest/qdrant/1m"
        );
        assert_eq!(
            task_label(Mode::Filter, ProviderKind::Pinecone, "100k"),
            "filter/pinecone/100k"
        );
    }
}
