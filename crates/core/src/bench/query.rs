//! Query and read/write passes.
//!
//! A query pass keeps `concurrency` queries in flight against one
//! collection until its deadline, sampling query vectors uniformly at
//! random from a shared set. The read/write variant adds one concurrent
//! writer re-upserting documents from a stream while the readers run.
//! Any backend error aborts the pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::{JoinHandle, JoinSet};
use tracing::info;

use crate::bench::recall::recall_score;
use crate::dataset::{DocumentStream, QueryRecord};
use crate::document::Document;
use crate::error::BenchError;
use crate::filter::QueryFilter;
use crate::provider::Provider;
use crate::telemetry::Recorder;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Shape of one query pass.
#[derive(Debug, Clone)]
pub struct QueryPassConfig {
    /// Target collection; must already be populated.
    pub collection: String,
    /// Results requested per query.
    pub top_k: u32,
    /// In-flight queries.
    pub concurrency: usize,
    /// Duration of the pass.
    pub timeout: Duration,
    /// Predicates attached to every query of the pass.
    pub filter: QueryFilter,
}

/// Runs one timed query pass. Returns the number of completed queries.
pub async fn run_query_pass(
    provider: Arc<dyn Provider>,
    config: &QueryPassConfig,
    queries: Arc<Vec<QueryRecord>>,
    recorder: Recorder,
) -> Result<u64, BenchError> {
    if queries.is_empty() {
        return Err(BenchError::InvalidPass("empty query set".to_string()));
    }
    if config.concurrency == 0 {
        return Err(BenchError::InvalidPass(
            "query pass needs concurrency >= 1".to_string(),
        ));
    }

    let deadline = Instant::now() + config.timeout;
    let reporter = spawn_progress_reporter(config.collection.clone(), recorder.clone());
    let mut workers = JoinSet::new();
    for _ in 0..config.concurrency {
        let provider = provider.clone();
        let queries = queries.clone();
        let recorder = recorder.clone();
        let config = config.clone();
        workers.spawn(async move { read_loop(provider, &config, queries, recorder, deadline).await });
    }

    let mut completed = 0u64;
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined.map_err(BenchError::from).and_then(|r| r) {
            Ok(count) => completed += count,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
                workers.abort_all();
            }
        }
    }
    reporter.abort();

    match first_error {
        Some(err) => Err(err),
        None => {
            info!(
                collection = %config.collection,
                concurrency = config.concurrency,
                queries = completed,
                "Query pass complete"
            );
            Ok(completed)
        }
    }
}

/// Runs a query pass with one concurrent writer re-upserting `write_batch`
/// documents at a time from `stream`. The writer stops at the deadline or
/// when the stream is exhausted, whichever comes first; reader and writer
/// errors both abort the pass.
pub async fn run_rw_pass(
    provider: Arc<dyn Provider>,
    config: &QueryPassConfig,
    queries: Arc<Vec<QueryRecord>>,
    stream: Box<dyn DocumentStream>,
    write_batch: usize,
    recorder: Recorder,
) -> Result<u64, BenchError> {
    if write_batch == 0 {
        return Err(BenchError::InvalidPass(
            "read/write pass needs write_batch >= 1".to_string(),
        ));
    }

    let deadline = Instant::now() + config.timeout;
    let (tx, rx) = async_channel::bounded::<Vec<Document>>(1);

    let mut stream = stream;
    let producer = tokio::task::spawn_blocking(move || {
        while let Some(batch) = stream.next_batch(write_batch) {
            if tx.send_blocking(batch).is_err() {
                break;
            }
        }
    });

    let writer = {
        let provider = provider.clone();
        let recorder = recorder.clone();
        let collection = config.collection.clone();
        tokio::spawn(async move { write_loop(provider, &collection, rx, recorder, deadline).await })
    };

    let read_result = run_query_pass(provider, config, queries, recorder).await;
    let write_result = writer.await.map_err(BenchError::from).and_then(|r| r);
    producer.await?;

    let completed = read_result?;
    write_result?;
    Ok(completed)
}

/// Runs every query in the set exactly once, scoring the results of each
/// against the query's ground-truth ids and recording the score as
/// `bench.query.recall`. Queries without ground truth for the pass's filter
/// pair are issued but score nothing. Returns the number of scored queries.
///
/// Runs after the timed passes of a sweep so the extra traffic never
/// contends with a measured pass; the deadline does not apply here.
pub async fn run_recall_pass(
    provider: Arc<dyn Provider>,
    config: &QueryPassConfig,
    queries: Arc<Vec<QueryRecord>>,
    recorder: Recorder,
) -> Result<u64, BenchError> {
    if queries.is_empty() {
        return Err(BenchError::InvalidPass("empty query set".to_string()));
    }
    if config.concurrency == 0 {
        return Err(BenchError::InvalidPass(
            "recall pass needs concurrency >= 1".to_string(),
        ));
    }

    let (tx, rx) = async_channel::bounded::<QueryRecord>(config.concurrency);
    let generator = {
        let queries = queries.clone();
        tokio::spawn(async move {
            for query in queries.iter() {
                if tx.send(query.clone()).await.is_err() {
                    break;
                }
            }
        })
    };

    let mut workers = JoinSet::new();
    for _ in 0..config.concurrency {
        let provider = provider.clone();
        let recorder = recorder.clone();
        let config = config.clone();
        let rx = rx.clone();
        workers.spawn(async move { recall_loop(provider, &config, rx, recorder).await });
    }
    drop(rx);

    let mut scored = 0u64;
    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        match joined.map_err(BenchError::from).and_then(|r| r) {
            Ok(count) => scored += count,
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
                workers.abort_all();
            }
        }
    }
    generator.await?;

    match first_error {
        Some(err) => Err(err),
        None => {
            info!(
                collection = %config.collection,
                scored,
                "Recall pass complete"
            );
            Ok(scored)
        }
    }
}

fn spawn_progress_reporter(collection: String, recorder: Recorder) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = recorder.snapshot();
            if stats.is_empty() {
                continue;
            }
            info!(
                collection = %collection,
                qps = stats.rate_last_second("bench.query.oks"),
                avg_ms = stats.avg("bench.query.latency_ms"),
                p99_ms = stats.quantile("bench.query.latency_ms", 0.99),
                errors = stats.total("bench.query.errors"),
                "Query pass progress"
            );
        }
    })
}

async fn read_loop(
    provider: Arc<dyn Provider>,
    config: &QueryPassConfig,
    queries: Arc<Vec<QueryRecord>>,
    recorder: Recorder,
    deadline: Instant,
) -> Result<u64, BenchError> {
    let mut completed = 0u64;
    while Instant::now() < deadline {
        let idx = rand::thread_rng().gen_range(0..queries.len());
        let vector = &queries[idx].dense;

        let sent = Instant::now();
        if let Err(err) = provider
            .query(&config.collection, vector, config.top_k, &config.filter)
            .await
        {
            recorder.record("bench.query.errors", 1.0);
            return Err(err.into());
        }

        recorder.record("bench.query.oks", 1.0);
        recorder.record(
            "bench.query.latency_ms",
            sent.elapsed().as_secs_f64() * 1_000.0,
        );
        completed += 1;
    }
    Ok(completed)
}

async fn recall_loop(
    provider: Arc<dyn Provider>,
    config: &QueryPassConfig,
    rx: async_channel::Receiver<QueryRecord>,
    recorder: Recorder,
) -> Result<u64, BenchError> {
    let mut scored = 0u64;
    while let Ok(query) = rx.recv().await {
        let results = provider
            .query(&config.collection, &query.dense, config.top_k, &config.filter)
            .await?;
        if let Some(score) = recall_score(&results, &query, &config.filter, config.top_k) {
            recorder.record("bench.query.recall", score);
            scored += 1;
        }
    }
    Ok(scored)
}

async fn write_loop(
    provider: Arc<dyn Provider>,
    collection: &str,
    rx: async_channel::Receiver<Vec<Document>>,
    recorder: Recorder,
    deadline: Instant,
) -> Result<(), BenchError> {
    loop {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(d) if !d.is_zero() => d,
            _ => return Ok(()),
        };
        let batch = match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(batch)) => batch,
            // Stream exhausted or deadline reached.
            Ok(Err(_)) | Err(_) => return Ok(()),
        };

        let sent = Instant::now();
        recorder.record("bench.rw.write_requests", 1.0);
        if let Err(err) = provider.upsert(collection, &batch).await {
            recorder.record("bench.rw.write_errors", 1.0);
            return Err(err.into());
        }
        recorder.record("bench.rw.write_oks", 1.0);
        recorder.record(
            "bench.rw.write_latency_ms",
            sent.elapsed().as_secs_f64() * 1_000.0,
        );
        recorder.record("bench.rw.written_docs", batch.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{synthetic_queries, DocumentStream, SyntheticDocuments};
    use crate::provider::memory::MemoryProvider;
    use crate::telemetry::MetricsHub;

    async fn populated_provider(docs: u64, dim: usize) -> Arc<dyn Provider> {
        let provider = MemoryProvider::new();
        provider.setup("c").await.unwrap();
        let mut stream = SyntheticDocuments::new(docs, dim, 5);
        while let Some(batch) = stream.next_batch(200) {
            provider.upsert("c", &batch).await.unwrap();
        }
        Arc::new(provider)
    }

    fn config(concurrency: usize, filter: QueryFilter) -> QueryPassConfig {
        QueryPassConfig {
            collection: "c".to_string(),
            top_k: 10,
            concurrency,
            timeout: Duration::from_millis(200),
            filter,
        }
    }

    #[tokio::test]
    async fn query_pass_records_one_sample_per_query() {
        let provider = populated_provider(300, 8).await;
        let queries = Arc::new(synthetic_queries(16, 8, 9));

        let hub = MetricsHub::new();
        let completed = run_query_pass(
            provider,
            &config(2, QueryFilter::none()),
            queries,
            hub.recorder([("mode", "qps")]),
        )
        .await
        .unwrap();

        assert!(completed > 0);
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.total("bench.query.oks"), completed as f64);
        assert!(snapshot.avg("bench.query.latency_ms") >= 0.0);
    }

    #[tokio::test]
    async fn empty_query_set_is_rejected() {
        let provider = populated_provider(10, 4).await;
        let err = run_query_pass(
            provider,
            &config(1, QueryFilter::none()),
            Arc::new(Vec::new()),
            Recorder::noop(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BenchError::InvalidPass(_)));
    }

    #[tokio::test]
    async fn query_pass_aborts_on_missing_collection() {
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new());
        let queries = Arc::new(synthetic_queries(4, 4, 9));

        let err = run_query_pass(
            provider,
            &config(2, QueryFilter::none()),
            queries,
            Recorder::noop(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BenchError::Provider(_)));
    }

    #[tokio::test]
    async fn failed_queries_record_an_error_sample() {
        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new());
        let queries = Arc::new(synthetic_queries(4, 4, 9));

        let hub = MetricsHub::new();
        run_query_pass(
            provider,
            &config(1, QueryFilter::none()),
            queries,
            hub.recorder([("mode", "qps")]),
        )
        .await
        .unwrap_err();

        assert!(hub.snapshot().total("bench.query.errors") >= 1.0);
    }

    #[tokio::test]
    async fn recall_pass_scores_queries_with_ground_truth() {
        use crate::config::{INT_FILTER_MAX, KEYWORD_FULL_CORPUS};
        use std::collections::HashMap;

        let provider: Arc<dyn Provider> = Arc::new(MemoryProvider::new());
        provider.setup("c").await.unwrap();
        let docs: Vec<Document> = (0..3)
            .map(|i| {
                let mut embedding = vec![0.0f32; 4];
                embedding[i] = 1.0;
                Document {
                    id: i.to_string(),
                    text: String::new(),
                    int_filter: 1,
                    keyword_filter: KEYWORD_FULL_CORPUS.to_string(),
                    dense_embedding: Some(embedding),
                }
            })
            .collect();
        provider.upsert("c", &docs).await.unwrap();

        let truth = HashMap::from([(
            INT_FILTER_MAX,
            HashMap::from([(KEYWORD_FULL_CORPUS.to_string(), vec![0i64, 1, 2])]),
        )]);
        let queries = Arc::new(vec![
            QueryRecord {
                dense: vec![1.0, 0.0, 0.0, 0.0],
                recall: truth.clone(),
            },
            QueryRecord {
                dense: vec![0.0, 1.0, 0.0, 0.0],
                recall: truth,
            },
        ]);

        let hub = MetricsHub::new();
        let scored = run_recall_pass(
            provider,
            &config(2, QueryFilter::none()),
            queries,
            hub.recorder([("mode", "filter")]),
        )
        .await
        .unwrap();

        assert_eq!(scored, 2);
        let snapshot = hub.snapshot();
        assert_eq!(snapshot.avg("bench.query.recall"), 1.0);
    }

    #[tokio::test]
    async fn recall_pass_skips_queries_without_ground_truth() {
        let provider = populated_provider(50, 8).await;
        let queries = Arc::new(synthetic_queries(5, 8, 9));

        let hub = MetricsHub::new();
        let scored = run_recall_pass(
            provider,
            &config(2, QueryFilter::none()),
            queries,
            hub.recorder([("mode", "filter")]),
        )
        .await
        .unwrap();

        assert_eq!(scored, 0);
        assert!(hub.drain().is_empty());
    }

    #[tokio::test]
    async fn rw_pass_writes_while_reading() {
        let provider = populated_provider(100, 8).await;
        let queries = Arc::new(synthetic_queries(8, 8, 9));

        let hub = MetricsHub::new();
        let completed = run_rw_pass(
            provider.clone(),
            &config(2, QueryFilter::none()),
            queries,
            Box::new(SyntheticDocuments::new(400, 8, 6)),
            50,
            hub.recorder([("mode", "rw")]),
        )
        .await
        .unwrap();

        assert!(completed > 0);
        let snapshot = hub.snapshot();
        assert!(snapshot.total("bench.rw.write_oks") > 0.0);
        assert_eq!(
            snapshot.total("bench.rw.write_oks"),
            snapshot.total("bench.rw.write_requests")
        );
    }
}
