//! Ingest pass: stream documents into a collection through a writer pool.
//!
//! A blocking producer task drains the [`DocumentStream`] into a bounded
//! channel; `concurrency` async writers pull batches and upsert them. An
//! upsert rejection aborts the whole pass with the backend's original
//! message. After each successful batch the writer probes `query_by_id`
//! on the batch's highest id until the document is visible, recording the
//! write-to-read freshness lag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::dataset::DocumentStream;
use crate::document::Document;
use crate::error::BenchError;
use crate::provider::Provider;
use crate::telemetry::Recorder;

const FRESHNESS_PROBE_ATTEMPTS: u32 = 20;
const FRESHNESS_PROBE_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Shape of one ingest pass.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Target collection; must already exist.
    pub collection: String,
    /// Documents per upsert request.
    pub batch_size: usize,
    /// Concurrent writer workers.
    pub concurrency: usize,
    /// Capacity of the producer-to-writer batch channel.
    pub channel_capacity: usize,
}

/// Runs one ingest pass to completion, returning the number of documents
/// written. The first upsert error aborts the pass.
pub async fn run_ingest(
    provider: Arc<dyn Provider>,
    config: &IngestConfig,
    stream: Box<dyn DocumentStream>,
    recorder: Recorder,
) -> Result<u64, BenchError> {
    if config.concurrency == 0 || config.batch_size == 0 {
        return Err(BenchError::InvalidPass(
            "ingest needs batch_size >= 1 and concurrency >= 1".to_string(),
        ));
    }

    let (tx, rx) = async_channel::bounded::<Vec<Document>>(config.channel_capacity);
    let docs_written = Arc::new(AtomicU64::new(0));

    let batch_size = config.batch_size;
    let mut stream = stream;
    let producer = tokio::task::spawn_blocking(move || {
        while let Some(batch) = stream.next_batch(batch_size) {
            // A send error means the writers are gone; the pass is over.
            if tx.send_blocking(batch).is_err() {
                break;
            }
        }
    });

    let started = Instant::now();
    let reporter = {
        let docs_written = docs_written.clone();
        let collection = config.collection.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let docs = docs_written.load(Ordering::Relaxed);
                let rate = docs as f64 / started.elapsed().as_secs_f64();
                info!(%collection, docs, rate = format!("{rate:.0}/s"), "Ingest progress");
            }
        })
    };

    let mut workers = JoinSet::new();
    for _ in 0..config.concurrency {
        let provider = provider.clone();
        let rx = rx.clone();
        let recorder = recorder.clone();
        let collection = config.collection.clone();
        let docs_written = docs_written.clone();
        workers.spawn(async move {
            write_loop(provider, &collection, rx, recorder, docs_written).await
        });
    }
    drop(rx);

    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
        let result = joined.map_err(BenchError::from).and_then(|r| r);
        if let Err(err) = result {
            if first_error.is_none() {
                first_error = Some(err);
            }
            workers.abort_all();
        }
    }
    reporter.abort();
    producer.await?;

    match first_error {
        Some(err) => Err(err),
        None => {
            let total = docs_written.load(Ordering::Relaxed);
            info!(
                collection = %config.collection,
                docs = total,
                elapsed_secs = started.elapsed().as_secs(),
                "Ingest complete"
            );
            Ok(total)
        }
    }
}

async fn write_loop(
    provider: Arc<dyn Provider>,
    collection: &str,
    rx: async_channel::Receiver<Vec<Document>>,
    recorder: Recorder,
    docs_written: Arc<AtomicU64>,
) -> Result<(), BenchError> {
    loop {
        let waited = Instant::now();
        let batch = match rx.recv().await {
            Ok(batch) => batch,
            Err(_) => return Ok(()),
        };
        recorder.record(
            "bench.ingest.recv_latency_ms",
            waited.elapsed().as_secs_f64() * 1_000.0,
        );

        let bytes: usize = batch.iter().map(Document::approx_size).sum();
        let sent = Instant::now();
        recorder.record("bench.ingest.requests", 1.0);
        provider.upsert(collection, &batch).await?;

        recorder.record("bench.ingest.oks", 1.0);
        recorder.record(
            "bench.ingest.latency_ms",
            sent.elapsed().as_secs_f64() * 1_000.0,
        );
        recorder.record("bench.ingest.upserted_docs", batch.len() as f64);
        recorder.record("bench.ingest.upserted_bytes", bytes as f64);
        docs_written.fetch_add(batch.len() as u64, Ordering::Relaxed);

        if let Some(id) = max_id(&batch) {
            probe_freshness(provider.as_ref(), collection, &id, &recorder).await?;
        }
    }
}

/// Highest numeric id in the batch, the last document a backend could
/// possibly have made visible.
fn max_id(batch: &[Document]) -> Option<String> {
    batch
        .iter()
        .filter_map(|d| d.id.parse::<u64>().ok())
        .max()
        .map(|id| id.to_string())
}

async fn probe_freshness(
    provider: &dyn Provider,
    collection: &str,
    id: &str,
    recorder: &Recorder,
) -> Result<(), BenchError> {
    let started = Instant::now();
    for _ in 0..FRESHNESS_PROBE_ATTEMPTS {
        if provider.query_by_id(collection, id).await?.is_some() {
            recorder.record(
                "bench.ingest.freshness_ms",
                started.elapsed().as_secs_f64() * 1_000.0,
            );
            return Ok(());
        }
        tokio::time::sleep(FRESHNESS_PROBE_INTERVAL).await;
    }
    warn!(%collection, id, "Document still not visible after freshness probes");
    Ok(())
}
