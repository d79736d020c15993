//! Extraction pipeline
//!
//! Anchors on the latest block of the first source, splits the requested range
//! across all sources and runs one walker per source. Each chunk is normalized
//! and written to the sink before that source asks for the next one. A source
//! that fails is logged and counted while the others keep going.

use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::builder::SwapSyncBuilder;
use crate::errors::SwapSyncError;
use crate::events::RawSwapEvent;
use crate::normalizer::SwapNormalizer;
use crate::partition::{partition, BlocksBack};
use crate::progress::{MemoryProbe, ProgressObserver, ProgressReporter};
use crate::sink::RecordSink;
use crate::source::BlockchainSource;
use crate::walker::ChunkWalker;

/// Totals of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub latest_block: u64,
    pub blocks_back: u64,
    pub events_processed: u64,
    pub records_persisted: u64,
    pub conversion_failures: u64,
    pub write_failures: u64,
    pub chunks_processed: u64,
    /// Names of the sources whose walker ended in an error
    pub failed_sources: Vec<String>,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct Counters {
    events_processed: AtomicU64,
    records_persisted: AtomicU64,
    conversion_failures: AtomicU64,
    write_failures: AtomicU64,
    chunks_processed: AtomicU64,
}

/// Pulls swaps from several sources in parallel into one sink
pub struct SwapSync {
    pub(crate) sources: Vec<Arc<dyn BlockchainSource>>,
    pub(crate) sink: Arc<dyn RecordSink>,
    pub(crate) normalizer: SwapNormalizer,
    pub(crate) progress: Arc<dyn ProgressReporter>,
    pub(crate) memory: Arc<MemoryProbe>,
}

impl SwapSync {
    /// Constructs a builder
    pub fn builder() -> SwapSyncBuilder {
        SwapSyncBuilder::default()
    }

    /// Extracts the swaps of the last `blocks_back` blocks. Resolves once every
    /// walker is done. Only a failure to read the chain head is returned as an
    /// error, source failures end up in `Stats::failed_sources`
    pub async fn run(&self, blocks_back: BlocksBack) -> Result<Stats, SwapSyncError> {
        let started = Instant::now();

        let anchor = self
            .sources
            .first()
            .ok_or_else(|| SwapSyncError::Config("no sources configured".to_string()))?;
        let latest_block = anchor.get_latest_block_number().await?;
        let blocks_back = blocks_back.resolve(latest_block);

        let intervals: Vec<Duration> = self.sources.iter().map(|s| s.rate_limit()).collect();
        let ranges = partition(latest_block, blocks_back, &intervals);
        info!(latest_block, blocks_back, sources = self.sources.len(), "Extracting swaps");

        let counters = Arc::new(Counters::default());
        let mut handles = Vec::new();

        for (source, range) in self.sources.iter().zip(ranges) {
            let name = source.name().to_string();
            let Some(range) = range else {
                info!(source = %name, "No blocks assigned, skipping");
                continue;
            };
            info!(source = %name, from_block = range.start(), to_block = range.end(), "Assigned range");

            let chunk = ChunkProcessor {
                source: source.clone(),
                sink: self.sink.clone(),
                normalizer: self.normalizer.clone(),
                tracker: self.progress.tracker(&name, range.len()),
                memory: self.memory.clone(),
                counters: counters.clone(),
            };
            let walker = ChunkWalker::new(source.clone());

            let handle = tokio::spawn(async move {
                let result = walker
                    .walk(range.start(), range.end(), |events, blocks| {
                        let chunk = chunk.clone();
                        async move { chunk.process(events, blocks).await }
                    })
                    .await;
                chunk.tracker.finish();
                result
            });
            handles.push((name, handle));
        }

        let (names, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut failed_sources = Vec::new();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(Ok(chunks)) => info!(source = %name, chunks, "Source finished"),
                Ok(Err(e)) => {
                    error!(source = %name, "Source failed: {}", e);
                    failed_sources.push(name);
                }
                Err(e) => {
                    error!(source = %name, "Source task panicked: {}", e);
                    failed_sources.push(name);
                }
            }
        }

        Ok(Stats {
            latest_block,
            blocks_back,
            events_processed: counters.events_processed.load(Ordering::Relaxed),
            records_persisted: counters.records_persisted.load(Ordering::Relaxed),
            conversion_failures: counters.conversion_failures.load(Ordering::Relaxed),
            write_failures: counters.write_failures.load(Ordering::Relaxed),
            chunks_processed: counters.chunks_processed.load(Ordering::Relaxed),
            failed_sources,
            elapsed: started.elapsed(),
        })
    }
}

// Everything one walker needs to turn a chunk into persisted records
#[derive(Clone)]
struct ChunkProcessor {
    source: Arc<dyn BlockchainSource>,
    sink: Arc<dyn RecordSink>,
    normalizer: SwapNormalizer,
    tracker: Arc<dyn ProgressObserver>,
    memory: Arc<MemoryProbe>,
    counters: Arc<Counters>,
}

impl ChunkProcessor {
    async fn process(&self, events: Vec<RawSwapEvent>, blocks: u64) -> Result<(), SwapSyncError> {
        self.counters
            .events_processed
            .fetch_add(events.len() as u64, Ordering::Relaxed);

        let timestamps = self
            .normalizer
            .resolve_timestamps(self.source.as_ref(), &events)
            .await?;
        self.tracker.advance(0, self.memory.meta());

        let batch = self.normalizer.normalize(&events, &timestamps);
        self.counters
            .conversion_failures
            .fetch_add(batch.dropped as u64, Ordering::Relaxed);

        for record in &batch.records {
            match self.sink.insert(record).await {
                Ok(()) => {
                    self.counters.records_persisted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(source = %self.source.name(), block = record.block_number, "Skipping record: {}", e);
                    self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.counters.chunks_processed.fetch_add(1, Ordering::Relaxed);
        self.tracker.advance(blocks, self.memory.meta());
        Ok(())
    }
}
