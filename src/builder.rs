//! SwapSync Builder Implementation
//!
//! This module provides a builder pattern for constructing a SwapSync instance,
//! allowing the sources, the sink and the pool being extracted to be configured
//! before anything touches the network.

use crate::config::PoolConfig;
use crate::errors::SwapSyncError;
use crate::normalizer::SwapNormalizer;
use crate::progress::{MemoryProbe, ProgressReporter, SilentReporter};
use crate::sink::RecordSink;
use crate::source::BlockchainSource;
use crate::SwapSync;
use std::sync::Arc;

/// Builder for constructing a SwapSync instance
#[derive(Default)]
pub struct SwapSyncBuilder {
    /// Sources in configuration order. The first one anchors the run
    sources: Vec<Arc<dyn BlockchainSource>>,
    /// Where the records go
    sink: Option<Arc<dyn RecordSink>>,
    /// The pool and its decimal layout
    pool: Option<PoolConfig>,
    /// Progress output, silent when unset
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl SwapSyncBuilder {
    /// Adds a new source to pull swaps from
    /// The builder instance for method chaining
    pub fn add_source(mut self, source: Arc<dyn BlockchainSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Add multiple sources
    pub fn add_sources(mut self, sources: impl IntoIterator<Item = Arc<dyn BlockchainSource>>) -> Self {
        for source in sources {
            self = self.add_source(source);
        }
        self
    }

    /// Sets the sink records are written to
    pub fn sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the pool being extracted
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Sets the progress reporter
    pub fn progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Consumes the builder and produces a constructed SwapSync
    pub fn build(self) -> Result<SwapSync, SwapSyncError> {
        if self.sources.is_empty() {
            return Err(SwapSyncError::Config("no sources configured".to_string()));
        }
        if let Some(source) = self.sources.iter().find(|s| s.chunk_size() == 0) {
            return Err(SwapSyncError::Config(format!(
                "chunk size of {} must be greater than zero",
                source.name()
            )));
        }
        let sink = self
            .sink
            .ok_or_else(|| SwapSyncError::Config("no sink configured".to_string()))?;
        let pool = self
            .pool
            .ok_or_else(|| SwapSyncError::Config("no pool configured".to_string()))?;

        Ok(SwapSync {
            sources: self.sources,
            sink,
            normalizer: SwapNormalizer::new(pool),
            progress: self.progress.unwrap_or_else(|| Arc::new(SilentReporter)),
            memory: Arc::new(MemoryProbe::new()),
        })
    }
}
