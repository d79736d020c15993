use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::errors::SwapSyncError;
use crate::events::{RawSwapEvent, UniswapV3Pool};
use crate::rate_limiter::RateLimiter;
use crate::source::BlockchainSource;

/// A rpc endpoint with its own rate limiter.
///
/// Every call runs under `call_timeout`. Failed calls are retried up to
/// `max_retries` times with a random backoff of up to one second.
pub struct RpcSource {
    name: String,
    provider: DynProvider,
    pool: Address,
    chunk_size: u64,
    limiter: RateLimiter,
    call_timeout: Duration,
    max_retries: usize,
}

impl RpcSource {
    /// Connects to the endpoint. `ws://`, `wss://` and `http(s)://` urls are supported
    pub async fn connect(
        config: &SourceConfig,
        pool: Address,
        call_timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, SwapSyncError> {
        let provider = ProviderBuilder::new()
            .connect(&config.url)
            .await
            .map_err(|e| SwapSyncError::source_failure(&config.name, format!("connect: {e}")))?
            .erased();

        info!(
            source = %config.name,
            chunk_size = config.chunk_size,
            rate_limit_ms = config.rate_limit.as_millis() as u64,
            max_concurrent = config.max_concurrent,
            "Connected to rpc endpoint"
        );

        Ok(Self::with_provider(config, provider, pool, call_timeout, max_retries))
    }

    /// Wraps an already built provider
    pub fn with_provider(
        config: &SourceConfig,
        provider: DynProvider,
        pool: Address,
        call_timeout: Duration,
        max_retries: usize,
    ) -> Self {
        Self {
            name: config.name.clone(),
            provider,
            pool,
            chunk_size: config.chunk_size,
            limiter: RateLimiter::new(config.rate_limit, config.max_concurrent),
            call_timeout,
            max_retries,
        }
    }

    // Run a provider call through the limiter with a deadline, retrying on failure
    async fn call<F, Fut, T, E>(&self, call: &'static str, request: F) -> Result<T, SwapSyncError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let result = self
                .limiter
                .schedule(|| tokio::time::timeout(self.call_timeout, request()))
                .await;

            let err = match result {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => SwapSyncError::source_failure(&self.name, format!("{call}: {e}")),
                Err(_) => SwapSyncError::Timeout {
                    source_name: self.name.clone(),
                    call,
                    elapsed: self.call_timeout,
                },
            };

            if attempt >= self.max_retries {
                return Err(err);
            }
            attempt += 1;

            // Jitter for some retry sleep duration
            let jitter = fastrand::u64(0..=1000);
            warn!(source = %self.name, attempt, "{err}, retrying in {jitter}ms");
            tokio::time::sleep(Duration::from_millis(jitter)).await;
        }
    }
}

#[async_trait]
impl BlockchainSource for RpcSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    fn rate_limit(&self) -> Duration {
        self.limiter.min_interval()
    }

    async fn get_events_in_range(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawSwapEvent>, SwapSyncError> {
        let filter = Filter::new()
            .address(self.pool)
            .event_signature(UniswapV3Pool::Swap::SIGNATURE_HASH)
            .from_block(start_block)
            .to_block(end_block);

        let logs = self
            .call("eth_getLogs", || async { self.provider.get_logs(&filter).await })
            .await?;
        debug!(source = %self.name, start_block, end_block, logs = logs.len(), "Fetched logs");

        let events = logs
            .iter()
            .filter_map(|log| match RawSwapEvent::try_from(log) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(source = %self.name, tx = ?log.transaction_hash, "Skipping log: {e}");
                    None
                }
            })
            .collect();
        Ok(events)
    }

    async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, SwapSyncError> {
        let block = self
            .call("eth_getBlockByNumber", || async {
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(block_number))
                    .await
            })
            .await?;

        block.map(|b| b.header.timestamp).ok_or_else(|| {
            SwapSyncError::source_failure(&self.name, format!("block {block_number} not found"))
        })
    }

    async fn get_latest_block_number(&self) -> Result<u64, SwapSyncError> {
        // not rate limited, called once before any walker starts
        tokio::time::timeout(self.call_timeout, async {
            self.provider.get_block_number().await
        })
        .await
        .map_err(|_| SwapSyncError::Timeout {
            source_name: self.name.clone(),
            call: "eth_blockNumber",
            elapsed: self.call_timeout,
        })?
        .map_err(|e| SwapSyncError::source_failure(&self.name, format!("eth_blockNumber: {e}")))
    }
}
