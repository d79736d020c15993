//! Data source abstraction
//!
//! A `BlockchainSource` is one independently rate limited endpoint. The pipeline
//! only talks to sources through this trait, so the rpc transport can be swapped
//! out (see `rpc::RpcSource`) or mocked in tests.

use crate::errors::SwapSyncError;
use crate::events::RawSwapEvent;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait BlockchainSource: Send + Sync {
    /// Identity used in logs and progress output
    fn name(&self) -> &str;

    /// Number of blocks fetched per `get_events_in_range` call
    fn chunk_size(&self) -> u64;

    /// Minimum spacing between two calls. Also the weight used when splitting work
    fn rate_limit(&self) -> Duration;

    /// All pool swaps in `[start_block, end_block]`, rate limited
    async fn get_events_in_range(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RawSwapEvent>, SwapSyncError>;

    /// Unix timestamp (seconds) of the block header, rate limited
    async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, SwapSyncError>;

    /// Current chain head, used once to anchor the run
    async fn get_latest_block_number(&self) -> Result<u64, SwapSyncError>;
}
