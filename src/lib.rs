//! SwapSync: pulls a pool's swap history from several rate limited rpc
//! endpoints in parallel and writes it to Postgres.

pub use builder::SwapSyncBuilder;
pub use config::{DatabaseConfig, ExtractorConfig, PoolConfig, SourceConfig};
pub use errors::SwapSyncError;
pub use events::RawSwapEvent;
pub use normalizer::{NormalizedBatch, SwapNormalizer, SwapRecord};
pub use partition::{partition, work_shares, BlockRange, BlocksBack};
pub use pipeline::{Stats, SwapSync};
pub use progress::{BarReporter, ProgressMeta, ProgressObserver, ProgressReporter, SilentReporter};
pub use rate_limiter::RateLimiter;
pub use rpc::RpcSource;
pub use sink::{PostgresSink, RecordSink};
pub use source::BlockchainSource;
pub use walker::{chunk_windows, ChunkWalker, ChunkWindows};

mod builder;
pub mod config;
pub mod decimals;
mod errors;
pub mod events;
mod normalizer;
mod partition;
mod pipeline;
pub mod prices;
pub mod progress;
mod rate_limiter;
mod rpc;
mod sink;
mod source;
mod walker;
