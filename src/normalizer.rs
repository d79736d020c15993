//! Raw swap to record normalization
//!
//! A chunk of raw swaps is normalized in two steps: the distinct blocks it
//! touches are resolved to header timestamps through the owning source, then
//! every swap is rescaled into decimals. A swap that fails to convert is dropped
//! on its own and the rest of the chunk carries on.

use alloy::primitives::B256;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::decimals::{signed_to_decimal, unsigned_to_decimal};
use crate::errors::SwapSyncError;
use crate::events::RawSwapEvent;
use crate::prices::{median_tick, tick_to_price};
use crate::source::BlockchainSource;

/// A swap ready to be persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub block_number: u64,
    pub transaction_hash: B256,
    /// Header time of the containing block
    pub timestamp: DateTime<Utc>,
    pub token0_amount: Decimal,
    pub token1_amount: Decimal,
    pub sqrt_price_x96: Decimal,
    pub liquidity: Decimal,
    pub tick: i32,
}

impl SwapRecord {
    /// RFC 3339 timestamp with millisecond precision, `2024-03-01T12:00:00.000Z`
    pub fn iso_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Result of normalizing one chunk
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub records: Vec<SwapRecord>,
    /// Swaps dropped because a field could not be converted
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct SwapNormalizer {
    pool: PoolConfig,
}

impl SwapNormalizer {
    pub fn new(pool: PoolConfig) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Looks up the header timestamp of every distinct block in `events`.
    /// Lookups run concurrently and are paced by the source's rate limiter
    pub async fn resolve_timestamps(
        &self,
        source: &dyn BlockchainSource,
        events: &[RawSwapEvent],
    ) -> Result<HashMap<u64, u64>, SwapSyncError> {
        let blocks: BTreeSet<u64> = events.iter().map(|e| e.block_number).collect();

        let timestamps = try_join_all(blocks.into_iter().map(|block| async move {
            let timestamp = source.get_block_timestamp(block).await?;
            Ok::<_, SwapSyncError>((block, timestamp))
        }))
        .await?;

        Ok(timestamps.into_iter().collect())
    }

    /// Converts every swap, dropping the ones that do not convert
    pub fn normalize(
        &self,
        events: &[RawSwapEvent],
        timestamps: &HashMap<u64, u64>,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for event in events {
            match self.normalize_event(event, timestamps) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    warn!(
                        block = event.block_number,
                        tx = %event.transaction_hash,
                        "Dropping swap: {e}"
                    );
                    batch.dropped += 1;
                }
            }
        }

        if let Some(tick) = median_tick(
            &batch
                .records
                .iter()
                .map(|r| r.tick as f64)
                .collect::<Vec<_>>(),
        ) {
            let price = tick_to_price(tick, self.pool.price_scaling());
            debug!(
                swaps = batch.records.len(),
                median_tick = tick,
                "Median {} per {}: {:.4}",
                self.pool.token0_symbol,
                self.pool.token1_symbol,
                price.token0
            );
        }

        batch
    }

    /// Converts one swap
    pub fn normalize_event(
        &self,
        event: &RawSwapEvent,
        timestamps: &HashMap<u64, u64>,
    ) -> Result<SwapRecord, SwapSyncError> {
        let seconds = timestamps.get(&event.block_number).ok_or_else(|| {
            SwapSyncError::Conversion(format!("no timestamp for block {}", event.block_number))
        })?;
        let timestamp = i64::try_from(*seconds)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| SwapSyncError::Conversion(format!("invalid timestamp {seconds}")))?;

        Ok(SwapRecord {
            block_number: event.block_number,
            transaction_hash: event.transaction_hash,
            timestamp,
            token0_amount: signed_to_decimal(event.amount0, self.pool.token0_decimals)?,
            token1_amount: signed_to_decimal(event.amount1, self.pool.token1_decimals)?,
            sqrt_price_x96: unsigned_to_decimal(event.sqrt_price_x96, self.pool.sqrt_price_decimals)?,
            liquidity: unsigned_to_decimal(event.liquidity, self.pool.liquidity_decimals)?,
            tick: event.tick,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, I256, U256};
    use std::str::FromStr;

    fn swap(block: u64, amount0: i64, tick: i32) -> RawSwapEvent {
        RawSwapEvent {
            block_number: block,
            transaction_hash: B256::repeat_byte(block as u8),
            log_index: Some(0),
            amount0: I256::try_from(amount0).unwrap(),
            amount1: I256::try_from(-500_000_000_000_000_000i64).unwrap(),
            sqrt_price_x96: U256::from(1_000_000_000_000_000_000u64),
            liquidity: U256::from(123_456u64),
            tick,
        }
    }

    #[test]
    fn test_normalize_scales_fields() {
        let normalizer = SwapNormalizer::new(PoolConfig::new(Address::ZERO));
        let timestamps = HashMap::from([(10u64, 1_700_000_000u64)]);

        let record = normalizer
            .normalize_event(&swap(10, 1_250_000, -201_000), &timestamps)
            .unwrap();
        assert_eq!(record.token0_amount, Decimal::from_str("1.25").unwrap());
        assert_eq!(record.token1_amount, Decimal::from_str("-0.5").unwrap());
        assert_eq!(record.sqrt_price_x96, Decimal::ONE);
        assert_eq!(record.liquidity, Decimal::from(123_456));
        assert_eq!(record.tick, -201_000);
        assert_eq!(record.iso_timestamp(), "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_failed_conversion_only_drops_that_swap() {
        let normalizer = SwapNormalizer::new(PoolConfig::new(Address::ZERO));
        let timestamps = HashMap::from([(10u64, 1_700_000_000u64), (11, 1_700_000_002)]);

        let mut broken = swap(11, 1, 0);
        broken.liquidity = U256::MAX;
        let events = vec![swap(11, 2, 0), broken, swap(10, 3, 0)];

        let batch = normalizer.normalize(&events, &timestamps);
        assert_eq!(batch.dropped, 1);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].block_number, 11);
        assert_eq!(batch.records[1].block_number, 10);
    }

    #[test]
    fn test_missing_timestamp_is_a_conversion_error() {
        let normalizer = SwapNormalizer::new(PoolConfig::new(Address::ZERO));
        let err = normalizer
            .normalize_event(&swap(10, 1, 0), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, SwapSyncError::Conversion(_)));
    }
}
