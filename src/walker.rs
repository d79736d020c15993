use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::errors::SwapSyncError;
use crate::events::RawSwapEvent;
use crate::partition::BlockRange;
use crate::source::BlockchainSource;

/// Windows of at most `chunk_size` blocks covering `range` from its end down to its start
pub fn chunk_windows(range: BlockRange, chunk_size: u64) -> ChunkWindows {
    ChunkWindows {
        start: range.start(),
        next_end: Some(range.end()),
        chunk_size: chunk_size.max(1),
    }
}

#[derive(Debug, Clone)]
pub struct ChunkWindows {
    start: u64,
    next_end: Option<u64>,
    chunk_size: u64,
}

impl Iterator for ChunkWindows {
    type Item = BlockRange;

    fn next(&mut self) -> Option<BlockRange> {
        let end = self.next_end?;
        let from = end
            .saturating_sub(self.chunk_size - 1)
            .max(self.start);
        self.next_end = if from > self.start { Some(from - 1) } else { None };
        BlockRange::new(from, end).ok()
    }
}

/// Walks one source's range newest to oldest, one chunk at a time
pub struct ChunkWalker {
    source: Arc<dyn BlockchainSource>,
}

impl ChunkWalker {
    pub fn new(source: Arc<dyn BlockchainSource>) -> Self {
        Self { source }
    }

    /// Fetches every chunk of `[start_block, end_block]` and hands it to `on_chunk`
    /// together with the number of blocks it covered. The next chunk is only
    /// requested once `on_chunk` has finished, and an error from either the source
    /// or `on_chunk` ends the walk. Returns the number of chunks walked
    pub async fn walk<F, Fut>(
        &self,
        start_block: u64,
        end_block: u64,
        mut on_chunk: F,
    ) -> Result<u64, SwapSyncError>
    where
        F: FnMut(Vec<RawSwapEvent>, u64) -> Fut,
        Fut: Future<Output = Result<(), SwapSyncError>>,
    {
        let range = BlockRange::new(start_block, end_block)?;
        let mut chunks = 0;

        for window in chunk_windows(range, self.source.chunk_size()) {
            let mut events = self
                .source
                .get_events_in_range(window.start(), window.end())
                .await?;
            events.sort_by(|a, b| b.block_number.cmp(&a.block_number));

            debug!(
                source = %self.source.name(),
                from_block = window.start(),
                to_block = window.end(),
                events = events.len(),
                "Fetched chunk"
            );
            on_chunk(events, window.len()).await?;
            chunks += 1;
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{B256, I256, U256};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn windows(start: u64, end: u64, chunk: u64) -> Vec<(u64, u64)> {
        chunk_windows(BlockRange::new(start, end).unwrap(), chunk)
            .map(|w| (w.start(), w.end()))
            .collect()
    }

    #[test]
    fn test_windows_include_remainder() {
        assert_eq!(windows(700, 800, 500), vec![(700, 800)]);
        assert_eq!(windows(0, 10, 4), vec![(7, 10), (3, 6), (0, 2)]);
        assert_eq!(windows(5, 5, 100), vec![(5, 5)]);
        assert_eq!(windows(0, 0, 1), vec![(0, 0)]);
    }

    #[test]
    fn test_windows_cover_range_descending() {
        for (start, end, chunk) in [(0, 999, 1000), (1, 1000, 7), (42, 10_000, 333), (0, 64, 1)] {
            let all = windows(start, end, chunk);
            assert_eq!(all.first().map(|w| w.1), Some(end));
            assert_eq!(all.last().map(|w| w.0), Some(start));
            for pair in all.windows(2) {
                assert_eq!(pair[0].0, pair[1].1 + 1);
            }
            let covered: u64 = all.iter().map(|(s, e)| e - s + 1).sum();
            assert_eq!(covered, end - start + 1);
            assert!(all.iter().all(|(s, e)| e - s < chunk));
        }
    }

    #[derive(Default)]
    struct RecordingSource {
        calls: Mutex<Vec<(u64, u64)>>,
    }

    #[async_trait]
    impl BlockchainSource for RecordingSource {
        fn name(&self) -> &str {
            "recording"
        }

        fn chunk_size(&self) -> u64 {
            50
        }

        fn rate_limit(&self) -> Duration {
            Duration::ZERO
        }

        async fn get_events_in_range(
            &self,
            start_block: u64,
            end_block: u64,
        ) -> Result<Vec<RawSwapEvent>, SwapSyncError> {
            self.calls.lock().push((start_block, end_block));
            // oldest first, the walker reorders
            Ok([start_block, end_block]
                .into_iter()
                .map(|block| RawSwapEvent {
                    block_number: block,
                    transaction_hash: B256::ZERO,
                    log_index: None,
                    amount0: I256::ZERO,
                    amount1: I256::ZERO,
                    sqrt_price_x96: U256::ZERO,
                    liquidity: U256::ZERO,
                    tick: 0,
                })
                .collect())
        }

        async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, SwapSyncError> {
            Ok(block_number)
        }

        async fn get_latest_block_number(&self) -> Result<u64, SwapSyncError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_walk_hands_over_sorted_chunks() {
        let source = Arc::new(RecordingSource::default());
        let walker = ChunkWalker::new(source.clone());

        let mut seen = Vec::new();
        let chunks = walker
            .walk(100, 219, |events, blocks| {
                seen.push((events.iter().map(|e| e.block_number).collect::<Vec<_>>(), blocks));
                async { Ok(()) }
            })
            .await
            .unwrap();

        assert_eq!(chunks, 3);
        assert_eq!(*source.calls.lock(), vec![(170, 219), (120, 169), (100, 119)]);
        assert_eq!(
            seen,
            vec![
                (vec![219, 170], 50),
                (vec![169, 120], 50),
                (vec![119, 100], 20)
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_range_makes_no_calls() {
        let source = Arc::new(RecordingSource::default());
        let walker = ChunkWalker::new(source.clone());

        let err = walker
            .walk(500, 499, |_, _| async { Ok(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, SwapSyncError::InvalidRange { start: 500, end: 499 }));
        assert!(source.calls.lock().is_empty());
    }
}
