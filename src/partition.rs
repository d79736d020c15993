//! Block range partitioning
//!
//! Splits the requested history across the configured sources. Faster sources
//! (shorter rate limit interval) take a larger share. The newest blocks go to the
//! first source and every following source continues below the previous one, so
//! the assignments form one contiguous run anchored at the chain head.

use crate::errors::SwapSyncError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An inclusive range of blocks, `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    /// Constructs a range, rejecting `start > end`
    pub fn new(start: u64, end: u64) -> Result<Self, SwapSyncError> {
        if start > end {
            return Err(SwapSyncError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks in the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A block range always holds at least one block
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, block: u64) -> bool {
        self.start <= block && block <= self.end
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// How far back from the chain head to extract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlocksBack {
    /// A fixed number of blocks below the head
    Count(u64),
    /// The entire chain history
    Genesis,
}

impl BlocksBack {
    /// Used when the answer is neither a positive integer nor `genesis`
    pub const DEFAULT: u64 = 50_000;

    /// Parses the operator's answer. Anything unusable falls back to [`Self::DEFAULT`]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.eq_ignore_ascii_case("genesis") {
            return BlocksBack::Genesis;
        }
        match input.parse::<u64>() {
            Ok(count) if count > 0 => BlocksBack::Count(count),
            _ => BlocksBack::Count(Self::DEFAULT),
        }
    }

    /// The number of blocks requested given the current head
    pub fn resolve(&self, latest_block: u64) -> u64 {
        match self {
            BlocksBack::Count(count) => *count,
            BlocksBack::Genesis => latest_block,
        }
    }
}

/// Fraction of the requested blocks each source should take, inversely
/// proportional to its rate limit interval
pub fn work_shares(intervals: &[Duration]) -> Vec<f64> {
    let inverse: Vec<f64> = intervals.iter().map(|i| 1.0 / weight_millis(*i) as f64).collect();
    let total: f64 = inverse.iter().sum();
    inverse.into_iter().map(|i| i / total).collect()
}

/// Assigns each source its slice of `[max(latest - blocks_back, 0), latest]`.
///
/// Every source but the last takes `ceil(blocks_back * share)` blocks below the
/// previous assignment. The last source always reaches down to the oldest
/// requested block, which absorbs whatever the rounding left over. Sources whose
/// share rounds to nothing, or was already consumed by the ones before them, get
/// `None`.
pub fn partition(
    latest_block: u64,
    blocks_back: u64,
    intervals: &[Duration],
) -> Vec<Option<BlockRange>> {
    let oldest = latest_block.saturating_sub(blocks_back);
    let last = intervals.len().saturating_sub(1);

    // None once the oldest block has been handed out
    let mut current_end = Some(latest_block);

    (0..intervals.len())
        .map(|index| {
            let end = current_end?;
            let start = if index == last {
                oldest
            } else {
                let blocks = blocks_for_source(blocks_back, intervals, index);
                (end + 1).saturating_sub(blocks).max(oldest)
            };

            if start > end {
                // a share that rounds to zero blocks
                return None;
            }
            current_end = if start == oldest { None } else { Some(start - 1) };
            Some(BlockRange { start, end })
        })
        .collect()
}

/// `ceil(blocks_back * share_i)`, computed exactly when the interval products fit
fn blocks_for_source(blocks_back: u64, intervals: &[Duration], index: usize) -> u64 {
    // share_i = (1/r_i) / sum(1/r_j) = prod_{j != i} r_j / sum_k prod_{j != k} r_j
    let product_without = |skip: usize| {
        intervals
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != skip)
            .try_fold(1u128, |acc, (_, r)| acc.checked_mul(weight_millis(*r)))
    };

    let exact = (0..intervals.len())
        .map(product_without)
        .try_fold(0u128, |acc, p| acc.checked_add(p?))
        .and_then(|denominator| {
            let numerator = product_without(index)?.checked_mul(blocks_back as u128)?;
            Some(numerator.div_ceil(denominator))
        });

    match exact {
        Some(blocks) => blocks.min(u64::MAX as u128) as u64,
        None => (blocks_back as f64 * work_shares(intervals)[index]).ceil() as u64,
    }
}

/// Zero intervals are weighted as one millisecond
fn weight_millis(interval: Duration) -> u128 {
    interval.as_millis().max(1)
}
