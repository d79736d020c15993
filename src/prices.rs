//! Tick based price helpers
//!
//! Pure functions over ticks. Nothing here touches the network or the sink.

use serde::{Deserialize, Serialize};

/// Price of one token in terms of the other at a given tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickPrice {
    /// `1.0001^tick * scaling`
    pub token1: f64,
    /// `1 / token1`
    pub token0: f64,
}

/// Lower and upper bound around a price
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub lower: f64,
    pub upper: f64,
}

/// Concentrated liquidity tick to price. `scaling` folds in the decimal
/// difference of the two tokens, `10^(decimals0 - decimals1)`
pub fn tick_to_price(tick: f64, scaling: f64) -> TickPrice {
    let token1 = 1.0001f64.powf(tick) * scaling;
    TickPrice {
        token1,
        token0: 1.0 / token1,
    }
}

/// Median of the ticks, averaging the two middle values for even lengths.
/// `None` for an empty slice
pub fn median_tick(ticks: &[f64]) -> Option<f64> {
    if ticks.is_empty() {
        return None;
    }
    let mut sorted = ticks.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 != 0 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    })
}

/// Band of `bounds` (0.1 = 10%) above and below `price`
pub fn price_range(price: f64, bounds: f64) -> PriceRange {
    PriceRange {
        lower: price * (1.0 - bounds),
        upper: price * (1.0 + bounds),
    }
}
