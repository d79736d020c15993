use alloy::primitives::{B256, I256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use serde::{Deserialize, Serialize};

sol!(
    #[derive(Debug)]
    contract UniswapV3Pool {
        event Swap(address indexed sender, address indexed recipient, int256 amount0, int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick);
    }
);

/// A decoded pool swap, still in the chain's native integer domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSwapEvent {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: Option<u64>,
    /// Token0 delta in token0 base units
    pub amount0: I256,
    /// Token1 delta in token1 base units
    pub amount1: I256,
    pub sqrt_price_x96: U256,
    pub liquidity: U256,
    pub tick: i32,
}

impl TryFrom<&Log> for RawSwapEvent {
    type Error = String;

    fn try_from(log: &Log) -> Result<Self, Self::Error> {
        let block_number = log.block_number.ok_or("log is missing block number")?;
        let transaction_hash = log
            .transaction_hash
            .ok_or("log is missing transaction hash")?;

        let decoded = log
            .log_decode::<UniswapV3Pool::Swap>()
            .map_err(|e| format!("failed to decode swap log: {e}"))?;
        let swap = decoded.inner.data;

        let tick = i32::try_from(swap.tick).map_err(|e| format!("tick out of range: {e}"))?;

        Ok(Self {
            block_number,
            transaction_hash,
            log_index: log.log_index,
            amount0: swap.amount0,
            amount1: swap.amount1,
            sqrt_price_x96: U256::from(swap.sqrtPriceX96),
            liquidity: U256::from(swap.liquidity),
            tick,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Log as PrimitiveLog};
    use alloy::sol_types::SolEvent;

    #[test]
    fn test_decode_swap_log() {
        let swap = UniswapV3Pool::Swap {
            sender: address!("1111111111111111111111111111111111111111"),
            recipient: address!("2222222222222222222222222222222222222222"),
            amount0: I256::try_from(-2_500_000i64).unwrap(),
            amount1: I256::try_from(1_000_000_000_000_000i64).unwrap(),
            sqrtPriceX96: "1461446703485210103287273052203988822378723970341"
                .parse::<U256>()
                .unwrap()
                .to(),
            liquidity: 77u128.try_into().unwrap(),
            tick: (-201_000i32).try_into().unwrap(),
        };
        let pool = address!("45dda9cb7c25131df268515131f647d726f50608");
        let log = Log {
            inner: PrimitiveLog {
                address: pool,
                data: swap.encode_log_data(),
            },
            block_number: Some(42),
            transaction_hash: Some(B256::repeat_byte(0xab)),
            log_index: Some(3),
            ..Default::default()
        };

        let raw = RawSwapEvent::try_from(&log).unwrap();
        assert_eq!(raw.block_number, 42);
        assert_eq!(raw.log_index, Some(3));
        assert_eq!(raw.amount0, I256::try_from(-2_500_000i64).unwrap());
        assert_eq!(raw.liquidity, U256::from(77u64));
        assert_eq!(raw.tick, -201_000);
    }

    #[test]
    fn test_log_without_block_is_rejected() {
        let log = Log::default();
        assert!(RawSwapEvent::try_from(&log).is_err());
    }
}
