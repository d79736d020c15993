//! Fixed point to decimal conversion
//!
//! Onchain amounts are integers in base units. Dividing by `10^decimals` gives
//! the human scaled value. `Decimal` holds a 96 bit mantissa, so very large
//! values give up trailing fractional digits until they fit, and values that do
//! not fit even with no fractional digits are reported as conversion errors.

use alloy::primitives::{I256, U256};
use rust_decimal::Decimal;

use crate::errors::SwapSyncError;

/// Largest scale `Decimal` can represent
const MAX_SCALE: u32 = 28;

/// `raw / 10^decimals` for a signed base unit amount
pub fn signed_to_decimal(raw: I256, decimals: u32) -> Result<Decimal, SwapSyncError> {
    let magnitude = unsigned_to_decimal(raw.unsigned_abs(), decimals)?;
    Ok(if raw.is_negative() { -magnitude } else { magnitude })
}

/// `raw / 10^decimals` for an unsigned base unit amount
pub fn unsigned_to_decimal(raw: U256, decimals: u32) -> Result<Decimal, SwapSyncError> {
    if decimals > MAX_SCALE {
        return Err(SwapSyncError::Conversion(format!(
            "{decimals} decimals exceeds the supported scale of {MAX_SCALE}"
        )));
    }

    let ten = U256::from(10u8);
    let mut mantissa = raw;
    let mut scale = decimals;
    loop {
        if let Some(value) = fit(mantissa, scale) {
            return Ok(value.normalize());
        }
        if scale == 0 {
            return Err(SwapSyncError::Conversion(format!(
                "{raw} with {decimals} decimals does not fit in a decimal"
            )));
        }
        // drop the last fractional digit
        mantissa /= ten;
        scale -= 1;
    }
}

fn fit(mantissa: U256, scale: u32) -> Option<Decimal> {
    let mantissa = u128::try_from(mantissa).ok()?;
    let mantissa = i128::try_from(mantissa).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}
