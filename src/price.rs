//! Price conversion between human-readable amounts and smallest units
//!
//! Human prices (`"$0.01"`, `"0.01"`) are parsed with decimal arithmetic and
//! scaled by 10^6; all downstream comparisons and arithmetic happen on
//! smallest-unit decimal strings through 256-bit integers.

use std::cmp::Ordering;
use std::str::FromStr;

use ethereum_types::U256;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::STABLECOIN_DECIMALS;
use crate::{Result, X402Error};

/// Minimum accepted price in currency units
const PRICE_FLOOR: &str = "0.001";

/// Options for [`format_price`]
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Prefix the result with `$`
    pub symbol: bool,
    /// Number of decimal places (capped at 6)
    pub decimals: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            symbol: true,
            decimals: 2,
        }
    }
}

/// Parse a human-readable price into a smallest-unit decimal string.
///
/// Accepts an optional leading `$`. Rejects non-numeric and negative input.
pub fn parse_price(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let bare = trimmed.strip_prefix('$').unwrap_or(trimmed);

    let amount = Decimal::from_str(bare)
        .map_err(|_| X402Error::price(format!("not a number: {trimmed}")))?;
    to_smallest_units(amount)
}

/// Parse a floating-point price into a smallest-unit decimal string
pub fn parse_price_f64(input: f64) -> Result<String> {
    let amount = Decimal::from_f64(input)
        .ok_or_else(|| X402Error::price(format!("not a number: {input}")))?;
    to_smallest_units(amount)
}

fn to_smallest_units(amount: Decimal) -> Result<String> {
    if amount.is_sign_negative() {
        return Err(X402Error::price(format!("negative price: {amount}")));
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(STABLECOIN_DECIMALS)))
        .ok_or_else(|| X402Error::price(format!("price out of range: {amount}")))?;
    let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    Ok(rounded.normalize().to_string())
}

/// Format a smallest-unit decimal string as a human-readable price
pub fn format_price(smallest: &str, options: FormatOptions) -> Result<String> {
    let units = Decimal::from_str(smallest)
        .map_err(|_| X402Error::price(format!("not a smallest-unit amount: {smallest}")))?;
    if units.is_sign_negative() || units.fract() != Decimal::ZERO {
        return Err(X402Error::price(format!(
            "not a smallest-unit amount: {smallest}"
        )));
    }

    let decimals = options.decimals.min(STABLECOIN_DECIMALS);
    let amount = units / Decimal::from(10u64.pow(STABLECOIN_DECIMALS));
    let rounded =
        amount.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);

    let rendered = format!("{rounded:.prec$}", prec = decimals as usize);
    if options.symbol {
        Ok(format!("${rendered}"))
    } else {
        Ok(rendered)
    }
}

/// Parse a price and enforce the protocol floor of 0.001 currency units
pub fn validate_price(input: &str) -> Result<String> {
    let smallest = parse_price(input)?;
    let floor = parse_price(PRICE_FLOOR)?;
    if smallest_cmp(&smallest, &floor)? == Ordering::Less {
        return Err(X402Error::price(format!(
            "price below minimum of {PRICE_FLOOR}: {input}"
        )));
    }
    Ok(smallest)
}

/// Parse a smallest-unit decimal string into a 256-bit integer
pub fn to_u256(smallest: &str) -> Result<U256> {
    U256::from_dec_str(smallest)
        .map_err(|_| X402Error::price(format!("not a smallest-unit amount: {smallest}")))
}

/// Compare two smallest-unit amounts
pub fn smallest_cmp(a: &str, b: &str) -> Result<Ordering> {
    Ok(to_u256(a)?.cmp(&to_u256(b)?))
}

/// Add two smallest-unit amounts
pub fn smallest_add(a: &str, b: &str) -> Result<String> {
    let sum = to_u256(a)?
        .checked_add(to_u256(b)?)
        .ok_or_else(|| X402Error::price("amount overflow".to_string()))?;
    Ok(sum.to_string())
}
