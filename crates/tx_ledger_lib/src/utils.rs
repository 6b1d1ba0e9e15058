use rust_decimal::prelude::Zero;
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use web3::types::U256;

#[derive(Debug, Clone)]
pub struct ConversionError {
    pub msg: String,
}

impl ConversionError {
    pub fn from(msg: String) -> Self {
        Self { msg }
    }
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error during conversion: {}", self.msg)
    }
}

impl Error for ConversionError {}

fn compute_base(num_decimals: u32) -> U256 {
    if num_decimals == 18 {
        U256::exp10(18)
    } else {
        U256::from(10).pow(U256::from(num_decimals))
    }
}

/// Human readable amount, only used for logging. Values not fitting into
/// `Decimal` are reported as an error instead of being truncated.
pub fn u256_to_rust_dec(amount: U256, decimals: Option<u32>) -> Result<Decimal, ConversionError> {
    let num_decimals = decimals.unwrap_or(18);
    if num_decimals > 18 {
        return Err(ConversionError::from(format!(
            "Decimals: {num_decimals} cannot be greater than 18"
        )));
    }
    let dec_base = compute_base(num_decimals);
    let integer_part = amount / dec_base;
    let fractional_part = amount % dec_base;
    if integer_part > U256::from(u64::MAX) {
        return Err(ConversionError::from(format!(
            "Amount {amount} too big to display"
        )));
    }
    let mut dec = Decimal::from(integer_part.as_u64());
    if !fractional_part.is_zero() {
        let fractional = Decimal::from(fractional_part.as_u64());
        dec += fractional / Decimal::from(10u64.pow(num_decimals));
    }
    if dec.is_zero() {
        return Ok(Decimal::zero());
    }
    Ok(dec.normalize())
}

/// Parse a decimal string as stored in the ledger `val` column.
pub fn dec_str_to_u256(val: &str) -> Result<U256, ConversionError> {
    U256::from_dec_str(val).map_err(|err| {
        ConversionError::from(format!("Cannot parse decimal value {val}: {err:?}"))
    })
}

/// `0x` prefixed lowercase hex, `0x0` for zero.
pub fn u256_to_hex(val: U256) -> String {
    format!("{:#x}", val)
}

/// `0x` prefixed lowercase hex, used for nonces on the wire.
pub fn u64_to_hex(val: u64) -> String {
    format!("{:#x}", val)
}

/// Strict hex decoding of `0x` prefixed payloads.
pub fn decode_prefixed_hex(data: &str) -> Result<Vec<u8>, ConversionError> {
    let stripped = data
        .strip_prefix("0x")
        .or_else(|| data.strip_prefix("0X"))
        .ok_or_else(|| ConversionError::from("Missing 0x prefix".to_string()))?;
    hex::decode(stripped).map_err(|err| ConversionError::from(format!("Invalid hex: {err}")))
}
