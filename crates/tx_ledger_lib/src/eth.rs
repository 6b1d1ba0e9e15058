use crate::error::LedgerError;
use sha3::Digest;
use sha3::Keccak256;
use std::str::FromStr;
use web3::types::{Address, H256};

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(Keccak256::digest(data).as_slice());
    out
}

/// Address of a test signing key.
#[cfg(test)]
pub fn get_eth_addr_from_secret(secret_key: &secp256k1::SecretKey) -> Address {
    let public_key =
        secp256k1::PublicKey::from_secret_key(&secp256k1::Secp256k1::new(), secret_key);
    Address::from_slice(&keccak256(&public_key.serialize_uncompressed()[1..65])[12..])
}

/// Accepts only `0x` followed by exactly 40 hex digits, any case.
pub fn parse_address(addr: &str) -> Result<Address, LedgerError> {
    let digits = addr
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::InvalidAddress(addr.to_string()))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LedgerError::InvalidAddress(addr.to_string()));
    }
    Address::from_str(digits).map_err(|_| LedgerError::InvalidAddress(addr.to_string()))
}

/// Accepts only `0x` followed by exactly 64 hex digits, any case.
pub fn parse_tx_hash(tx_hash: &str) -> Result<H256, LedgerError> {
    let digits = tx_hash
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::InvalidFilter(format!("invalid tx hash {tx_hash}")))?;
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LedgerError::InvalidFilter(format!(
            "invalid tx hash {tx_hash}"
        )));
    }
    H256::from_str(digits)
        .map_err(|_| LedgerError::InvalidFilter(format!("invalid tx hash {tx_hash}")))
}

pub fn format_address(addr: &Address) -> String {
    format!("{:#x}", addr)
}

pub fn format_tx_hash(tx_hash: &H256) -> String {
    format!("{:#x}", tx_hash)
}
