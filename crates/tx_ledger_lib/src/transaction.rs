use crate::db::model::{TxDao, TxStatus};
use crate::error::LedgerError;
use crate::eth::{format_address, format_tx_hash, keccak256};
use alloy_consensus::transaction::SignerRecoverable;
use alloy_consensus::{Transaction, TxEnvelope, Typed2718};
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{Address as AlloyAddress, TxKind as AlloyTxKind, U256 as AlloyU256};
use web3::types::{Address, H256, U256};

/// Signed transaction decoded from its raw wire form, with the sender
/// recovered from the signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub tx_hash: H256,
    pub tx_type: u8,
    pub chain_id: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

fn malformed<E: std::fmt::Display>(err: E) -> LedgerError {
    LedgerError::MalformedTransaction(err.to_string())
}

fn to_web3_address(addr: AlloyAddress) -> Address {
    Address::from_slice(addr.as_slice())
}

fn to_web3_u256(val: AlloyU256) -> U256 {
    U256::from_big_endian(&val.to_be_bytes::<32>())
}

fn decoded_from_tx<T: Transaction>(
    tx: &T,
    tx_hash: H256,
    tx_type: u8,
    from: AlloyAddress,
) -> DecodedTransaction {
    let to = match tx.kind() {
        AlloyTxKind::Call(addr) => Some(to_web3_address(addr)),
        AlloyTxKind::Create => None,
    };
    let is_dynamic_fee = tx.is_dynamic_fee();
    DecodedTransaction {
        tx_hash,
        tx_type,
        chain_id: tx.chain_id(),
        from: to_web3_address(from),
        to,
        nonce: tx.nonce(),
        value: to_web3_u256(tx.value()),
        gas_limit: tx.gas_limit(),
        gas_price: if is_dynamic_fee {
            None
        } else {
            tx.gas_price().map(U256::from)
        },
        max_fee_per_gas: is_dynamic_fee.then(|| U256::from(tx.max_fee_per_gas())),
        max_priority_fee_per_gas: if is_dynamic_fee {
            tx.max_priority_fee_per_gas().map(U256::from)
        } else {
            None
        },
    }
}

/// Decode a raw signed transaction: legacy (with or without EIP-155 replay
/// protection), EIP-2930 or EIP-1559 envelope. Trailing bytes are rejected.
pub fn decode_signed_transaction(raw: &[u8]) -> Result<DecodedTransaction, LedgerError> {
    if raw.is_empty() {
        return Err(malformed("empty transaction"));
    }
    let envelope = TxEnvelope::decode_2718_exact(raw).map_err(malformed)?;
    let from = envelope
        .recover_signer()
        .map_err(|_| malformed("invalid signature"))?;
    let tx_hash = H256::from(keccak256(raw));
    match envelope {
        TxEnvelope::Legacy(tx) => Ok(decoded_from_tx(tx.tx(), tx_hash, tx.ty(), from)),
        TxEnvelope::Eip2930(tx) => Ok(decoded_from_tx(tx.tx(), tx_hash, tx.ty(), from)),
        TxEnvelope::Eip1559(tx) => Ok(decoded_from_tx(tx.tx(), tx_hash, tx.ty(), from)),
        TxEnvelope::Eip4844(tx) => Err(malformed(format!(
            "unsupported transaction type {}",
            tx.ty()
        ))),
        TxEnvelope::Eip7702(tx) => Err(malformed(format!(
            "unsupported transaction type {}",
            tx.ty()
        ))),
    }
}

/// Checks done before relaying: positive gas parameters, matching chain.
pub fn validate_transaction(
    decoded: &DecodedTransaction,
    expected_chain_id: u64,
) -> Result<(), LedgerError> {
    if decoded.gas_limit == 0 {
        return Err(malformed("gas limit must be positive"));
    }
    let fee = decoded.gas_price.or(decoded.max_fee_per_gas).unwrap_or_default();
    if fee.is_zero() {
        return Err(malformed("gas price must be positive"));
    }
    if let Some(chain_id) = decoded.chain_id {
        if chain_id != expected_chain_id {
            return Err(malformed(format!(
                "chain id {chain_id} does not match {expected_chain_id}"
            )));
        }
    }
    if decoded.nonce > i64::MAX as u64 {
        return Err(malformed("nonce out of range"));
    }
    Ok(())
}

/// Ledger record for a transaction relayed through this service.
pub fn create_submitted_tx(decoded: &DecodedTransaction, raw: &[u8]) -> TxDao {
    let now = chrono::Utc::now();
    TxDao {
        id: 0,
        tx_hash: format_tx_hash(&decoded.tx_hash),
        from_addr: format_address(&decoded.from),
        to_addr: decoded.to.as_ref().map(format_address),
        nonce: decoded.nonce as i64,
        val: decoded.value.to_string(),
        status: TxStatus::Unconfirmed.to_string(),
        block_number: None,
        block_hash: None,
        tx_index: None,
        signed_raw_data: Some(hex::encode(raw)),
        created_date: now,
        unconfirmed_since: now,
        broadcast_date: Some(now),
        broadcast_count: 1,
        error: None,
    }
}


#[cfg(test)]
mod tests {
    use super::test_signing::*;
    use super::*;
    use crate::eth::get_eth_addr_from_secret;
    use secp256k1::SecretKey;
    use std::str::FromStr;

    // example transaction published in EIP-155
    const EIP155_SIGNED_TX: &str = "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83";

    fn test_key() -> SecretKey {
        SecretKey::from_str("e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35")
            .unwrap()
    }

    #[test]
    fn test_decode_eip155_vector() {
        let raw = hex::decode(EIP155_SIGNED_TX).unwrap();
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert_eq!(decoded.chain_id, Some(1));
        assert_eq!(decoded.nonce, 9);
        assert_eq!(decoded.gas_limit, 21000);
        assert_eq!(decoded.gas_price, Some(U256::from(20_000_000_000u64)));
        assert_eq!(decoded.value, U256::exp10(18));
        assert_eq!(
            format_address(&decoded.to.unwrap()),
            "0x3535353535353535353535353535353535353535"
        );
        assert_eq!(
            format_address(&decoded.from),
            "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"
        );
        assert_eq!(decoded.tx_hash, H256::from(keccak256(&raw)));
    }

    #[test]
    fn test_decode_signed_legacy() {
        let sk = test_key();
        let to = Address::from_low_u64_be(0xbeef);
        let value = U256::from(100).pow(U256::from(16));
        let raw = sign_legacy_transfer(&sk, 7, to, value, 1337);
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert_eq!(decoded.from, get_eth_addr_from_secret(&sk));
        assert_eq!(
            format_address(&decoded.from),
            "0x056db290f8ba3250ca64a45d16284d04bc6f5fbf"
        );
        assert_eq!(decoded.to, Some(to));
        assert_eq!(decoded.nonce, 7);
        assert_eq!(decoded.value, value);
        assert_eq!(decoded.chain_id, Some(1337));
        validate_transaction(&decoded, 1337).unwrap();
    }

    #[test]
    fn test_decode_signed_eip1559() {
        let sk = test_key();
        let to = Address::from_low_u64_be(0xcafe);
        let raw = sign_eip1559_transfer(&sk, 3, to, U256::from(5), 1337, U256::from(2_000_000_000u64));
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert_eq!(decoded.tx_type, EIP1559_TX_TYPE);
        assert_eq!(decoded.from, get_eth_addr_from_secret(&sk));
        assert_eq!(decoded.to, Some(to));
        assert_eq!(decoded.nonce, 3);
        assert_eq!(decoded.max_fee_per_gas, Some(U256::from(2_000_000_000u64)));
        assert_eq!(decoded.gas_price, None);
        validate_transaction(&decoded, 1337).unwrap();
    }

    #[test]
    fn test_decode_signed_legacy_pre155() {
        let sk = test_key();
        let to = Address::from_low_u64_be(0xbeef);
        let raw = sign_legacy_pre155_transfer(&sk, 4, to, U256::from(42));
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert_eq!(decoded.tx_type, 0);
        assert_eq!(decoded.chain_id, None);
        assert_eq!(decoded.from, get_eth_addr_from_secret(&sk));
        assert_eq!(decoded.to, Some(to));
        assert_eq!(decoded.nonce, 4);
        assert_eq!(decoded.value, U256::from(42));
        assert_eq!(decoded.gas_price, Some(U256::from(20_000_000_000u64)));
        assert_eq!(decoded.tx_hash, H256::from(keccak256(&raw)));
        // no chain id to compare against, accepted on any chain
        validate_transaction(&decoded, 1337).unwrap();
        validate_transaction(&decoded, 1).unwrap();
    }

    #[test]
    fn test_decode_signed_eip2930() {
        let sk = test_key();
        let to = Address::from_low_u64_be(0xf00d);
        let gas_price = U256::from(3_000_000_000u64);
        let raw = sign_eip2930_transfer(&sk, 11, to, U256::from(9), 1337, gas_price);
        assert_eq!(raw[0], EIP2930_TX_TYPE);
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert_eq!(decoded.tx_type, EIP2930_TX_TYPE);
        assert_eq!(decoded.chain_id, Some(1337));
        assert_eq!(decoded.from, get_eth_addr_from_secret(&sk));
        assert_eq!(decoded.to, Some(to));
        assert_eq!(decoded.nonce, 11);
        assert_eq!(decoded.value, U256::from(9));
        assert_eq!(decoded.gas_limit, 21000);
        assert_eq!(decoded.gas_price, Some(gas_price));
        assert_eq!(decoded.max_fee_per_gas, None);
        assert_eq!(decoded.max_priority_fee_per_gas, None);
        validate_transaction(&decoded, 1337).unwrap();
        assert!(matches!(
            validate_transaction(&decoded, 1),
            Err(LedgerError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_decode_eip2930_zero_gas_price_rejected() {
        let sk = test_key();
        let raw = sign_eip2930_transfer(
            &sk,
            0,
            Address::from_low_u64_be(1),
            U256::one(),
            1337,
            U256::zero(),
        );
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert!(matches!(
            validate_transaction(&decoded, 1337),
            Err(LedgerError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_signed_transaction(&[]),
            Err(LedgerError::MalformedTransaction(_))
        ));
        assert!(decode_signed_transaction(&[0x05, 0xc0]).is_err());
        assert!(decode_signed_transaction(&[0xc3, 0x01, 0x02, 0x03]).is_err());
        let mut raw = hex::decode(EIP155_SIGNED_TX).unwrap();
        raw.push(0x00);
        assert!(decode_signed_transaction(&raw).is_err());
        let mut raw = hex::decode(EIP155_SIGNED_TX).unwrap();
        raw.truncate(raw.len() - 3);
        assert!(decode_signed_transaction(&raw).is_err());
    }

    #[test]
    fn test_validate_transaction() {
        let sk = test_key();
        let raw = sign_legacy_transfer(&sk, 1, Address::from_low_u64_be(1), U256::one(), 1);
        let decoded = decode_signed_transaction(&raw).unwrap();
        assert!(matches!(
            validate_transaction(&decoded, 5),
            Err(LedgerError::MalformedTransaction(_))
        ));
        let mut zero_gas = decoded.clone();
        zero_gas.gas_limit = 0;
        assert!(validate_transaction(&zero_gas, 1).is_err());
        let mut zero_price = decoded;
        zero_price.gas_price = Some(U256::zero());
        assert!(validate_transaction(&zero_price, 1).is_err());
    }

    #[test]
    fn test_create_submitted_tx() {
        let sk = test_key();
        let raw = sign_legacy_transfer(&sk, 2, Address::from_low_u64_be(2), U256::from(10), 1);
        let decoded = decode_signed_transaction(&raw).unwrap();
        let tx = create_submitted_tx(&decoded, &raw);
        assert_eq!(tx.status, "unconfirmed");
        assert_eq!(tx.block_number, None);
        assert_eq!(tx.nonce, 2);
        assert_eq!(tx.val, "10");
        assert_eq!(tx.signed_raw_data, Some(hex::encode(&raw)));
    }
}
