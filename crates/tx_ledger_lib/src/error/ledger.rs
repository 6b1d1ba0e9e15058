use thiserror::Error;

/// Failures of the ledger contract itself. Validation variants are caused by
/// user input, the store variants by races or programming errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),
    #[error("Transaction rejected by node: {0}")]
    RelayRejected(String),
    #[error("Transaction already in ledger: {0}")]
    DuplicateHash(String),
    #[error("Transaction not found: {0}")]
    NotFound(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),
    #[error("Transition {from} -> {to} not allowed for {tx_hash}")]
    InvalidTransition {
        tx_hash: String,
        from: String,
        to: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Node call timed out after {0} ms")]
    Timeout(u64),
    #[error("Node connection error: {0}")]
    Connection(String),
    #[error("Node returned error: {0}")]
    Rpc(String),
    #[error("Invalid node response: {0}")]
    InvalidResponse(String),
}

impl OracleError {
    /// Transient errors are retried by the tracker on the next cycle.
    pub fn is_transient(&self) -> bool {
        matches!(self, OracleError::Timeout(_) | OracleError::Connection(_))
    }
}
