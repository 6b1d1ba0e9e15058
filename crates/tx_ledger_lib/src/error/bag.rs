use crate::error::{CustomError, LedgerError, OracleError};
use crate::utils::ConversionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorBag {
    #[error("Hex decoding error: {0}")]
    HexDecodeError(#[from] hex::FromHexError),
    #[error("sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),
    #[error("conversion error: {0}")]
    ConversionError(#[from] ConversionError),
    #[error("oracle error: {0}")]
    OracleError(#[from] OracleError),
    #[error("{0}")]
    LedgerError(#[from] LedgerError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    CustomError(#[from] CustomError),
}
