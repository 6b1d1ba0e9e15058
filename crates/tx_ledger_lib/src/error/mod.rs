mod bag;
mod custom;
mod ledger;
mod wrapped;

pub use bag::ErrorBag;
pub use custom::CustomError;
pub use ledger::{LedgerError, OracleError};
pub use wrapped::TrackerError;

/// Export macros for creating errors
mod macros;
