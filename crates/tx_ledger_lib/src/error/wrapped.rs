use crate::error::{ErrorBag, LedgerError, OracleError};
use std::fmt::{Debug, Display, Formatter};

pub struct TrackerError {
    pub inner: ErrorBag,
    pub msg: Option<String>,
    pub file: &'static str,
    pub line: u32,
}

impl TrackerError {
    pub fn ledger_error(&self) -> Option<&LedgerError> {
        match &self.inner {
            ErrorBag::LedgerError(err) => Some(err),
            _ => None,
        }
    }

    pub fn oracle_error(&self) -> Option<&OracleError> {
        match &self.inner {
            ErrorBag::OracleError(err) => Some(err),
            _ => None,
        }
    }

    pub fn with_msg(mut self, msg: &str) -> Self {
        self.msg = Some(msg.to_string());
        self
    }
}

impl Display for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.msg {
            Some(msg) => write!(f, "{}: {}", msg, self.inner),
            None => write!(f, "{}", self.inner),
        }
    }
}

impl Debug for TrackerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self, self.file, self.line)
    }
}

impl std::error::Error for TrackerError {}
