//! The abstract error taxonomy of spec.md §6/§7, as a closed enum.
//!
//! Errors carry no heap-allocated payloads; rendering to human text is a
//! sink's job (cf. `Display`), never the caller's.

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("no error")]
    None,
    #[error("not implemented")]
    NotImplemented,
    #[error("scheduler requested a retry")]
    SchedYield,
    #[error("out of memory")]
    NoMemory,
    #[error("object plugin not loaded")]
    PluginNotLoaded,
    #[error("transaction is closed")]
    TxnClosed,
    #[error("transaction not found")]
    TxnNotFound,
    #[error("transaction was rolled back")]
    TxnRolledBack,
    #[error("key is locked by another transaction")]
    TxnLockedKey,
    #[error("operation class is locked by another transaction")]
    TxnLockedOperation,
    #[error("object already exists")]
    ObjectExists,
    #[error("object not found")]
    ObjectNotFound,
    #[error("object is the wrong type")]
    ObjectWrongType,
    #[error("compare-and-swap mismatch")]
    DataCas,
    #[error("key already exists")]
    DataKeyExists,
    #[error("key not found")]
    DataKeyNotFound,
    #[error("no items available")]
    DataNoItems,
    #[error("division or modulo by zero")]
    NumberDivModByZero,
    #[error("division or modulo overflow")]
    NumberDivModOverflow,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors callers are expected to retry (§7: Transient).
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Error::SchedYield | Error::TxnLockedKey | Error::TxnLockedOperation
        )
    }

    /// True for errors that drive a transaction to ROLLEDBACK (§7: Fatal to a transaction).
    pub fn is_txn_fatal(self) -> bool {
        matches!(self, Error::TxnRolledBack | Error::NoMemory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::SchedYield.is_transient());
        assert!(Error::TxnLockedKey.is_transient());
        assert!(Error::TxnLockedOperation.is_transient());
        assert!(!Error::ObjectNotFound.is_transient());
    }

    #[test]
    fn display_has_no_dynamic_payload() {
        // Every variant formats from a static string literal alone.
        let rendered = format!("{}", Error::DataKeyNotFound);
        assert_eq!(rendered, "key not found");
    }
}
