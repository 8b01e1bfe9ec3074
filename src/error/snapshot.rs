//! This module contains errors pertaining to the structural validation of
//! the mandatory before/after snapshot documents.

use thiserror::Error;

/// Errors that occur while parsing and normalising a snapshot document in
/// [`crate::snapshot`].
///
/// These are the only hard failures the engine produces. Anything softer —
/// a slot missing from one side of the diff, an empty storage map — is data
/// the pipeline handles gracefully, not an error.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The document was not parsable as JSON at all.
    #[error("Snapshot document is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    /// The document parsed but is missing a required top-level key.
    #[error("Snapshot document is missing the required `{key}` key")]
    MissingKey { key: &'static str },

    /// An address key in the document is not 20 bytes of hex.
    #[error("`{address}` is not a valid contract address")]
    InvalidAddress { address: String },

    /// A storage slot key could not be parsed as a 256-bit unsigned integer.
    #[error("`{key}` is not a valid storage slot key for contract {address}")]
    InvalidSlotKey { address: String, key: String },

    /// A storage slot value is not a 32-byte hex word.
    #[error("`{value}` is not a valid 32-byte storage value at slot {key} of {address}")]
    InvalidSlotValue {
        address: String,
        key: String,
        value: String,
    },

    /// A native balance field could not be parsed as an unsigned decimal.
    #[error("`{value}` is not a valid wei balance for contract {address}")]
    InvalidBalance { address: String, value: String },
}

/// The result type for methods that ingest snapshot documents.
pub type Result<T> = std::result::Result<T, Error>;
