//! This module contains the primary error type for the extractor's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.
//!
//! # Two-Tier Policy
//!
//! The engine distinguishes two classes of problem. Data-quality gaps — a
//! slot with no candidate name, an evidence source that was never supplied,
//! a template role that cannot be resolved — are **never** errors: every
//! component has an explicit give-up branch that produces an inspectable
//! `Unknown`/zero-confidence/skipped result. Only structural malformation of
//! the mandatory snapshot input is surfaced through these types, because no
//! correctness guarantee is possible on structurally broken input.

pub mod snapshot;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Errors that come from ingesting the mandatory snapshot documents.
    #[error(transparent)]
    Snapshot(#[from] snapshot::Error),
}
