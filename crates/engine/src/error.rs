//! Scan-time errors
//!
//! Defined numeric behaviors (overflow, float edge cases) are never
//! errors. This enum covers invariant breakage only; a program that
//! passed build-time validation cannot produce either variant.

use thiserror::Error;

use relay_model::TagId;

/// Engine result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Scan execution errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("tag not present in snapshot: {0}")]
    UndeclaredTag(TagId),

    #[error("value kind mismatch on {0} during scan")]
    KindMismatch(TagId),
}
