//! Build-time faults
//!
//! Malformed construction fails here, at program build time. Nothing in
//! this enum is ever deferred to scan time.

use thiserror::Error;

use crate::tag::TagId;
use crate::value::ValueKind;

/// Build result type.
pub type BuildResult<T> = std::result::Result<T, BuildError>;

/// Program construction errors.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("tag already declared: {0}")]
    DuplicateTag(String),

    #[error("undeclared tag: {0}")]
    UndeclaredTag(TagId),

    #[error("unknown tag name: {0}")]
    UnknownTagName(String),

    #[error("kind mismatch on {tag}: expected {expected}, found {found}")]
    KindMismatch {
        tag: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("condition position requires a bool tag, {tag} is {found}")]
    ConditionNotBool { tag: String, found: ValueKind },

    #[error("comparison operands differ in kind: {lhs} vs {rhs}")]
    ComparisonKindMismatch { lhs: ValueKind, rhs: ValueKind },

    #[error("{instruction} requires a {expected} tag, {tag} is {found}")]
    BindingKindMismatch {
        instruction: &'static str,
        tag: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("{instruction} preset {preset} on {tag} exceeds register width (max {max})")]
    PresetOutOfRange {
        instruction: &'static str,
        tag: String,
        preset: u64,
        max: u64,
    },

    #[error("no rung is open")]
    NoOpenRung,

    #[error("a rung is already open; rungs do not nest")]
    RungAlreadyOpen,

    #[error("end_rung with {0} unclosed branch(es)")]
    UnclosedBranch(usize),

    #[error("end_branch with no open branch")]
    NoOpenBranch,

    #[error("finish with an unclosed rung")]
    UnclosedRung,

    #[error("unknown target profile: {0}")]
    UnknownProfile(String),
}
