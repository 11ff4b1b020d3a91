//! Code generation boundary
//!
//! Lowers a finished program to a standalone polling loop for targets
//! with no runtime engine. Backends must reproduce the scan engine's
//! ordering and overflow rules exactly: conditions from pre-scan state
//! only, effects in source order, fixed-width wrap/saturate arithmetic.

pub mod c;

use thiserror::Error;

use relay_model::{AddressMap, Program};

pub use c::CBackend;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("emission failed: {0}")]
    Emit(#[from] std::fmt::Error),
}

pub type CodegenResult<T> = std::result::Result<T, CodegenError>;

/// A code-generation target. Emission is deterministic: the same
/// program and map produce byte-identical output.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// File extension of the emitted artifact, without the dot.
    fn file_extension(&self) -> &'static str;

    fn generate(&self, program: &Program, map: &AddressMap) -> CodegenResult<String>;
}
