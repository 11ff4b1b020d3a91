//! Relay program model
//!
//! Defines the static side of the simulator: typed tags, values with
//! hardware-width arithmetic, the rung/branch/instruction program model,
//! the validating builder, target numeric profiles and hardware address
//! maps. Everything here is immutable once built; execution lives in
//! `relay-engine`.

pub mod address;
pub mod builder;
pub mod doc;
pub mod error;
pub mod profile;
pub mod program;
pub mod tag;
pub mod value;

pub use address::{AddressMap, HwAddress, Region};
pub use builder::ProgramBuilder;
pub use doc::ProgramDoc;
pub use error::{BuildError, BuildResult};
pub use profile::{IntWidth, OverflowPolicy, TargetProfile};
pub use program::{
    BodyId, Branch, CmpOp, CountDirection, EdgeKind, Element, Expr, Instruction, Operand, Program,
    Rung, TimerKind,
};
pub use tag::{TagDecl, TagId, TagSet};
pub use value::{Value, ValueKind};
