//! Ladder program model
//!
//! A program is an ordered sequence of rungs. Each rung carries a
//! condition expression and an ordered body of elements; an element is
//! either an instruction or a nested branch at its textual position. A
//! branch is rung-like: its own condition, its own body.
//!
//! Condition composition (fixed here, executed in `relay-engine`):
//! for a node `N` with condition `C` and child branches `b1..bn`,
//! `alt(N) = C OR alt(b1) OR … OR alt(bn)`. Instructions in `N`'s own
//! body fire iff `ctx(N) AND alt(N)`; instructions in a branch `b` fire
//! iff `ctx(N) AND C AND alt(b)`. The series context `ctx` of a
//! top-level rung is true; for a branch it is the parent's context ANDed
//! with the parent's own condition.
//!
//! Every rung and branch owns a dense [`BodyId`] so the engine can
//! compute all fires flags in Phase 1 and look them up in Phase 2.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::HwAddress;
use crate::profile::TargetProfile;
use crate::tag::{TagId, TagSet};
use crate::value::Value;

/// Dense index of a rung or branch body. Allocated in pre-order during
/// construction; Phase-1 results are a `Vec<bool>` over this space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl BodyId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body{}", self.0)
    }
}

/// Comparison operator in a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Operand of a comparison or value write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Tag(TagId),
    Const(Value),
}

/// Condition expression tree, evaluated in Phase 1 against the input
/// snapshot only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Read a bool tag (examine-if-closed).
    Tag(TagId),
    /// Negation (examine-if-open).
    Not(Box<Expr>),
    /// True when all sub-expressions are true. Empty = true.
    All(Vec<Expr>),
    /// True when any sub-expression is true. Empty = false.
    Any(Vec<Expr>),
    /// Same-kind comparison of two operands.
    Cmp {
        op: CmpOp,
        lhs: Operand,
        rhs: Operand,
    },
}

impl Expr {
    /// Constant-true condition (an empty series path).
    pub fn always() -> Expr {
        Expr::All(Vec::new())
    }
}

/// Timer accumulation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    /// Accumulator clears whenever the condition is false.
    OnDelay,
    /// Accumulator holds while the condition is false; only an explicit
    /// reset clears it.
    Retentive,
}

/// Which transition of the rung condition a counter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Rising,
    Falling,
}

/// Count direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountDirection {
    Up,
    Down,
}

/// A pure effect description over a target tag. The boolean "fires" flag
/// for the owning rung/branch body is computed in Phase 1 and supplied
/// by the engine in Phase 2.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    /// Non-sticky energize: tag follows fires every scan.
    Out { tag: TagId },
    /// Sticky set: latched and true once fired, until reset.
    Latch { tag: TagId },
    /// Clear the latch; also zeroes timer/counter bookkeeping on the tag.
    Reset { tag: TagId },
    /// One-shot value write: while fires, assign and mark pending. The
    /// value persists like any tag value; only the pending flag is
    /// cleared at the scan boundary.
    Write { tag: TagId, value: Operand },
    /// Elapsed-time accumulation against a preset, in target time-base
    /// counts at the target register width. Done bit on the tag.
    Timer {
        tag: TagId,
        preset: u64,
        kind: TimerKind,
    },
    /// Edge-counting against a preset at the target register width.
    /// Done bit on the tag.
    Counter {
        tag: TagId,
        preset: u64,
        edge: EdgeKind,
        direction: CountDirection,
    },
    /// Write the tag's value to a remote address over the wire surface,
    /// blocking within this scan.
    Send { tag: TagId, address: HwAddress },
    /// Read a remote address into the tag, blocking within this scan. On
    /// exchange failure the tag is left unchanged.
    Receive { tag: TagId, address: HwAddress },
}

impl Instruction {
    /// The tag this instruction targets.
    pub fn target(&self) -> TagId {
        match self {
            Instruction::Out { tag }
            | Instruction::Latch { tag }
            | Instruction::Reset { tag }
            | Instruction::Write { tag, .. }
            | Instruction::Timer { tag, .. }
            | Instruction::Counter { tag, .. }
            | Instruction::Send { tag, .. }
            | Instruction::Receive { tag, .. } => *tag,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Out { .. } => "out",
            Instruction::Latch { .. } => "latch",
            Instruction::Reset { .. } => "reset",
            Instruction::Write { .. } => "write",
            Instruction::Timer { .. } => "timer",
            Instruction::Counter { .. } => "counter",
            Instruction::Send { .. } => "send",
            Instruction::Receive { .. } => "receive",
        }
    }
}

/// Body element: an instruction or a nested branch, in textual order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Instruction(Instruction),
    Branch(Branch),
}

/// A nested alternate condition ORed into its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: Expr,
    pub body: BodyId,
    pub elements: Vec<Element>,
}

/// One rung: condition plus ordered body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rung {
    pub condition: Expr,
    pub body: BodyId,
    pub elements: Vec<Element>,
}

/// A validated, immutable ladder program.
///
/// Built once via [`crate::ProgramBuilder`]; execution never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    tags: TagSet,
    rungs: Vec<Rung>,
    profile: TargetProfile,
    body_count: u32,
}

impl Program {
    pub(crate) fn new(
        tags: TagSet,
        rungs: Vec<Rung>,
        profile: TargetProfile,
        body_count: u32,
    ) -> Self {
        Self {
            tags,
            rungs,
            profile,
            body_count,
        }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }

    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// Number of condition bodies (rungs plus branches).
    pub fn body_count(&self) -> usize {
        self.body_count as usize
    }

    /// All instructions in source order, with their owning body.
    pub fn instructions(&self) -> impl Iterator<Item = (BodyId, &Instruction)> {
        fn walk<'a>(
            body: BodyId,
            elements: &'a [Element],
            out: &mut Vec<(BodyId, &'a Instruction)>,
        ) {
            for element in elements {
                match element {
                    Element::Instruction(instr) => out.push((body, instr)),
                    Element::Branch(branch) => walk(branch.body, &branch.elements, out),
                }
            }
        }
        let mut out = Vec::new();
        for rung in &self.rungs {
            walk(rung.body, &rung.elements, &mut out);
        }
        out.into_iter()
    }
}
