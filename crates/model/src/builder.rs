//! Program construction
//!
//! Explicit builder replacing scoped-block construction: `begin_rung` /
//! `begin_branch` / `end_branch` / `end_rung`, with structural and kind
//! validation performed at each call. A malformed program never reaches
//! the scan engine.

use crate::address::HwAddress;
use crate::error::{BuildError, BuildResult};
use crate::profile::TargetProfile;
use crate::program::{
    BodyId, Branch, CountDirection, EdgeKind, Element, Expr, Instruction, Operand, Program,
    Rung, TimerKind,
};
use crate::tag::{TagId, TagSet};
use crate::value::{Value, ValueKind};

struct Frame {
    condition: Expr,
    body: BodyId,
    elements: Vec<Element>,
}

/// Builder for a validated [`Program`].
///
/// Tags are declared first (or interleaved); rungs are appended in
/// order. The frame stack tracks the open rung and any open branches;
/// every structural fault is reported at the offending call.
pub struct ProgramBuilder {
    tags: TagSet,
    profile: TargetProfile,
    rungs: Vec<Rung>,
    stack: Vec<Frame>,
    next_body: u32,
}

impl ProgramBuilder {
    pub fn new(profile: TargetProfile) -> Self {
        Self {
            tags: TagSet::new(),
            profile,
            rungs: Vec::new(),
            stack: Vec::new(),
            next_body: 0,
        }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Declare a tag with the kind's default initial value.
    pub fn declare(&mut self, name: &str, kind: ValueKind) -> BuildResult<TagId> {
        self.tags.declare(name, kind)
    }

    /// Declare a tag with an explicit initial value.
    pub fn declare_init(&mut self, name: &str, kind: ValueKind, initial: Value) -> BuildResult<TagId> {
        self.tags.declare_init(name, kind, initial)
    }

    /// Open a rung. Fails if a rung is already open.
    pub fn begin_rung(&mut self, condition: Expr) -> BuildResult<()> {
        if !self.stack.is_empty() {
            return Err(BuildError::RungAlreadyOpen);
        }
        self.check_expr(&condition)?;
        let body = self.alloc_body();
        self.stack.push(Frame {
            condition,
            body,
            elements: Vec::new(),
        });
        Ok(())
    }

    /// Open a branch inside the current rung or branch.
    pub fn begin_branch(&mut self, condition: Expr) -> BuildResult<()> {
        if self.stack.is_empty() {
            return Err(BuildError::NoOpenRung);
        }
        self.check_expr(&condition)?;
        let body = self.alloc_body();
        self.stack.push(Frame {
            condition,
            body,
            elements: Vec::new(),
        });
        Ok(())
    }

    /// Close the innermost branch, attaching it at its textual position
    /// in the parent body.
    pub fn end_branch(&mut self) -> BuildResult<()> {
        if self.stack.len() < 2 {
            return Err(BuildError::NoOpenBranch);
        }
        let frame = self.stack.pop().ok_or(BuildError::NoOpenBranch)?;
        let branch = Branch {
            condition: frame.condition,
            body: frame.body,
            elements: frame.elements,
        };
        self.current()?.elements.push(Element::Branch(branch));
        Ok(())
    }

    /// Close the open rung. All branches must be closed first.
    pub fn end_rung(&mut self) -> BuildResult<()> {
        match self.stack.len() {
            0 => Err(BuildError::NoOpenRung),
            1 => {
                let frame = self.stack.pop().ok_or(BuildError::NoOpenRung)?;
                self.rungs.push(Rung {
                    condition: frame.condition,
                    body: frame.body,
                    elements: frame.elements,
                });
                Ok(())
            }
            n => Err(BuildError::UnclosedBranch(n - 1)),
        }
    }

    /// Append a validated instruction to the open body.
    pub fn instruction(&mut self, instruction: Instruction) -> BuildResult<()> {
        self.check_instruction(&instruction)?;
        self.current()?
            .elements
            .push(Element::Instruction(instruction));
        Ok(())
    }

    pub fn out(&mut self, tag: TagId) -> BuildResult<()> {
        self.instruction(Instruction::Out { tag })
    }

    pub fn latch(&mut self, tag: TagId) -> BuildResult<()> {
        self.instruction(Instruction::Latch { tag })
    }

    pub fn reset(&mut self, tag: TagId) -> BuildResult<()> {
        self.instruction(Instruction::Reset { tag })
    }

    pub fn write(&mut self, tag: TagId, value: Operand) -> BuildResult<()> {
        self.instruction(Instruction::Write { tag, value })
    }

    pub fn timer(&mut self, tag: TagId, preset: u64, kind: TimerKind) -> BuildResult<()> {
        self.instruction(Instruction::Timer { tag, preset, kind })
    }

    pub fn counter(
        &mut self,
        tag: TagId,
        preset: u64,
        edge: EdgeKind,
        direction: CountDirection,
    ) -> BuildResult<()> {
        self.instruction(Instruction::Counter {
            tag,
            preset,
            edge,
            direction,
        })
    }

    pub fn send(&mut self, tag: TagId, address: HwAddress) -> BuildResult<()> {
        self.instruction(Instruction::Send { tag, address })
    }

    pub fn receive(&mut self, tag: TagId, address: HwAddress) -> BuildResult<()> {
        self.instruction(Instruction::Receive { tag, address })
    }

    /// Finish construction. Fails if a rung is still open.
    pub fn finish(self) -> BuildResult<Program> {
        if !self.stack.is_empty() {
            return Err(BuildError::UnclosedRung);
        }
        Ok(Program::new(
            self.tags,
            self.rungs,
            self.profile,
            self.next_body,
        ))
    }

    fn alloc_body(&mut self) -> BodyId {
        let id = BodyId(self.next_body);
        self.next_body += 1;
        id
    }

    fn current(&mut self) -> BuildResult<&mut Frame> {
        self.stack.last_mut().ok_or(BuildError::NoOpenRung)
    }

    fn name_of(&self, tag: TagId) -> String {
        self.tags
            .get(tag)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| tag.to_string())
    }

    fn operand_kind(&self, operand: &Operand) -> BuildResult<ValueKind> {
        match operand {
            Operand::Tag(tag) => self.tags.kind_of(*tag),
            Operand::Const(value) => Ok(value.kind()),
        }
    }

    fn check_expr(&self, expr: &Expr) -> BuildResult<()> {
        match expr {
            Expr::Tag(tag) => {
                let kind = self.tags.kind_of(*tag)?;
                if !kind.is_bool() {
                    return Err(BuildError::ConditionNotBool {
                        tag: self.name_of(*tag),
                        found: kind,
                    });
                }
                Ok(())
            }
            Expr::Not(inner) => self.check_expr(inner),
            Expr::All(items) | Expr::Any(items) => {
                for item in items {
                    self.check_expr(item)?;
                }
                Ok(())
            }
            Expr::Cmp { lhs, rhs, .. } => {
                let lk = self.operand_kind(lhs)?;
                let rk = self.operand_kind(rhs)?;
                if lk != rk {
                    return Err(BuildError::ComparisonKindMismatch { lhs: lk, rhs: rk });
                }
                Ok(())
            }
        }
    }

    fn require_bool(&self, instruction: &'static str, tag: TagId) -> BuildResult<()> {
        let kind = self.tags.kind_of(tag)?;
        if !kind.is_bool() {
            return Err(BuildError::BindingKindMismatch {
                instruction,
                tag: self.name_of(tag),
                expected: ValueKind::Bool,
                found: kind,
            });
        }
        Ok(())
    }

    fn check_instruction(&self, instruction: &Instruction) -> BuildResult<()> {
        match instruction {
            Instruction::Out { tag } => self.require_bool("out", *tag),
            Instruction::Latch { tag } => self.require_bool("latch", *tag),
            Instruction::Reset { tag } => self.require_bool("reset", *tag),
            Instruction::Write { tag, value } => {
                let tag_kind = self.tags.kind_of(*tag)?;
                let value_kind = self.operand_kind(value)?;
                if tag_kind != value_kind {
                    return Err(BuildError::KindMismatch {
                        tag: self.name_of(*tag),
                        expected: tag_kind,
                        found: value_kind,
                    });
                }
                Ok(())
            }
            Instruction::Timer { tag, preset, .. } => {
                self.require_bool("timer", *tag)?;
                let max = self.profile.timer_width.max();
                if *preset > max {
                    return Err(BuildError::PresetOutOfRange {
                        instruction: "timer",
                        tag: self.name_of(*tag),
                        preset: *preset,
                        max,
                    });
                }
                Ok(())
            }
            Instruction::Counter { tag, preset, .. } => {
                self.require_bool("counter", *tag)?;
                let max = self.profile.counter_width.max();
                if *preset > max {
                    return Err(BuildError::PresetOutOfRange {
                        instruction: "counter",
                        tag: self.name_of(*tag),
                        preset: *preset,
                        max,
                    });
                }
                Ok(())
            }
            Instruction::Send { tag, .. } | Instruction::Receive { tag, .. } => {
                // Any declared kind can cross the wire; existence is the check.
                self.tags.kind_of(*tag).map(|_| ())
            }
        }
    }
}
