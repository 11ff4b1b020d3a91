//! Program documents
//!
//! A serde-friendly, name-keyed description of a program, used by the
//! CLI and by tests. This is the secondary string-keyed surface: it
//! lowers onto the identity-keyed builder and inherits all of its
//! build-time validation.

use serde::{Deserialize, Serialize};

use crate::address::{HwAddress, Region};
use crate::builder::ProgramBuilder;
use crate::error::{BuildError, BuildResult};
use crate::profile::TargetProfile;
use crate::program::{CmpOp, CountDirection, EdgeKind, Expr, Operand, Program, TimerKind};
use crate::tag::TagId;
use crate::value::{Value, ValueKind};

/// Root of a program document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramDoc {
    /// Named target profile: "generic" (default) or "micro16".
    #[serde(default)]
    pub profile: Option<String>,
    pub tags: Vec<TagDoc>,
    pub rungs: Vec<RungDoc>,
}

/// A tag declaration by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDoc {
    pub name: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub init: Option<Value>,
}

/// A rung: condition plus ordered body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RungDoc {
    pub when: ExprDoc,
    pub body: Vec<ElementDoc>,
}

/// Condition expression with tag names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDoc {
    Tag(String),
    Not(Box<ExprDoc>),
    All(Vec<ExprDoc>),
    Any(Vec<ExprDoc>),
    Cmp {
        op: CmpOp,
        lhs: OperandDoc,
        rhs: OperandDoc,
    },
}

/// Operand with tag names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperandDoc {
    Tag(String),
    Const(Value),
}

/// Body element: instruction or nested branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementDoc {
    Out {
        tag: String,
    },
    Latch {
        tag: String,
    },
    Reset {
        tag: String,
    },
    Write {
        tag: String,
        value: OperandDoc,
    },
    Timer {
        tag: String,
        preset: u64,
        kind: TimerKind,
    },
    Counter {
        tag: String,
        preset: u64,
        edge: EdgeKind,
        direction: CountDirection,
    },
    Send {
        tag: String,
        region: Region,
        index: u16,
    },
    Receive {
        tag: String,
        region: Region,
        index: u16,
    },
    Branch {
        when: ExprDoc,
        body: Vec<ElementDoc>,
    },
}

impl ProgramDoc {
    /// Parse a document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Lower the document onto the builder, producing a validated
    /// program. Unknown tag names and profile names fail here.
    pub fn build(&self) -> BuildResult<Program> {
        let profile = match self.profile.as_deref() {
            None | Some("generic") => TargetProfile::generic(),
            Some("micro16") => TargetProfile::micro16(),
            Some(other) => return Err(BuildError::UnknownProfile(other.to_string())),
        };

        let mut builder = ProgramBuilder::new(profile);
        for tag in &self.tags {
            match tag.init {
                Some(init) => builder.declare_init(&tag.name, tag.kind, init)?,
                None => builder.declare(&tag.name, tag.kind)?,
            };
        }

        for rung in &self.rungs {
            let condition = lower_expr(&builder, &rung.when)?;
            builder.begin_rung(condition)?;
            lower_body(&mut builder, &rung.body)?;
            builder.end_rung()?;
        }

        builder.finish()
    }
}

fn resolve(builder: &ProgramBuilder, name: &str) -> BuildResult<TagId> {
    builder
        .tags()
        .resolve(name)
        .ok_or_else(|| BuildError::UnknownTagName(name.to_string()))
}

fn lower_operand(builder: &ProgramBuilder, operand: &OperandDoc) -> BuildResult<Operand> {
    Ok(match operand {
        OperandDoc::Tag(name) => Operand::Tag(resolve(builder, name)?),
        OperandDoc::Const(value) => Operand::Const(*value),
    })
}

fn lower_expr(builder: &ProgramBuilder, expr: &ExprDoc) -> BuildResult<Expr> {
    Ok(match expr {
        ExprDoc::Tag(name) => Expr::Tag(resolve(builder, name)?),
        ExprDoc::Not(inner) => Expr::Not(Box::new(lower_expr(builder, inner)?)),
        ExprDoc::All(items) => Expr::All(
            items
                .iter()
                .map(|e| lower_expr(builder, e))
                .collect::<BuildResult<_>>()?,
        ),
        ExprDoc::Any(items) => Expr::Any(
            items
                .iter()
                .map(|e| lower_expr(builder, e))
                .collect::<BuildResult<_>>()?,
        ),
        ExprDoc::Cmp { op, lhs, rhs } => Expr::Cmp {
            op: *op,
            lhs: lower_operand(builder, lhs)?,
            rhs: lower_operand(builder, rhs)?,
        },
    })
}

fn lower_body(builder: &mut ProgramBuilder, body: &[ElementDoc]) -> BuildResult<()> {
    for element in body {
        match element {
            ElementDoc::Out { tag } => {
                let tag = resolve(builder, tag)?;
                builder.out(tag)?;
            }
            ElementDoc::Latch { tag } => {
                let tag = resolve(builder, tag)?;
                builder.latch(tag)?;
            }
            ElementDoc::Reset { tag } => {
                let tag = resolve(builder, tag)?;
                builder.reset(tag)?;
            }
            ElementDoc::Write { tag, value } => {
                let tag = resolve(builder, tag)?;
                let value = lower_operand(builder, value)?;
                builder.write(tag, value)?;
            }
            ElementDoc::Timer { tag, preset, kind } => {
                let tag = resolve(builder, tag)?;
                builder.timer(tag, *preset, *kind)?;
            }
            ElementDoc::Counter {
                tag,
                preset,
                edge,
                direction,
            } => {
                let tag = resolve(builder, tag)?;
                builder.counter(tag, *preset, *edge, *direction)?;
            }
            ElementDoc::Send { tag, region, index } => {
                let tag = resolve(builder, tag)?;
                builder.send(
                    tag,
                    HwAddress {
                        region: *region,
                        index: *index,
                    },
                )?;
            }
            ElementDoc::Receive { tag, region, index } => {
                let tag = resolve(builder, tag)?;
                builder.receive(
                    tag,
                    HwAddress {
                        region: *region,
                        index: *index,
                    },
                )?;
            }
            ElementDoc::Branch { when, body } => {
                let condition = lower_expr(builder, when)?;
                builder.begin_branch(condition)?;
                lower_body(builder, body)?;
                builder.end_branch()?;
            }
        }
    }
    Ok(())
}
