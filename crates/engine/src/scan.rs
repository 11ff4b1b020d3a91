//! Two-phase scan execution
//!
//! Phase 1 evaluates every rung and branch condition against the input
//! snapshot, producing a dense fires flag per body. Phase 2 walks the
//! program in source order applying instruction effects to a working
//! copy, using only Phase-1 fires flags for condition truth. Later
//! instructions observe earlier writes; conditions never do.
//!
//! Condition composition: for a node with condition `C` and child
//! branches, `alt = C OR alt(branch…)`. The node's own body fires iff
//! `ctx AND alt`; a branch body fires iff `ctx AND C AND alt(branch)`,
//! where `ctx` is the ancestor series context (true for a top rung).

use std::cmp::Ordering;

use tracing::{instrument, trace};

use relay_model::{
    BodyId, CmpOp, CountDirection, EdgeKind, Element, Expr, Instruction, Operand, Program, TagId,
    TargetProfile, TimerKind, Value,
};
use relay_model::{IntWidth, OverflowPolicy};

use crate::error::{Error, Result};
use crate::exchange::{Exchange, ExchangeError, NullExchange};
use crate::snapshot::{Snapshot, WorkingState};

/// Elapsed time attributed to one scan, in microseconds. Supplied by
/// the caller; the engine has no clock of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dt(pub u64);

impl Dt {
    pub fn from_millis(ms: u64) -> Self {
        Dt(ms * 1_000)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }
}

/// What one scan did, beyond the snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Phase-1 fires flag per body, indexed by `BodyId`.
    pub fires: Vec<bool>,
    /// Tags written by one-shot value writes (in-program or patches)
    /// this scan. This is the inspection surface for the pending flag,
    /// which is cleared before the snapshot is emitted.
    pub one_shot_writes: Vec<TagId>,
    /// Exchange requests that failed, with their defined outcome.
    pub exchange_faults: Vec<(TagId, ExchangeError)>,
}

impl ScanReport {
    /// Whether a rung/branch body fired this scan.
    pub fn fired(&self, body: BodyId) -> bool {
        self.fires.get(body.index()).copied().unwrap_or(false)
    }
}

/// Result of one scan: the frozen snapshot plus the report.
#[derive(Debug)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    pub report: ScanReport,
}

/// Execute one scan with no wire surface attached.
pub fn scan(program: &Program, input: &Snapshot, dt: Dt) -> Result<ScanOutcome> {
    scan_with_io(program, input, dt, &mut NullExchange)
}

/// Execute one scan against a wire exchange surface.
///
/// Deterministic: identical (program, snapshot, dt, exchange behavior)
/// inputs produce identical outcomes.
#[instrument(skip_all, fields(scan = input.scan_index(), rungs = program.rungs().len()))]
pub fn scan_with_io(
    program: &Program,
    input: &Snapshot,
    dt: Dt,
    io: &mut dyn Exchange,
) -> Result<ScanOutcome> {
    scan_working(program, input.working_copy(), input, dt, io)
}

/// Scan over a prepared working copy. Driver patches are applied to the
/// working copy before this point; Phase 1 still reads the pristine
/// input snapshot, so patches become visible to conditions only on the
/// following scan, exactly like in-program writes.
pub(crate) fn scan_working(
    program: &Program,
    mut work: WorkingState,
    input: &Snapshot,
    dt: Dt,
    io: &mut dyn Exchange,
) -> Result<ScanOutcome> {
    // Phase 1: all conditions against the input snapshot only.
    let mut fires = vec![false; program.body_count()];
    for rung in program.rungs() {
        evaluate_node(&rung.condition, rung.body, &rung.elements, true, input, &mut fires)?;
    }
    trace!(?fires, "conditions evaluated");

    // Phase 2: effects in source order against the working copy.
    let mut ctx = ExecContext {
        profile: *program.profile(),
        dt,
        fires: &fires,
        io,
        one_shot_writes: Vec::new(),
        exchange_faults: Vec::new(),
    };
    for rung in program.rungs() {
        execute_elements(&rung.elements, rung.body, &mut work, &mut ctx)?;
    }

    // Take the accumulators out of the context to end its borrow of
    // `fires` before the report claims it.
    let ExecContext {
        one_shot_writes,
        exchange_faults,
        ..
    } = ctx;
    let report = ScanReport {
        fires,
        one_shot_writes,
        exchange_faults,
    };
    Ok(ScanOutcome {
        snapshot: work.freeze(),
        report,
    })
}

/// Evaluate one rung/branch node. Returns the node's `alt` value (its
/// own condition ORed with all child branch alternates) and records the
/// fires flag for its body and, recursively, for every child body.
fn evaluate_node(
    condition: &Expr,
    body: BodyId,
    elements: &[Element],
    ctx: bool,
    input: &Snapshot,
    fires: &mut [bool],
) -> Result<bool> {
    let own = evaluate_expr(condition, input)?;
    let child_ctx = ctx && own;
    let mut alt = own;
    for element in elements {
        if let Element::Branch(branch) = element {
            // Every branch is evaluated even once `alt` is known true:
            // nested bodies need their own fires flags.
            let branch_alt = evaluate_node(
                &branch.condition,
                branch.body,
                &branch.elements,
                child_ctx,
                input,
                fires,
            )?;
            alt = alt || branch_alt;
        }
    }
    fires[body.index()] = ctx && alt;
    Ok(alt)
}

fn evaluate_expr(expr: &Expr, input: &Snapshot) -> Result<bool> {
    match expr {
        Expr::Tag(tag) => input
            .read(*tag)?
            .as_bool()
            .ok_or(Error::KindMismatch(*tag)),
        Expr::Not(inner) => Ok(!evaluate_expr(inner, input)?),
        Expr::All(items) => {
            for item in items {
                if !evaluate_expr(item, input)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Any(items) => {
            for item in items {
                if evaluate_expr(item, input)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = read_operand(lhs, input)?;
            let rhs = read_operand(rhs, input)?;
            Ok(compare(*op, &lhs, &rhs))
        }
    }
}

fn read_operand(operand: &Operand, input: &Snapshot) -> Result<Value> {
    match operand {
        Operand::Tag(tag) => input.read(*tag),
        Operand::Const(value) => Ok(*value),
    }
}

/// IEEE-754 partial order: any relation against NaN is false, including
/// `Ne`'s complement: `Ne` on NaN operands is true, matching hardware
/// float units.
fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    let ord = lhs.partial_cmp_same_kind(rhs);
    match op {
        CmpOp::Eq => ord == Some(Ordering::Equal),
        CmpOp::Ne => ord != Some(Ordering::Equal),
        CmpOp::Lt => ord == Some(Ordering::Less),
        CmpOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ord == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
    }
}

struct ExecContext<'a> {
    profile: TargetProfile,
    dt: Dt,
    fires: &'a [bool],
    io: &'a mut dyn Exchange,
    one_shot_writes: Vec<TagId>,
    exchange_faults: Vec<(TagId, ExchangeError)>,
}

fn execute_elements(
    elements: &[Element],
    body: BodyId,
    work: &mut WorkingState,
    ctx: &mut ExecContext<'_>,
) -> Result<()> {
    let fired = ctx.fires.get(body.index()).copied().unwrap_or(false);
    for element in elements {
        match element {
            Element::Instruction(instruction) => {
                apply_instruction(instruction, fired, work, ctx)?;
            }
            // Branches execute at their textual position with their own
            // Phase-1 flag.
            Element::Branch(branch) => {
                execute_elements(&branch.elements, branch.body, work, ctx)?;
            }
        }
    }
    Ok(())
}

fn apply_instruction(
    instruction: &Instruction,
    fired: bool,
    work: &mut WorkingState,
    ctx: &mut ExecContext<'_>,
) -> Result<()> {
    match instruction {
        Instruction::Out { tag } => {
            // Non-sticky: fully re-derived every scan.
            work.slot_mut(*tag)?.value = Value::Bool(fired);
        }
        Instruction::Latch { tag } => {
            if fired {
                let slot = work.slot_mut(*tag)?;
                slot.latched = true;
                slot.value = Value::Bool(true);
            }
        }
        Instruction::Reset { tag } => {
            if fired {
                let slot = work.slot_mut(*tag)?;
                slot.latched = false;
                slot.value = Value::Bool(false);
                slot.timer_accum = 0;
                slot.counter_count = 0;
            }
        }
        Instruction::Write { tag, value } => {
            if fired {
                let value = read_write_operand(value, work)?;
                let slot = work.slot_mut(*tag)?;
                slot.value = value;
                slot.one_shot_pending = true;
                ctx.one_shot_writes.push(*tag);
                trace!(tag = %tag, %value, "one-shot write");
            }
        }
        Instruction::Timer { tag, preset, kind } => {
            apply_timer(*tag, *preset, *kind, fired, work, ctx)?;
        }
        Instruction::Counter {
            tag,
            preset,
            edge,
            direction,
        } => {
            apply_counter(*tag, *preset, *edge, *direction, fired, work, ctx)?;
        }
        Instruction::Send { tag, address } => {
            if fired {
                let value = work.read(*tag)?;
                if let Err(fault) = ctx.io.write(*address, value) {
                    trace!(tag = %tag, %address, %fault, "send failed");
                    ctx.exchange_faults.push((*tag, fault));
                }
            }
        }
        Instruction::Receive { tag, address } => {
            if fired {
                match ctx.io.read(*address) {
                    Ok(value) => {
                        let slot = work.slot_mut(*tag)?;
                        if value.kind() == slot.value.kind() {
                            slot.value = value;
                        } else {
                            // Destination unchanged on a mis-typed reply.
                            ctx.exchange_faults
                                .push((*tag, ExchangeError::KindMismatch(*address)));
                        }
                    }
                    Err(fault) => {
                        trace!(tag = %tag, %address, %fault, "receive failed");
                        ctx.exchange_faults.push((*tag, fault));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Value-write operands read the working copy: a write in rung 3 can
/// consume an intermediate computed by rung 1 in the same scan.
fn read_write_operand(operand: &Operand, work: &WorkingState) -> Result<Value> {
    match operand {
        Operand::Tag(tag) => work.read(*tag),
        Operand::Const(value) => Ok(*value),
    }
}

fn apply_timer(
    tag: TagId,
    preset: u64,
    kind: TimerKind,
    fired: bool,
    work: &mut WorkingState,
    ctx: &ExecContext<'_>,
) -> Result<()> {
    let width = ctx.profile.timer_width;
    let overflow = ctx.profile.timer_overflow;
    // Whole counts only; the sub-count remainder of this dt is
    // truncated, as on count-register hardware.
    let counts = ctx.dt.as_micros() / ctx.profile.time_base_us;

    let slot = work.slot_mut(tag)?;
    if fired {
        slot.timer_accum = accumulate(slot.timer_accum, counts, width, overflow);
    } else if kind == TimerKind::OnDelay {
        slot.timer_accum = 0;
    }
    // Done bit is re-derived every scan; a wrapped accumulator drops it.
    slot.value = Value::Bool(slot.timer_accum >= preset);
    Ok(())
}

fn accumulate(accum: u64, counts: u64, width: IntWidth, overflow: OverflowPolicy) -> u64 {
    let raw = accum.saturating_add(counts);
    match overflow {
        OverflowPolicy::Wrap => width.mask(raw),
        OverflowPolicy::Saturate => raw.min(width.max()),
    }
}

fn apply_counter(
    tag: TagId,
    preset: u64,
    edge: EdgeKind,
    direction: CountDirection,
    fired: bool,
    work: &mut WorkingState,
    ctx: &ExecContext<'_>,
) -> Result<()> {
    let width = ctx.profile.counter_width;
    let slot = work.slot_mut(tag)?;

    let triggered = match edge {
        EdgeKind::Rising => fired && !slot.counter_edge,
        EdgeKind::Falling => !fired && slot.counter_edge,
    };
    if triggered {
        slot.counter_count = match direction {
            // Wraparound at the declared width, never saturation.
            CountDirection::Up => width.mask(slot.counter_count + 1),
            CountDirection::Down => width.mask(slot.counter_count.wrapping_sub(1)),
        };
        trace!(tag = %tag, count = slot.counter_count, "counter edge");
    }
    slot.counter_edge = fired;
    slot.value = Value::Bool(slot.counter_count >= preset);
    Ok(())
}
