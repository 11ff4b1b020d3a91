//! State snapshots
//!
//! A snapshot is an immutable mapping from tag to value plus per-tag
//! bookkeeping (latch bit, timer accumulator, counter state, one-shot
//! flag, active force). Each scan freezes a new snapshot; unchanged
//! slots share storage with the previous one via `Arc`.

use std::sync::Arc;

use relay_model::{Program, TagId, Value};

use crate::error::{Error, Result};

/// Per-tag state carried across scans.
#[derive(Debug, Clone, PartialEq)]
pub struct TagState {
    /// Instruction-driven value. Shadowed by `force` for all reads.
    pub value: Value,
    /// Sticky latch bit; set by `latch`, cleared only by `reset`.
    pub latched: bool,
    /// Timer accumulator in target time-base counts, width-masked.
    pub timer_accum: u64,
    /// Counter register, width-masked.
    pub counter_count: u64,
    /// Condition state seen by the counter on the previous scan, for
    /// edge detection.
    pub counter_edge: bool,
    /// True only between a value write and the end of that scan.
    pub one_shot_pending: bool,
    /// Persistent external override of the visible value.
    pub force: Option<Value>,
}

impl TagState {
    fn initial(value: Value) -> Self {
        Self {
            value,
            latched: false,
            timer_accum: 0,
            counter_count: 0,
            counter_edge: false,
            one_shot_pending: false,
            force: None,
        }
    }

    /// The externally visible value: the force while one is active,
    /// otherwise the instruction-driven value.
    pub fn visible(&self) -> Value {
        self.force.unwrap_or(self.value)
    }
}

/// An immutable state snapshot, one per scan.
#[derive(Debug, Clone)]
pub struct Snapshot {
    scan: u64,
    slots: Vec<Arc<TagState>>,
}

impl Snapshot {
    /// The time-zero snapshot: every tag at its declared initial value.
    pub fn initial(program: &Program) -> Self {
        let slots = program
            .tags()
            .iter()
            .map(|(_, decl)| Arc::new(TagState::initial(decl.initial)))
            .collect();
        Self { scan: 0, slots }
    }

    /// Index of the scan that produced this snapshot (0 = time zero).
    pub fn scan_index(&self) -> u64 {
        self.scan
    }

    pub fn tag_count(&self) -> usize {
        self.slots.len()
    }

    /// Full per-tag state.
    pub fn state(&self, tag: TagId) -> Result<&TagState> {
        self.slots
            .get(tag.index())
            .map(|s| s.as_ref())
            .ok_or(Error::UndeclaredTag(tag))
    }

    /// The visible value of a tag (forced value while a force is active).
    pub fn read(&self, tag: TagId) -> Result<Value> {
        self.state(tag).map(|s| s.visible())
    }

    /// The instruction-driven value underneath any force. Diagnostic
    /// projection; program logic never reads this.
    pub fn stored(&self, tag: TagId) -> Result<Value> {
        self.state(tag).map(|s| s.value)
    }

    /// Derive an amended snapshot with a force set or cleared. Same scan
    /// index; not a scan.
    pub fn with_force(&self, tag: TagId, force: Option<Value>) -> Result<Snapshot> {
        let mut next = self.clone();
        let slot = next
            .slots
            .get_mut(tag.index())
            .ok_or(Error::UndeclaredTag(tag))?;
        Arc::make_mut(slot).force = force;
        Ok(next)
    }

    /// Tags whose visible value differs from `earlier`, in tag order.
    pub fn changed_from(&self, earlier: &Snapshot) -> Vec<TagId> {
        self.slots
            .iter()
            .zip(earlier.slots.iter())
            .enumerate()
            .filter(|(_, (now, then))| {
                // Shared slots cannot differ.
                !Arc::ptr_eq(now, then) && !now.visible().bits_eq(&then.visible())
            })
            .map(|(i, _)| TagId(i as u32))
            .collect()
    }

    pub(crate) fn working_copy(&self) -> WorkingState {
        WorkingState {
            scan: self.scan,
            slots: self.slots.clone(),
        }
    }
}

/// Mutable working copy used during Phase 2. Starts as the input
/// snapshot, accumulates writes in execution order, freezes into the
/// next snapshot. Never escapes the engine.
#[derive(Debug)]
pub(crate) struct WorkingState {
    scan: u64,
    slots: Vec<Arc<TagState>>,
}

impl WorkingState {
    /// Visible value, identical rule to [`Snapshot::read`]: later
    /// instructions observe earlier writes within the same scan.
    pub fn read(&self, tag: TagId) -> Result<Value> {
        self.slots
            .get(tag.index())
            .map(|s| s.visible())
            .ok_or(Error::UndeclaredTag(tag))
    }

    /// Mutable access to a slot, copying it out of shared storage on
    /// first write.
    pub fn slot_mut(&mut self, tag: TagId) -> Result<&mut TagState> {
        self.slots
            .get_mut(tag.index())
            .map(Arc::make_mut)
            .ok_or(Error::UndeclaredTag(tag))
    }

    /// Apply a one-shot external write (driver patch) before Phase 1.
    pub fn patch(&mut self, tag: TagId, value: Value) -> Result<()> {
        let slot = self.slot_mut(tag)?;
        slot.value = value;
        slot.one_shot_pending = true;
        Ok(())
    }

    /// Freeze into the next immutable snapshot. One-shot flags are
    /// cleared at this boundary, so no emitted snapshot ever carries a
    /// pending flag.
    pub fn freeze(mut self) -> Snapshot {
        for slot in &mut self.slots {
            if slot.one_shot_pending {
                Arc::make_mut(slot).one_shot_pending = false;
            }
        }
        Snapshot {
            scan: self.scan + 1,
            slots: self.slots,
        }
    }
}
