//! Caller-driven stepping, history, and rewind
//!
//! The driver owns the scan history and a cursor into it. Every step
//! scans from the snapshot under the cursor and appends the result;
//! nothing advances unless the caller asks. Stepping from a rewound
//! cursor either discards the abandoned future or shelves it as a fork,
//! per [`RewindPolicy`].

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, instrument};

use relay_model::{Program, TagId, Value, ValueKind};

use crate::error::Error;
use crate::exchange::{Exchange, NullExchange};
use crate::scan::{scan_working, Dt, ScanReport};
use crate::snapshot::Snapshot;

/// What happens to the abandoned future when stepping from a rewound
/// cursor. There is no implicit choice; the policy is fixed at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindPolicy {
    /// Discard snapshots after the cursor.
    Truncate,
    /// Shelve the abandoned suffix as a read-only fork.
    Fork,
}

/// Handle for an installed change monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(u32);

impl std::fmt::Display for MonitorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// A monitored tag's visible value changed across a scan boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorEvent {
    pub monitor: MonitorId,
    pub tag: TagId,
    /// Scan index of the snapshot that first carries the new value.
    pub scan: u64,
    pub value: Value,
}

type MonitorFn = Box<dyn FnMut(&MonitorEvent)>;

struct MonitorEntry {
    tag: TagId,
    callback: Option<MonitorFn>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("rewind target {requested} out of range (latest scan is {latest})")]
    InvalidRewind { requested: u64, latest: u64 },

    #[error("unknown tag: {0}")]
    UndeclaredTag(TagId),

    #[error("{tag}: expected {expected}, got {found}")]
    KindMismatch {
        tag: TagId,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("unknown monitor: {0}")]
    UnknownMonitor(MonitorId),

    #[error("predicate not satisfied within {limit} scans")]
    LimitExceeded { limit: u64 },

    #[error(transparent)]
    Scan(#[from] Error),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Stepping surface over one program. Holds the full snapshot history;
/// structural sharing keeps retained snapshots cheap.
pub struct Driver {
    program: Program,
    history: Vec<Snapshot>,
    cursor: usize,
    policy: RewindPolicy,
    forks: Vec<Vec<Snapshot>>,
    patches: Vec<(TagId, Value)>,
    monitors: IndexMap<MonitorId, MonitorEntry>,
    next_monitor: u32,
    last_report: Option<ScanReport>,
}

impl Driver {
    pub fn new(program: Program, policy: RewindPolicy) -> Self {
        let initial = Snapshot::initial(&program);
        Self {
            program,
            history: vec![initial],
            cursor: 0,
            policy,
            forks: Vec::new(),
            patches: Vec::new(),
            monitors: IndexMap::new(),
            next_monitor: 0,
            last_report: None,
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Snapshot under the cursor.
    pub fn current(&self) -> &Snapshot {
        &self.history[self.cursor]
    }

    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    /// Futures shelved by stepping from a rewound cursor under
    /// [`RewindPolicy::Fork`].
    pub fn forks(&self) -> &[Vec<Snapshot>] {
        &self.forks
    }

    /// Report from the most recent scan, if any.
    pub fn last_report(&self) -> Option<&ScanReport> {
        self.last_report.as_ref()
    }

    /// Queue a one-shot external write, applied at the start of the
    /// next step. Like in-program writes it becomes visible to
    /// conditions one scan later.
    pub fn patch(&mut self, tag: TagId, value: Value) -> DriverResult<()> {
        self.check_kind(tag, value.kind())?;
        self.patches.push((tag, value));
        Ok(())
    }

    /// Install or replace a force on the current snapshot, effective
    /// immediately without a scan.
    pub fn force(&mut self, tag: TagId, value: Value) -> DriverResult<()> {
        self.check_kind(tag, value.kind())?;
        debug!(tag = %tag, %value, "force installed");
        self.history[self.cursor] = self.current().with_force(tag, Some(value))?;
        Ok(())
    }

    pub fn remove_force(&mut self, tag: TagId) -> DriverResult<()> {
        self.tag_kind(tag)?;
        debug!(tag = %tag, "force removed");
        self.history[self.cursor] = self.current().with_force(tag, None)?;
        Ok(())
    }

    /// Watch a tag's visible value; events are returned by the step
    /// that crossed the change.
    pub fn monitor(&mut self, tag: TagId) -> DriverResult<MonitorId> {
        self.install_monitor(tag, None)
    }

    /// Watch a tag's visible value and invoke `callback` for each
    /// change, synchronously on the stepping thread, after the new
    /// snapshot is finalized. Events are still returned by the step.
    pub fn monitor_with(
        &mut self,
        tag: TagId,
        callback: impl FnMut(&MonitorEvent) + 'static,
    ) -> DriverResult<MonitorId> {
        self.install_monitor(tag, Some(Box::new(callback)))
    }

    fn install_monitor(
        &mut self,
        tag: TagId,
        callback: Option<MonitorFn>,
    ) -> DriverResult<MonitorId> {
        self.tag_kind(tag)?;
        let id = MonitorId(self.next_monitor);
        self.next_monitor += 1;
        self.monitors.insert(id, MonitorEntry { tag, callback });
        Ok(id)
    }

    pub fn unmonitor(&mut self, id: MonitorId) -> DriverResult<()> {
        self.monitors
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(DriverError::UnknownMonitor(id))
    }

    /// Execute one scan with no wire surface.
    pub fn step(&mut self, dt: Dt) -> DriverResult<Vec<MonitorEvent>> {
        self.step_with_io(dt, &mut NullExchange)
    }

    /// Execute one scan against an exchange surface. Queued patches are
    /// applied to the working copy first; a rewound cursor triggers the
    /// rewind policy before the scan runs.
    #[instrument(skip_all, fields(cursor = self.cursor, patches = self.patches.len()))]
    pub fn step_with_io(
        &mut self,
        dt: Dt,
        io: &mut dyn Exchange,
    ) -> DriverResult<Vec<MonitorEvent>> {
        if self.cursor + 1 < self.history.len() {
            let abandoned = self.history.split_off(self.cursor + 1);
            match self.policy {
                RewindPolicy::Truncate => {
                    debug!(dropped = abandoned.len(), "future truncated");
                }
                RewindPolicy::Fork => {
                    debug!(shelved = abandoned.len(), fork = self.forks.len(), "future forked");
                    self.forks.push(abandoned);
                }
            }
        }

        let input = &self.history[self.cursor];
        let mut work = input.working_copy();
        let patched: Vec<TagId> = self.patches.iter().map(|(tag, _)| *tag).collect();
        for (tag, value) in self.patches.drain(..) {
            work.patch(tag, value)?;
        }

        let outcome = scan_working(&self.program, work, input, dt, io)?;
        let mut report = outcome.report;
        if !patched.is_empty() {
            let mut writes = patched;
            writes.extend(report.one_shot_writes);
            report.one_shot_writes = writes;
        }

        let events = self.collect_events(&outcome.snapshot);
        self.history.push(outcome.snapshot);
        self.cursor += 1;
        self.last_report = Some(report);
        for event in &events {
            if let Some(entry) = self.monitors.get_mut(&event.monitor) {
                if let Some(callback) = entry.callback.as_mut() {
                    callback(event);
                }
            }
        }
        Ok(events)
    }

    /// Execute `scans` scans at a fixed dt, concatenating monitor
    /// events.
    pub fn run(&mut self, scans: u64, dt: Dt) -> DriverResult<Vec<MonitorEvent>> {
        let mut events = Vec::new();
        for _ in 0..scans {
            events.extend(self.step(dt)?);
        }
        Ok(events)
    }

    /// Step until `done` accepts the current snapshot, at most `limit`
    /// scans. Returns the number of scans executed.
    pub fn run_until(
        &mut self,
        dt: Dt,
        limit: u64,
        mut done: impl FnMut(&Snapshot) -> bool,
    ) -> DriverResult<u64> {
        for executed in 0..limit {
            if done(self.current()) {
                return Ok(executed);
            }
            self.step(dt)?;
        }
        if done(self.current()) {
            return Ok(limit);
        }
        Err(DriverError::LimitExceeded { limit })
    }

    /// Move the cursor to a snapshot by history position. The history
    /// is untouched until the next step.
    pub fn rewind(&mut self, position: u64) -> DriverResult<&Snapshot> {
        let index = usize::try_from(position).unwrap_or(usize::MAX);
        if index >= self.history.len() {
            return Err(DriverError::InvalidRewind {
                requested: position,
                latest: self.history.len() as u64 - 1,
            });
        }
        debug!(from = self.cursor, to = index, "rewind");
        self.cursor = index;
        Ok(&self.history[self.cursor])
    }

    fn collect_events(&self, next: &Snapshot) -> Vec<MonitorEvent> {
        if self.monitors.is_empty() {
            return Vec::new();
        }
        let changed = next.changed_from(&self.history[self.cursor]);
        let mut events = Vec::new();
        for (&monitor, entry) in &self.monitors {
            if changed.contains(&entry.tag) {
                if let Ok(value) = next.read(entry.tag) {
                    events.push(MonitorEvent {
                        monitor,
                        tag: entry.tag,
                        scan: next.scan_index(),
                        value,
                    });
                }
            }
        }
        events
    }

    fn tag_kind(&self, tag: TagId) -> DriverResult<ValueKind> {
        self.program
            .tags()
            .kind_of(tag)
            .map_err(|_| DriverError::UndeclaredTag(tag))
    }

    fn check_kind(&self, tag: TagId, found: ValueKind) -> DriverResult<()> {
        let expected = self.tag_kind(tag)?;
        if expected != found {
            return Err(DriverError::KindMismatch {
                tag,
                expected,
                found,
            });
        }
        Ok(())
    }
}
