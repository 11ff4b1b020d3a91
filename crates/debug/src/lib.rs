//! Debug adapter
//!
//! Synchronous step/breakpoint/watch session over a driver. Every
//! request maps 1:1 onto a driver operation; break conditions are
//! evaluated after each scan against the computed snapshot and report,
//! never by altering scan semantics.

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use relay_engine::{
    Driver, DriverError, Dt, MonitorEvent, MonitorId, RewindPolicy, Snapshot,
};
use relay_model::{Program, TagId, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BreakpointId(u32);

impl std::fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bp{}", self.0)
    }
}

/// Pause conditions, checked after each completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakCondition {
    /// The body of top-level rung `n` fired this scan.
    RungFired(usize),
    /// A tag's visible value changed across the scan.
    TagChanged(TagId),
    /// The snapshot with this scan index was produced.
    ScanReached(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Ready,
    Running,
    Paused,
}

/// Why `resume` returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Breakpoints(Vec<BreakpointId>),
    LimitReached,
    /// An external `pause` request was pending.
    PauseRequested,
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("no rung {0} in the program")]
    UnknownRung(usize),

    #[error("unknown breakpoint: {0}")]
    UnknownBreakpoint(BreakpointId),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type DebugResult<T> = std::result::Result<T, DebugError>;

/// One scan's worth of debug output.
#[derive(Debug)]
pub struct StepOutcome {
    /// Watch notifications from this scan.
    pub events: Vec<MonitorEvent>,
    /// Breakpoints that matched, in registration order.
    pub hits: Vec<BreakpointId>,
}

pub struct DebugSession {
    driver: Driver,
    breakpoints: IndexMap<BreakpointId, BreakCondition>,
    next_breakpoint: u32,
    status: SessionStatus,
    pause_requested: bool,
}

impl DebugSession {
    pub fn new(program: Program, policy: RewindPolicy) -> Self {
        Self {
            driver: Driver::new(program, policy),
            breakpoints: IndexMap::new(),
            next_breakpoint: 0,
            status: SessionStatus::Ready,
            pause_requested: false,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn current(&self) -> &Snapshot {
        self.driver.current()
    }

    pub fn add_breakpoint(&mut self, condition: BreakCondition) -> DebugResult<BreakpointId> {
        if let BreakCondition::RungFired(rung) = condition {
            if rung >= self.driver.program().rungs().len() {
                return Err(DebugError::UnknownRung(rung));
            }
        }
        let id = BreakpointId(self.next_breakpoint);
        self.next_breakpoint += 1;
        debug!(%id, ?condition, "breakpoint set");
        self.breakpoints.insert(id, condition);
        Ok(id)
    }

    pub fn remove_breakpoint(&mut self, id: BreakpointId) -> DebugResult<()> {
        self.breakpoints
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(DebugError::UnknownBreakpoint(id))
    }

    /// Watch a tag; change notifications arrive in [`StepOutcome::events`].
    pub fn watch(&mut self, tag: TagId) -> DebugResult<MonitorId> {
        Ok(self.driver.monitor(tag)?)
    }

    pub fn unwatch(&mut self, id: MonitorId) -> DebugResult<()> {
        Ok(self.driver.unmonitor(id)?)
    }

    pub fn force(&mut self, tag: TagId, value: Value) -> DebugResult<()> {
        Ok(self.driver.force(tag, value)?)
    }

    pub fn remove_force(&mut self, tag: TagId) -> DebugResult<()> {
        Ok(self.driver.remove_force(tag)?)
    }

    pub fn rewind(&mut self, scan: u64) -> DebugResult<&Snapshot> {
        self.status = SessionStatus::Paused;
        Ok(self.driver.rewind(scan)?)
    }

    /// Request that an in-progress `resume` stop at the next scan
    /// boundary. Scans themselves are never interrupted.
    pub fn pause(&mut self) {
        self.pause_requested = true;
    }

    /// Execute exactly one scan and evaluate break conditions.
    pub fn step(&mut self, dt: Dt) -> DebugResult<StepOutcome> {
        let events = self.driver.step(dt)?;
        let hits = self.matched_breakpoints();
        self.status = if hits.is_empty() {
            SessionStatus::Ready
        } else {
            SessionStatus::Paused
        };
        Ok(StepOutcome { events, hits })
    }

    /// Step until a breakpoint matches, a pause request lands, or
    /// `limit` scans have run.
    pub fn resume(&mut self, dt: Dt, limit: u64) -> DebugResult<StopReason> {
        self.status = SessionStatus::Running;
        for _ in 0..limit {
            if self.pause_requested {
                self.pause_requested = false;
                self.status = SessionStatus::Paused;
                return Ok(StopReason::PauseRequested);
            }
            let outcome = self.step(dt)?;
            if !outcome.hits.is_empty() {
                self.status = SessionStatus::Paused;
                return Ok(StopReason::Breakpoints(outcome.hits));
            }
        }
        self.status = SessionStatus::Ready;
        Ok(StopReason::LimitReached)
    }

    fn matched_breakpoints(&self) -> Vec<BreakpointId> {
        let history = self.driver.history();
        let current = self.driver.current();
        // The input snapshot of the scan that just ran.
        let previous = history
            .len()
            .checked_sub(2)
            .and_then(|i| history.get(i));

        self.breakpoints
            .iter()
            .filter(|(_, condition)| match condition {
                BreakCondition::RungFired(rung) => self
                    .driver
                    .program()
                    .rungs()
                    .get(*rung)
                    .zip(self.driver.last_report())
                    .map(|(rung, report)| report.fired(rung.body))
                    .unwrap_or(false),
                BreakCondition::TagChanged(tag) => previous
                    .map(|p| current.changed_from(p).contains(tag))
                    .unwrap_or(false),
                BreakCondition::ScanReached(scan) => current.scan_index() == *scan,
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_model::{Expr, ProgramBuilder, TargetProfile, ValueKind};

    const DT: Dt = Dt(10_000);

    fn session() -> (DebugSession, TagId, TagId) {
        let mut b = ProgramBuilder::new(TargetProfile::generic());
        let button = b.declare("button", ValueKind::Bool).unwrap();
        let light = b.declare("light", ValueKind::Bool).unwrap();
        b.begin_rung(Expr::Tag(button)).unwrap();
        b.out(light).unwrap();
        b.end_rung().unwrap();
        (
            DebugSession::new(b.finish().unwrap(), RewindPolicy::Truncate),
            button,
            light,
        )
    }

    #[test]
    fn scan_reached_breakpoint_pauses_resume() {
        let (mut session, _, _) = session();
        let bp = session
            .add_breakpoint(BreakCondition::ScanReached(3))
            .unwrap();

        let reason = session.resume(DT, 100).unwrap();
        assert_eq!(reason, StopReason::Breakpoints(vec![bp]));
        assert_eq!(session.current().scan_index(), 3);
        assert_eq!(session.status(), SessionStatus::Paused);
    }

    #[test]
    fn tag_change_breakpoint_fires_once_per_change() {
        let (mut session, button, light) = session();
        session
            .add_breakpoint(BreakCondition::TagChanged(light))
            .unwrap();

        assert_eq!(session.resume(DT, 5).unwrap(), StopReason::LimitReached);

        session.force(button, Value::Bool(true)).unwrap();
        let reason = session.resume(DT, 5).unwrap();
        assert!(matches!(reason, StopReason::Breakpoints(_)));
        assert_eq!(
            session.current().read(light).unwrap(),
            Value::Bool(true)
        );

        // Value now stable again; no further stop.
        assert_eq!(session.resume(DT, 5).unwrap(), StopReason::LimitReached);
    }

    #[test]
    fn rung_fired_breakpoint_and_watches() {
        let (mut session, button, light) = session();
        let bp = session
            .add_breakpoint(BreakCondition::RungFired(0))
            .unwrap();
        session.watch(light).unwrap();

        assert!(matches!(
            session.add_breakpoint(BreakCondition::RungFired(9)),
            Err(DebugError::UnknownRung(9))
        ));

        let outcome = session.step(DT).unwrap();
        assert!(outcome.hits.is_empty());
        assert!(outcome.events.is_empty());

        session.force(button, Value::Bool(true)).unwrap();
        let outcome = session.step(DT).unwrap();
        assert_eq!(outcome.hits, vec![bp]);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].value, Value::Bool(true));
    }

    #[test]
    fn pause_request_lands_at_the_next_scan_boundary() {
        let (mut session, _, _) = session();
        session.pause();
        assert_eq!(session.resume(DT, 50).unwrap(), StopReason::PauseRequested);
        assert_eq!(session.current().scan_index(), 0);
        assert_eq!(session.status(), SessionStatus::Paused);
    }

    #[test]
    fn removing_a_breakpoint_clears_it() {
        let (mut session, _, _) = session();
        let bp = session
            .add_breakpoint(BreakCondition::ScanReached(1))
            .unwrap();
        session.remove_breakpoint(bp).unwrap();
        assert!(matches!(
            session.remove_breakpoint(bp),
            Err(DebugError::UnknownBreakpoint(_))
        ));
        assert_eq!(session.resume(DT, 3).unwrap(), StopReason::LimitReached);
    }
}
