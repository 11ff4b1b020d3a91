//! Relay scan engine
//!
//! Executes one immutable program against one immutable snapshot,
//! producing the next snapshot via the two-phase algorithm: Phase 1
//! evaluates every rung and branch condition against the input snapshot
//! only; Phase 2 applies instruction effects in source order against a
//! single working copy. The engine is stateless between scans; all
//! persistence (latches, timer accumulators, counter state, forces)
//! lives in the snapshot.
//!
//! The [`driver::Driver`] is the caller-facing stepping surface; the
//! engine never advances itself.

pub mod driver;
pub mod error;
pub mod exchange;
pub mod scan;
pub mod snapshot;

pub use driver::{Driver, DriverError, DriverResult, MonitorEvent, MonitorId, RewindPolicy};
pub use error::{Error, Result};
pub use exchange::{Exchange, ExchangeError, NullExchange};
pub use scan::{scan, scan_with_io, Dt, ScanOutcome, ScanReport};
pub use snapshot::{Snapshot, TagState};
