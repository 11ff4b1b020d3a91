//! Wire exchange seam
//!
//! `send`/`receive` instructions issue their request during Phase 2
//! through this trait and expect the effect within the same scan; the
//! implementing protocol layer owns whatever buffering makes that
//! appear synchronous. A failed exchange is a defined outcome, never a
//! scan failure: the destination tag is left unchanged and the fault is
//! recorded in the scan report.

use thiserror::Error;

use relay_model::{HwAddress, Value};

/// Defined failure outcomes of a wire exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("no exchange surface attached")]
    Disconnected,

    #[error("address not mapped: {0}")]
    Unmapped(HwAddress),

    #[error("exchange timed out at {0}")]
    Timeout(HwAddress),

    #[error("remote value kind not accepted at {0}")]
    KindMismatch(HwAddress),
}

/// Register-mapped read/write surface, blocking within one scan.
pub trait Exchange {
    fn read(&mut self, address: HwAddress) -> std::result::Result<Value, ExchangeError>;
    fn write(&mut self, address: HwAddress, value: Value) -> std::result::Result<(), ExchangeError>;
}

/// Exchange surface for programs with no wire instructions; every
/// request reports [`ExchangeError::Disconnected`].
#[derive(Debug, Default)]
pub struct NullExchange;

impl Exchange for NullExchange {
    fn read(&mut self, address: HwAddress) -> std::result::Result<Value, ExchangeError> {
        let _ = address;
        Err(ExchangeError::Disconnected)
    }

    fn write(&mut self, address: HwAddress, value: Value) -> std::result::Result<(), ExchangeError> {
        let _ = (address, value);
        Err(ExchangeError::Disconnected)
    }
}
