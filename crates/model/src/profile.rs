//! Target numeric profiles
//!
//! Timer and counter behavior is hardware-specific: register width, time
//! base and overflow handling differ between controller families. A
//! profile pins those choices as data so the engine and the code
//! generator never assume a generic width.

use serde::{Deserialize, Serialize};

/// Width of a timer/counter hardware register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntWidth {
    W16,
    W32,
}

impl IntWidth {
    /// Largest representable value at this width.
    pub fn max(self) -> u64 {
        match self {
            IntWidth::W16 => u16::MAX as u64,
            IntWidth::W32 => u32::MAX as u64,
        }
    }

    /// Mask a raw count to this width (wraparound).
    pub fn mask(self, raw: u64) -> u64 {
        raw & self.max()
    }
}

/// What a timer register does when accumulation exceeds its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Wrap around to zero, losing the done state.
    Wrap,
    /// Clamp at the width's maximum.
    Saturate,
}

/// Pinned numeric behavior for one controller target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    /// Timer accumulator register width.
    pub timer_width: IntWidth,
    /// Microseconds per timer count. Elapsed time below one count within
    /// a single scan is truncated, matching count-register hardware.
    pub time_base_us: u64,
    /// Counter register width.
    pub counter_width: IntWidth,
    /// Timer accumulator overflow behavior. Counters always wrap.
    pub timer_overflow: OverflowPolicy,
}

impl TargetProfile {
    /// 32-bit registers, 1 ms time base, saturating timers. The default
    /// soft-controller target.
    pub fn generic() -> Self {
        Self {
            timer_width: IntWidth::W32,
            time_base_us: 1_000,
            counter_width: IntWidth::W32,
            timer_overflow: OverflowPolicy::Saturate,
        }
    }

    /// 16-bit registers, 10 ms time base, wrapping timers. Models
    /// microcontroller-class hardware with narrow counter registers.
    pub fn micro16() -> Self {
        Self {
            timer_width: IntWidth::W16,
            time_base_us: 10_000,
            counter_width: IntWidth::W16,
            timer_overflow: OverflowPolicy::Wrap,
        }
    }
}

impl Default for TargetProfile {
    fn default() -> Self {
        Self::generic()
    }
}
