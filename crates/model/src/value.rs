//! Typed values
//!
//! A `Value` matches its tag's declared `ValueKind` and obeys the kind's
//! hardware width: integer arithmetic wraps at the declared width, floats
//! follow IEEE-754 via `f32`/`f64`. Cross-kind arithmetic and comparison
//! are undefined here and rejected at program build time.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed enumeration of tag value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ValueKind {
    pub fn is_bool(self) -> bool {
        self == ValueKind::Bool
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ValueKind::I8
                | ValueKind::U8
                | ValueKind::I16
                | ValueKind::U16
                | ValueKind::I32
                | ValueKind::U32
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, ValueKind::F32 | ValueKind::F64)
    }

    /// The zero/false value of this kind, used for tags declared without
    /// an explicit initial value.
    pub fn default_value(self) -> Value {
        match self {
            ValueKind::Bool => Value::Bool(false),
            ValueKind::I8 => Value::I8(0),
            ValueKind::U8 => Value::U8(0),
            ValueKind::I16 => Value::I16(0),
            ValueKind::U16 => Value::U16(0),
            ValueKind::I32 => Value::I32(0),
            ValueKind::U32 => Value::U32(0),
            ValueKind::F32 => Value::F32(0.0),
            ValueKind::F64 => Value::F64(0.0),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Bool => "bool",
            ValueKind::I8 => "i8",
            ValueKind::U8 => "u8",
            ValueKind::I16 => "i16",
            ValueKind::U16 => "u16",
            ValueKind::I32 => "i32",
            ValueKind::U32 => "u32",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// A runtime value, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::I8(_) => ValueKind::I8,
            Value::U8(_) => ValueKind::U8,
            Value::I16(_) => ValueKind::I16,
            Value::U16(_) => ValueKind::U16,
            Value::I32(_) => ValueKind::I32,
            Value::U32(_) => ValueKind::U32,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Same-kind addition with hardware overflow semantics: integers wrap
    /// at their declared width, floats follow IEEE-754 (overflow to
    /// infinity, NaN propagation). Returns `None` on kind mismatch.
    pub fn wrapping_add(&self, rhs: &Value) -> Option<Value> {
        let out = match (self, rhs) {
            (Value::I8(a), Value::I8(b)) => Value::I8(a.wrapping_add(*b)),
            (Value::U8(a), Value::U8(b)) => Value::U8(a.wrapping_add(*b)),
            (Value::I16(a), Value::I16(b)) => Value::I16(a.wrapping_add(*b)),
            (Value::U16(a), Value::U16(b)) => Value::U16(a.wrapping_add(*b)),
            (Value::I32(a), Value::I32(b)) => Value::I32(a.wrapping_add(*b)),
            (Value::U32(a), Value::U32(b)) => Value::U32(a.wrapping_add(*b)),
            (Value::F32(a), Value::F32(b)) => Value::F32(a + b),
            (Value::F64(a), Value::F64(b)) => Value::F64(a + b),
            _ => return None,
        };
        Some(out)
    }

    /// Same-kind subtraction with the same overflow semantics as
    /// [`Value::wrapping_add`].
    pub fn wrapping_sub(&self, rhs: &Value) -> Option<Value> {
        let out = match (self, rhs) {
            (Value::I8(a), Value::I8(b)) => Value::I8(a.wrapping_sub(*b)),
            (Value::U8(a), Value::U8(b)) => Value::U8(a.wrapping_sub(*b)),
            (Value::I16(a), Value::I16(b)) => Value::I16(a.wrapping_sub(*b)),
            (Value::U16(a), Value::U16(b)) => Value::U16(a.wrapping_sub(*b)),
            (Value::I32(a), Value::I32(b)) => Value::I32(a.wrapping_sub(*b)),
            (Value::U32(a), Value::U32(b)) => Value::U32(a.wrapping_sub(*b)),
            (Value::F32(a), Value::F32(b)) => Value::F32(a - b),
            (Value::F64(a), Value::F64(b)) => Value::F64(a - b),
            _ => return None,
        };
        Some(out)
    }

    /// Same-kind ordering. Float comparison follows IEEE-754 partial
    /// order: comparisons involving NaN return `None`, so every relation
    /// against NaN evaluates false downstream.
    pub fn partial_cmp_same_kind(&self, rhs: &Value) -> Option<Ordering> {
        match (self, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::I8(a), Value::I8(b)) => Some(a.cmp(b)),
            (Value::U8(a), Value::U8(b)) => Some(a.cmp(b)),
            (Value::I16(a), Value::I16(b)) => Some(a.cmp(b)),
            (Value::U16(a), Value::U16(b)) => Some(a.cmp(b)),
            (Value::I32(a), Value::I32(b)) => Some(a.cmp(b)),
            (Value::U32(a), Value::U32(b)) => Some(a.cmp(b)),
            (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
            (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Bitwise equality for change detection. Unlike `PartialEq`, treats
    /// NaN as equal to itself so a monitor does not fire every scan on a
    /// NaN-holding float tag.
    pub fn bits_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::F32(a), Value::F32(b)) => a.to_bits() == b.to_bits(),
            (Value::F64(a), Value::F64(b)) => a.to_bits() == b.to_bits(),
            _ => self == rhs,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
        }
    }
}
