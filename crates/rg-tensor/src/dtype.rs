use std::fmt;

use half::f16;

/// Supported element types for tensor storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DType {
    /// Boolean, one byte per element.
    Bool,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 8-bit integer.
    I8,
    /// Signed 16-bit integer.
    I16,
    /// Signed 32-bit integer.
    I32,
    /// Signed 64-bit integer.
    I64,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
    /// 32-bit floating point.
    F32,
}

impl DType {
    /// Returns true for floating point dtypes (F16, F32).
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    /// Rounds an f64 working value to the nearest value representable in
    /// this dtype.
    ///
    /// - floats round to nearest (F16 through `half::f16`)
    /// - integers truncate toward zero and saturate at the type bounds; NaN maps to 0
    /// - Bool maps any nonzero value (including NaN) to 1
    pub fn round_value(&self, v: f64) -> f64 {
        match self {
            DType::F32 => v as f32 as f64,
            DType::F16 => f16::from_f64(v).to_f64(),
            DType::Bool => {
                if v != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            DType::U8 => v as u8 as f64,
            DType::I8 => v as i8 as f64,
            DType::I16 => v as i16 as f64,
            DType::I32 => v as i32 as f64,
            DType::I64 => v as i64 as f64,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::U8 => "u8",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::F32 => "f32",
        };
        write!(f, "{}", name)
    }
}
