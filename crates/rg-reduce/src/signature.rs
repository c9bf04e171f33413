//! Typed cache keys for compiled reduction graphs.

use std::fmt;

use rg_tensor::{DType, Shape};

use crate::axis::AxisSet;
use crate::request::ReduceOp;

/// A floating scalar parameter compared by exact bit pattern.
///
/// `-0.0` folds to `0.0` and every NaN folds to one quiet NaN, so values that
/// build identical graphs always produce identical keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarKey(u64);

impl ScalarKey {
    pub fn new(value: f64) -> Self {
        let canonical = if value.is_nan() {
            f64::NAN
        } else if value == 0.0 {
            0.0
        } else {
            value
        };
        ScalarKey(canonical.to_bits())
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Dtype and shape of one bound operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperandKey {
    pub dtype: DType,
    pub shape: Shape,
}

/// Every structural property that determines a reduction graph's topology.
///
/// Equal signatures imply interchangeable compiled graphs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub op: ReduceOp,
    pub inputs: Vec<OperandKey>,
    pub axes: AxisSet,
    pub keepdim: bool,
    /// Dtype the reduction itself runs in after the upcast rule.
    pub working: DType,
    pub outputs: Vec<DType>,
    pub scalar: Option<ScalarKey>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.op)?;
        for (i, input) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}{}", input.dtype, input.shape)?;
        }
        write!(
            f,
            "; axes={}, keepdim={}, working={}",
            self.axes, self.keepdim, self.working
        )?;
        if let Some(scalar) = self.scalar {
            write!(f, ", scalar={}", scalar.value())?;
        }
        write!(f, ") -> {:?}", self.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sig(scalar: Option<f64>) -> Signature {
        Signature {
            op: ReduceOp::Norm,
            inputs: vec![OperandKey {
                dtype: DType::F32,
                shape: Shape::from([4, 5]),
            }],
            axes: AxisSet::Dims(vec![1]),
            keepdim: false,
            working: DType::F32,
            outputs: vec![DType::F32],
            scalar: scalar.map(ScalarKey::new),
        }
    }

    #[test]
    fn test_close_scalars_stay_distinct() {
        // Text formatting at a fixed precision would collapse these.
        let a = sig(Some(2.0));
        let b = sig(Some(2.0000000001));
        assert_ne!(a, b);
    }

    #[test]
    fn test_signed_zero_and_nan_fold() {
        assert_eq!(ScalarKey::new(-0.0), ScalarKey::new(0.0));
        let quiet = f64::NAN;
        let other_nan = f64::from_bits(quiet.to_bits() | 1);
        assert_eq!(ScalarKey::new(quiet), ScalarKey::new(other_nan));
    }

    #[test]
    fn test_hash_set_dedups() {
        let mut set = HashSet::new();
        set.insert(sig(Some(3.0)));
        set.insert(sig(Some(3.0)));
        set.insert(sig(None));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        let s = sig(Some(f64::INFINITY)).to_string();
        assert_eq!(s, "norm(f32[4, 5]; axes=[1], keepdim=false, working=f32, scalar=inf) -> [F32]");
    }
}
