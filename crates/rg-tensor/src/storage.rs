use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage, one variant per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F16(Vec<f16>),
    F32(Vec<f32>),
}

/// Applies `$body` to the inner vector of any storage variant.
macro_rules! with_storage {
    ($storage:expr, $v:ident => $body:expr) => {
        match $storage {
            CpuStorage::Bool($v) => $body,
            CpuStorage::U8($v) => $body,
            CpuStorage::I8($v) => $body,
            CpuStorage::I16($v) => $body,
            CpuStorage::I32($v) => $body,
            CpuStorage::I64($v) => $body,
            CpuStorage::F16($v) => $body,
            CpuStorage::F32($v) => $body,
        }
    };
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::Bool(_) => DType::Bool,
            CpuStorage::U8(_) => DType::U8,
            CpuStorage::I8(_) => DType::I8,
            CpuStorage::I16(_) => DType::I16,
            CpuStorage::I32(_) => DType::I32,
            CpuStorage::I64(_) => DType::I64,
            CpuStorage::F16(_) => DType::F16,
            CpuStorage::F32(_) => DType::F32,
        }
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        Self::filled(dtype, n, 0.0)
    }

    /// Create storage with every element set to `value`, rounded into `dtype`.
    pub fn filled(dtype: DType, n: usize, value: f64) -> Self {
        match dtype {
            DType::Bool => CpuStorage::Bool(vec![value != 0.0; n]),
            DType::U8 => CpuStorage::U8(vec![value as u8; n]),
            DType::I8 => CpuStorage::I8(vec![value as i8; n]),
            DType::I16 => CpuStorage::I16(vec![value as i16; n]),
            DType::I32 => CpuStorage::I32(vec![value as i32; n]),
            DType::I64 => CpuStorage::I64(vec![value as i64; n]),
            DType::F16 => CpuStorage::F16(vec![f16::from_f64(value); n]),
            DType::F32 => CpuStorage::F32(vec![value as f32; n]),
        }
    }

    /// Build storage of `dtype` from f64 working values, rounding each one
    /// the way [`DType::round_value`] does.
    pub fn from_f64_slice(dtype: DType, data: &[f64]) -> Self {
        match dtype {
            DType::Bool => CpuStorage::Bool(data.iter().map(|&s| s != 0.0).collect()),
            DType::U8 => CpuStorage::U8(data.iter().map(|&s| s as u8).collect()),
            DType::I8 => CpuStorage::I8(data.iter().map(|&s| s as i8).collect()),
            DType::I16 => CpuStorage::I16(data.iter().map(|&s| s as i16).collect()),
            DType::I32 => CpuStorage::I32(data.iter().map(|&s| s as i32).collect()),
            DType::I64 => CpuStorage::I64(data.iter().map(|&s| s as i64).collect()),
            DType::F16 => CpuStorage::F16(data.iter().map(|&s| f16::from_f64(s)).collect()),
            DType::F32 => CpuStorage::F32(data.iter().map(|&s| s as f32).collect()),
        }
    }

    /// Element `i` widened to f64.
    ///
    /// # Panics
    /// Panics if `i >= len()`.
    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            CpuStorage::Bool(v) => {
                if v[i] {
                    1.0
                } else {
                    0.0
                }
            }
            CpuStorage::U8(v) => v[i] as f64,
            CpuStorage::I8(v) => v[i] as f64,
            CpuStorage::I16(v) => v[i] as f64,
            CpuStorage::I32(v) => v[i] as f64,
            CpuStorage::I64(v) => v[i] as f64,
            CpuStorage::F16(v) => v[i].to_f64(),
            CpuStorage::F32(v) => v[i] as f64,
        }
    }

    /// All elements widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.get_f64(i)).collect()
    }

    /// Overwrite every element from f64 working values.
    ///
    /// # Errors
    /// Returns `LengthMismatch` if `data.len() != len()`; the storage is left
    /// unchanged.
    pub fn fill_from_f64(&mut self, data: &[f64]) -> Result<()> {
        if data.len() != self.len() {
            return Err(TensorError::LengthMismatch {
                len: data.len(),
                shape: vec![self.len()],
            });
        }
        *self = Self::from_f64_slice(self.dtype(), data);
        Ok(())
    }

    /// Set every element to `value`.
    pub fn fill(&mut self, value: f64) {
        *self = Self::filled(self.dtype(), self.len(), value);
    }

    /// Copy element `src_index` of `src` into element `dst_index`, converting
    /// through f64 when the dtypes differ.
    pub fn copy_element(&mut self, dst_index: usize, src: &CpuStorage, src_index: usize) {
        let value = src.get_f64(src_index);
        match self {
            CpuStorage::Bool(v) => v[dst_index] = value != 0.0,
            CpuStorage::U8(v) => v[dst_index] = value as u8,
            CpuStorage::I8(v) => v[dst_index] = value as i8,
            CpuStorage::I16(v) => v[dst_index] = value as i16,
            CpuStorage::I32(v) => v[dst_index] = value as i32,
            CpuStorage::I64(v) => v[dst_index] = value as i64,
            CpuStorage::F16(v) => v[dst_index] = f16::from_f64(value),
            CpuStorage::F32(v) => v[dst_index] = value as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let dtypes = [
            DType::Bool,
            DType::U8,
            DType::I8,
            DType::I16,
            DType::I32,
            DType::I64,
            DType::F16,
            DType::F32,
        ];
        for dtype in dtypes {
            let s = CpuStorage::zeros(dtype, 5);
            assert_eq!(s.len(), 5);
            assert_eq!(s.dtype(), dtype);
            assert!(s.to_f64_vec().iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_filled_and_fill() {
        let mut s = CpuStorage::filled(DType::I32, 3, 7.9);
        assert_eq!(s, CpuStorage::I32(vec![7, 7, 7]));
        s.fill(1.0);
        assert_eq!(s, CpuStorage::I32(vec![1, 1, 1]));
    }

    #[test]
    fn test_from_f64_rounds_into_dtype() {
        let s = CpuStorage::from_f64_slice(DType::Bool, &[0.0, 2.0, -1.0]);
        assert_eq!(s, CpuStorage::Bool(vec![false, true, true]));

        let s = CpuStorage::from_f64_slice(DType::I64, &[1.5, -2.5]);
        assert_eq!(s, CpuStorage::I64(vec![1, -2]));
    }

    #[test]
    fn test_fill_from_f64() {
        let mut s = CpuStorage::zeros(DType::I16, 3);
        s.fill_from_f64(&[1.9, -4.0, 300.0]).unwrap();
        assert_eq!(s, CpuStorage::I16(vec![1, -4, 300]));
    }

    #[test]
    fn test_fill_from_f64_length_mismatch() {
        let mut s = CpuStorage::filled(DType::F32, 3, 2.0);
        let err = s.fill_from_f64(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, TensorError::LengthMismatch { len: 2, .. }));
        assert_eq!(s, CpuStorage::F32(vec![2.0, 2.0, 2.0]));
    }

    #[test]
    fn test_f16_widening() {
        let s = CpuStorage::F16(vec![f16::from_f32(0.5), f16::from_f32(-2.0)]);
        assert_eq!(s.to_f64_vec(), vec![0.5, -2.0]);
    }

    #[test]
    fn test_copy_element_converts() {
        let src = CpuStorage::F32(vec![3.75, 4.0]);
        let mut dst = CpuStorage::zeros(DType::I16, 2);
        dst.copy_element(1, &src, 0);
        assert_eq!(dst, CpuStorage::I16(vec![0, 3]));
    }
}
