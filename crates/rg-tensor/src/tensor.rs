use crate::device::Device;
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// A contiguous, row-major tensor backed by CPU storage.
///
/// The dtype is the storage's dtype; the device is a location tag used to
/// reject operands bound to different compute locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
    device: Device,
}

impl Tensor {
    /// Create a new F32 tensor from data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: CpuStorage::F32(data),
            shape,
            device: Device::Cpu,
        }
    }

    /// Wrap existing storage with a shape.
    ///
    /// # Errors
    /// Returns an error if the storage length does not match the shape.
    pub fn from_storage(storage: CpuStorage, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if storage.len() != shape.numel() {
            return Err(TensorError::LengthMismatch {
                len: storage.len(),
                shape: shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage,
            shape,
            device: Device::Cpu,
        })
    }

    /// Create a zero-filled tensor. This is how the storage layer hands out
    /// freshly allocated output buffers.
    pub fn zeros(shape: impl Into<Shape>, dtype: DType) -> Self {
        Self::full(shape, dtype, 0.0)
    }

    /// Create a tensor with every element set to `value`.
    pub fn full(shape: impl Into<Shape>, dtype: DType, value: f64) -> Self {
        let shape = shape.into();
        Tensor {
            storage: CpuStorage::filled(dtype, shape.numel(), value),
            shape,
            device: Device::Cpu,
        }
    }

    /// Rebind the tensor to another device tag.
    pub fn on_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Returns the device tag.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }

    /// Returns the underlying storage for in-place writes.
    pub fn storage_mut(&mut self) -> &mut CpuStorage {
        &mut self.storage
    }

    /// All elements widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.storage.to_f64_vec()
    }
}
