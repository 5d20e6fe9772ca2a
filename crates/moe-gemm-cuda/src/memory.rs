//! Device operand views.

use crate::context::CudaContext;
use crate::error::Result;
use cudarc::driver::sys::CUdeviceptr;
use cudarc::driver::{CudaSlice, DevicePtr, DeviceRepr, DeviceSlice};
use moe_gemm::{ExpertGroupDescriptor, KernelOperands};

/// A non-owning, untyped view of device memory.
///
/// Holds a raw device pointer and a byte length. It does NOT free the
/// memory on drop; the allocation must outlive every launch that reads or
/// writes it, including launches still in flight on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    ptr: CUdeviceptr,
    bytes: usize,
}

impl DeviceBuffer {
    /// # Safety
    ///
    /// - `ptr` must point to at least `bytes` bytes of device memory
    /// - The memory must remain valid while the buffer is in use
    pub unsafe fn from_raw(ptr: CUdeviceptr, bytes: usize) -> Self {
        Self { ptr, bytes }
    }

    /// View of a cudarc allocation.
    pub fn of<T: DeviceRepr>(slice: &CudaSlice<T>) -> Self {
        Self {
            ptr: *slice.device_ptr(),
            bytes: slice.num_bytes(),
        }
    }

    pub fn device_ptr(&self) -> CUdeviceptr {
        self.ptr
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether the address is aligned for `bits`-wide accesses.
    pub fn is_aligned(&self, bits: usize) -> bool {
        self.ptr % (bits as u64 / 8).max(1) == 0
    }
}

/// Operands of a device grouped GEMM.
///
/// Layouts match the host reference backend: activations `[rows, k]`,
/// weights `[experts, k, n]`, scales and bias `[experts, n]`, output
/// `[rows, n]`, all row-major. `row_boundaries` is the device-resident copy
/// of the descriptor's `i64` boundary table.
#[derive(Debug, Clone, Copy)]
pub struct CudaOperands {
    pub activations: DeviceBuffer,
    pub weights: DeviceBuffer,
    pub weight_scales: Option<DeviceBuffer>,
    pub bias: Option<DeviceBuffer>,
    pub output: DeviceBuffer,
    pub row_boundaries: DeviceBuffer,
}

impl KernelOperands for CudaOperands {
    fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    fn has_weight_scales(&self) -> bool {
        self.weight_scales.is_some()
    }
}

/// Upload a descriptor's boundary table for the kernel's tile mapping.
pub fn upload_row_boundaries(
    ctx: &CudaContext,
    descriptor: &ExpertGroupDescriptor<'_>,
) -> Result<CudaSlice<i64>> {
    Ok(ctx.device().htod_sync_copy(descriptor.row_boundaries())?)
}
