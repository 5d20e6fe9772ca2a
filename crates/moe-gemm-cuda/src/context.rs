//! Device discovery.

use crate::error::Result;
use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{CudaDevice, CudaStream};
use moe_gemm::{DeviceContext, DeviceLimits};
use std::sync::Arc;

/// A CUDA device with its queried [`DeviceContext`].
///
/// Properties are read once here; selection never queries the driver.
pub struct CudaContext {
    device: Arc<CudaDevice>,
    device_context: DeviceContext,
}

impl CudaContext {
    /// Context on device 0.
    pub fn new() -> Result<Self> {
        Self::on_device(0)
    }

    /// Context on the device with the given ordinal.
    ///
    /// Fails with an unsupported-architecture error on devices outside the
    /// supported compute-capability bands.
    pub fn on_device(ordinal: usize) -> Result<Self> {
        let device = CudaDevice::new(ordinal)?;
        let attr = |a: CUdevice_attribute| device.attribute(a).map(|v| v.max(0) as usize);

        let major = attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)?;
        let minor = attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)?;
        let sm_count = attr(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)?;
        let limits = DeviceLimits {
            max_shared_memory_per_sm: attr(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_MULTIPROCESSOR,
            )?,
            max_shared_memory_per_block_optin: attr(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK_OPTIN,
            )?,
            max_registers_per_sm: attr(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_REGISTERS_PER_MULTIPROCESSOR,
            )?,
            max_threads_per_sm: attr(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_MULTIPROCESSOR,
            )?,
            max_blocks_per_sm: attr(
                CUdevice_attribute::CU_DEVICE_ATTRIBUTE_MAX_BLOCKS_PER_MULTIPROCESSOR,
            )?,
        };

        let sm_version = (major * 10 + minor) as u32;
        let device_context = DeviceContext::new(sm_version, sm_count as u32, limits)?;
        tracing::info!(
            ordinal,
            sm = sm_version,
            sm_count,
            tier = %device_context.tier(),
            "created CUDA context"
        );

        Ok(Self {
            device,
            device_context,
        })
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.device_context
    }

    /// A new stream for launches, ordered after work already on the
    /// default stream.
    pub fn stream(&self) -> Result<CudaStream> {
        Ok(self.device.fork_default_stream()?)
    }
}
