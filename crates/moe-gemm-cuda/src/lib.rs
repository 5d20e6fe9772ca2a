//! CUDA backend for grouped Mixture-of-Experts GEMM.
//!
//! [`CudaContext`] queries the device once and builds the
//! [`DeviceContext`](moe_gemm::DeviceContext) selection runs against.
//! [`CudaGroupedGemm`] loads a PTX module with the kernel family for that
//! device and implements [`GroupedGemmKernel`](moe_gemm::GroupedGemmKernel)
//! on top of cudarc streams.
//!
//! # Example
//!
//! ```ignore
//! use moe_gemm::{ActivationType, ElementType, ExpertGroupDescriptor, WeightType};
//! use moe_gemm_cuda::{moe_gemm_runner, CudaContext, CudaOperands, DeviceBuffer};
//!
//! let ctx = CudaContext::new()?;
//! let ptx = cudarc::nvrtc::Ptx::from_file("moe_gemm_sm80.ptx");
//! let runner = moe_gemm_runner(&ctx, ptx, ElementType::F16, WeightType::F16)?;
//!
//! let desc = ExpertGroupDescriptor::new(num_experts, &bounds, n, k)?;
//! let stream = ctx.stream()?;
//! let report = runner.moe_gemm_bias_act(&desc, ActivationType::Relu, &mut operands, &stream)?;
//! ```

mod context;
mod error;
mod kernels;
mod memory;

pub use context::CudaContext;
pub use error::{CudaError, Result};
pub use kernels::{kernel_symbols, CudaGroupedGemm};
pub use memory::{upload_row_boundaries, CudaOperands, DeviceBuffer};

use cudarc::nvrtc::Ptx;
use moe_gemm::{ElementType, MoeGemmRunner, WeightType};

/// Runner over device kernels.
pub type CudaMoeGemmRunner = MoeGemmRunner<CudaGroupedGemm>;

/// Load the kernel family for `ctx` and wrap it in a runner.
pub fn moe_gemm_runner(
    ctx: &CudaContext,
    ptx: Ptx,
    element: ElementType,
    weight: WeightType,
) -> Result<CudaMoeGemmRunner> {
    let kernel = CudaGroupedGemm::load(ctx, ptx, element, weight)?;
    Ok(MoeGemmRunner::new(
        ctx.device_context().clone(),
        element,
        weight,
        kernel,
    )?)
}
