//! Device grouped GEMM kernels.

use crate::context::CudaContext;
use crate::error::{CudaError, Result};
use crate::memory::{CudaOperands, DeviceBuffer};
use cudarc::driver::sys::CUfunction_attribute;
use cudarc::driver::{CudaDevice, CudaFunction, CudaStream, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::Ptx;
use moe_gemm::{
    ArchDispatcher, ArchitectureTier, ConfigCatalog, DeviceLimits, ElementType,
    EpilogueSelection, GroupedGemmArguments, GroupedGemmKernel, KernelVariant, OperatorClass,
    WeightType,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Module name grouped GEMM kernels are loaded under.
const MODULE_NAME: &str = "moe_gemm";

/// Dynamic shared memory a kernel may use without opting in.
const DEFAULT_SHARED_MEMORY_LIMIT: usize = 48 << 10;

/// Activation/weight pairs with a precision path.
const TYPE_PAIRS: [(ElementType, WeightType); 4] = [
    (ElementType::F16, WeightType::F16),
    (ElementType::F16, WeightType::U8),
    (ElementType::F16, WeightType::U4),
    (ElementType::F32, WeightType::F32),
];

struct SymbolTable {
    tier: ArchitectureTier,
    element: ElementType,
    weight: WeightType,
    names: Vec<String>,
}

/// Every instantiated kernel symbol: catalog configs × epilogues, per tier
/// and type pair.
static KERNEL_SYMBOLS: Lazy<Vec<SymbolTable>> = Lazy::new(|| {
    let mut tables = Vec::new();
    for tier in ArchitectureTier::ALL {
        for (element, weight) in TYPE_PAIRS {
            let Ok(dispatcher) = ArchDispatcher::for_tier(tier, element, weight) else {
                continue;
            };
            let names = ConfigCatalog::global()
                .get(tier, dispatcher.path())
                .iter()
                .filter_map(|config| dispatcher.resolve(config).ok())
                .flat_map(|variant| {
                    EpilogueSelection::ALL
                        .into_iter()
                        .map(move |epilogue| variant.kernel_name(&epilogue))
                })
                .collect();
            tables.push(SymbolTable {
                tier,
                element,
                weight,
                names,
            });
        }
    }
    tables
});

/// Kernel symbols a module must export for a tier and type pair.
pub fn kernel_symbols(
    tier: ArchitectureTier,
    element: ElementType,
    weight: WeightType,
) -> Vec<&'static str> {
    KERNEL_SYMBOLS
        .iter()
        .find(|t| t.tier == tier && t.element == element && t.weight == weight)
        .map(|t| t.names.iter().map(String::as_str).collect())
        .unwrap_or_default()
}

/// Grouped GEMM kernels of one tier and type pair, loaded from PTX.
///
/// The module must export every symbol from [`kernel_symbols`]. Each kernel
/// takes, in order: the A, B, scale, bias, C and boundary-table pointers
/// (null for absent scale and bias), `total_rows`, `gemm_n`, `gemm_k` as
/// `i64`, `num_experts` as `i32`, and `alpha` as `f32`.
pub struct CudaGroupedGemm {
    device: Arc<CudaDevice>,
}

impl CudaGroupedGemm {
    /// Load the kernel family for `ctx`'s tier from `ptx`.
    pub fn load(
        ctx: &CudaContext,
        ptx: Ptx,
        element: ElementType,
        weight: WeightType,
    ) -> Result<Self> {
        let tier = ctx.device_context().tier();
        // Surfaces the type-pair error before touching the driver
        ArchDispatcher::for_tier(tier, element, weight)?;
        let names = kernel_symbols(tier, element, weight);

        let device = ctx.device().clone();
        device.load_ptx(ptx, MODULE_NAME, &names)?;
        if let Some(missing) = names.iter().find(|n| !device.has_func(MODULE_NAME, n)) {
            return Err(CudaError::KernelNotFound(missing.to_string()));
        }
        tracing::debug!(kernels = names.len(), %tier, "loaded grouped gemm module");

        Ok(Self { device })
    }

    fn function(&self, name: &str) -> std::result::Result<CudaFunction, String> {
        self.device
            .get_func(MODULE_NAME, name)
            .ok_or_else(|| format!("kernel {} is not loaded", name))
    }

    /// Raise the dynamic shared memory cap of `func` past the default when
    /// `variant` needs it.
    fn opt_in_shared_memory(
        func: &CudaFunction,
        variant: &KernelVariant,
    ) -> std::result::Result<(), String> {
        let smem = variant.shared_memory_bytes();
        if smem <= DEFAULT_SHARED_MEMORY_LIMIT {
            return Ok(());
        }
        func.set_attribute(
            CUfunction_attribute::CU_FUNC_ATTRIBUTE_MAX_DYNAMIC_SHARED_SIZE_BYTES,
            smem as i32,
        )
        .map_err(|e| e.to_string())
    }

    /// Driver occupancy of the loaded kernel, using its real register and
    /// shared memory footprint.
    fn driver_occupancy(&self, variant: &KernelVariant) -> std::result::Result<u32, String> {
        // Every epilogue shares the mainloop; the plain one stands in for all
        let func = self.function(&variant.kernel_name(&EpilogueSelection::no_bias()))?;
        Self::opt_in_shared_memory(&func, variant)?;
        func.occupancy_max_active_blocks_per_multiprocessor(
            variant.thread_count() as u32,
            variant.shared_memory_bytes(),
            None,
        )
        .map_err(|e| e.to_string())
    }
}

fn check_size(what: &str, buf: &DeviceBuffer, want: usize) -> std::result::Result<(), String> {
    if buf.bytes() < want {
        return Err(format!("{} holds {} bytes, needs {}", what, buf.bytes(), want));
    }
    Ok(())
}

impl GroupedGemmKernel for CudaGroupedGemm {
    type Operands = CudaOperands;
    type Stream = CudaStream;

    fn can_implement(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &CudaOperands,
    ) -> std::result::Result<(), String> {
        let v = &args.variant;
        let p = &args.problem;
        let elem = v.element().bits() as usize;
        let weight = v.weight().bits() as usize;

        let name = v.kernel_name(&args.epilogue);
        if !self.device.has_func(MODULE_NAME, &name) {
            return Err(format!("kernel {} is not loaded", name));
        }

        check_size("activations", &operands.activations, p.total_rows * p.gemm_k * elem / 8)?;
        check_size(
            "weights",
            &operands.weights,
            (p.num_experts * p.gemm_k * p.gemm_n * weight).div_ceil(8),
        )?;
        check_size("output", &operands.output, p.total_rows * p.gemm_n * elem / 8)?;
        check_size("row boundaries", &operands.row_boundaries, p.num_experts * 8)?;
        if let Some(bias) = &operands.bias {
            check_size("bias", bias, p.num_experts * p.gemm_n * elem / 8)?;
        }
        if let Some(scales) = &operands.weight_scales {
            check_size("weight scales", scales, p.num_experts * p.gemm_n * elem / 8)?;
        }

        if v.operator_class() == OperatorClass::TensorOp {
            for (what, buf) in [
                ("activations", &operands.activations),
                ("weights", &operands.weights),
                ("output", &operands.output),
            ] {
                if !buf.is_aligned(128) {
                    return Err(format!("{} is not 16-byte aligned", what));
                }
            }
        }
        Ok(())
    }

    /// Zero when the analytic estimate already rules the variant out, which
    /// keeps the opt-in limit rule. Otherwise the driver's answer for the
    /// loaded function, falling back to the estimate if the query fails.
    fn max_active_blocks(&self, variant: &KernelVariant, limits: &DeviceLimits) -> u32 {
        let analytic = moe_gemm::max_active_blocks(variant, limits);
        if analytic == 0 {
            return 0;
        }
        match self.driver_occupancy(variant) {
            Ok(occupancy) => occupancy,
            Err(e) => {
                tracing::warn!(
                    kernel = %variant.kernel_name(&EpilogueSelection::no_bias()),
                    error = %e,
                    "occupancy query failed, using estimate"
                );
                analytic
            }
        }
    }

    fn initialize(
        &self,
        args: &GroupedGemmArguments<'_>,
        _operands: &CudaOperands,
    ) -> std::result::Result<(), String> {
        let func = self.function(&args.variant.kernel_name(&args.epilogue))?;
        Self::opt_in_shared_memory(&func, &args.variant)
    }

    fn run(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &mut CudaOperands,
        stream: &CudaStream,
    ) -> std::result::Result<(), String> {
        let v = &args.variant;
        let p = &args.problem;
        let func = self.function(&v.kernel_name(&args.epilogue))?;
        let cfg = LaunchConfig {
            grid_dim: (args.threadblock_count, 1, 1),
            block_dim: (v.thread_count() as u32, 1, 1),
            shared_mem_bytes: v.shared_memory_bytes() as u32,
        };
        let ptr = |b: Option<DeviceBuffer>| b.map_or(0, |b| b.device_ptr());
        let params = (
            operands.activations.device_ptr(),
            operands.weights.device_ptr(),
            ptr(operands.weight_scales),
            ptr(operands.bias),
            operands.output.device_ptr(),
            operands.row_boundaries.device_ptr(),
            p.total_rows as i64,
            p.gemm_n as i64,
            p.gemm_k as i64,
            p.num_experts as i32,
            args.params.alpha,
        );

        unsafe { func.launch_on_stream(stream, cfg, params) }.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_symbol_counts() {
        // 3 tiles × stages 2..=4 × 8 epilogues
        let ampere = kernel_symbols(ArchitectureTier::Ampere, ElementType::F16, WeightType::F16);
        assert_eq!(ampere.len(), 72);
        // 2 tiles × 1 stage × 8 epilogues
        let volta = kernel_symbols(ArchitectureTier::Volta, ElementType::F16, WeightType::U8);
        assert_eq!(volta.len(), 16);
        let simt = kernel_symbols(ArchitectureTier::Ampere, ElementType::F32, WeightType::F32);
        assert_eq!(simt.len(), 8);
    }

    #[test]
    fn test_symbols_unique() {
        for tier in ArchitectureTier::ALL {
            for (element, weight) in TYPE_PAIRS {
                let names = kernel_symbols(tier, element, weight);
                let unique: HashSet<_> = names.iter().collect();
                assert_eq!(unique.len(), names.len());
            }
        }
    }

    #[test]
    fn test_unsupported_pair_has_no_symbols() {
        let symbols = kernel_symbols(ArchitectureTier::Turing, ElementType::F32, WeightType::U4);
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_symbol_format() {
        let names = kernel_symbols(ArchitectureTier::Turing, ElementType::F16, WeightType::U4);
        assert!(names.contains(&"moe_gemm_sm75_f16_u4_32x128x64_32x32x64_s2_bias_silu"));
    }
}
