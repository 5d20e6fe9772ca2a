//! Launch protocol shared by every kernel backend.
//!
//! A launch is four steps, each with its own error kind:
//!
//! 1. plan the grid from the variant's occupancy ([`plan_launch`]),
//! 2. pre-flight check the arguments (`Preflight`),
//! 3. initialize the kernel parameters (`Initialize`),
//! 4. enqueue on the caller's stream (`Launch`).
//!
//! Nothing here blocks on the stream. Completion is observed by the caller
//! through its own synchronization.

use crate::arch::{DeviceLimits, KernelVariant};
use crate::epilogue::{EpilogueParams, EpilogueSelection};
use crate::error::{MoeGemmError, Result};
use crate::heuristic::max_active_blocks;
use crate::types::ProblemShape;

/// Resident threadblocks per multiprocessor the grid is sized for.
pub const MAX_RESIDENT_WAVES: u32 = 2;

/// Operand bundle passed through to a kernel.
pub trait KernelOperands {
    fn has_bias(&self) -> bool;

    /// Per-column dequantization scales for weight-only kernels.
    fn has_weight_scales(&self) -> bool;
}

/// A grouped GEMM implementation that can run any [`KernelVariant`].
///
/// Implementors report failures as plain messages; the launcher attaches
/// the error kind for the step that failed.
pub trait GroupedGemmKernel {
    type Operands: KernelOperands;
    type Stream;

    /// Reject arguments this kernel cannot run.
    fn can_implement(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &Self::Operands,
    ) -> std::result::Result<(), String>;

    /// Resident threadblocks of `variant` per multiprocessor.
    ///
    /// Defaults to the analytic estimate. Zero means the variant cannot run.
    fn max_active_blocks(&self, variant: &KernelVariant, limits: &DeviceLimits) -> u32 {
        max_active_blocks(variant, limits)
    }

    /// Prepare launch parameters. The workspace is always empty.
    fn initialize(
        &self,
        _args: &GroupedGemmArguments<'_>,
        _operands: &Self::Operands,
    ) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Enqueue the kernel on `stream` without waiting for it.
    fn run(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &mut Self::Operands,
        stream: &Self::Stream,
    ) -> std::result::Result<(), String>;
}

/// Grid sizing for one variant on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPlan {
    /// Resident blocks per multiprocessor, capped at [`MAX_RESIDENT_WAVES`].
    pub occupancy: u32,
    pub threadblock_count: u32,
}

/// Size the grid for `variant` from its analytic occupancy.
///
/// Fails with a resource error when not a single threadblock fits.
pub fn plan_launch(
    variant: &KernelVariant,
    limits: &DeviceLimits,
    multi_processor_count: u32,
) -> Result<LaunchPlan> {
    LaunchPlan::from_occupancy(max_active_blocks(variant, limits), multi_processor_count)
}

impl LaunchPlan {
    /// Size the grid from an already known occupancy.
    pub fn from_occupancy(occupancy: u32, multi_processor_count: u32) -> Result<Self> {
        let occupancy = occupancy.min(MAX_RESIDENT_WAVES);
        if occupancy == 0 {
            return Err(MoeGemmError::Resource(
                "GPU lacks the shared memory resources to run GroupedGEMM kernel".to_string(),
            ));
        }
        Ok(Self {
            occupancy,
            threadblock_count: multi_processor_count * occupancy,
        })
    }
}

/// Everything a kernel needs to know about one launch, minus the operands.
#[derive(Debug, Clone, Copy)]
pub struct GroupedGemmArguments<'a> {
    pub variant: KernelVariant,
    pub epilogue: EpilogueSelection,
    pub params: EpilogueParams,
    pub problem: ProblemShape,
    pub row_boundaries: &'a [i64],
    pub threadblock_count: u32,
}

impl<'a> GroupedGemmArguments<'a> {
    /// Backend-independent pre-flight checks.
    pub fn validate<O: KernelOperands>(&self, operands: &O) -> std::result::Result<(), String> {
        let v = &self.variant;
        let p = &self.problem;
        if self.threadblock_count == 0 {
            return Err("threadblock count is zero".to_string());
        }
        if self.row_boundaries.len() != p.num_experts {
            return Err(format!(
                "{} row boundaries for {} experts",
                self.row_boundaries.len(),
                p.num_experts
            ));
        }
        if self.row_boundaries.first().is_some_and(|&b| b < 0)
            || self.row_boundaries.windows(2).any(|w| w[1] < w[0])
        {
            return Err("row boundaries must be non-negative and non-decreasing".to_string());
        }
        if p.gemm_k % v.access_width_a() != 0 {
            return Err(format!(
                "gemm_k={} is not a multiple of the A access width {}",
                p.gemm_k,
                v.access_width_a()
            ));
        }
        let n_align = v.access_width_b().max(v.access_width_c());
        if p.gemm_n % n_align != 0 {
            return Err(format!(
                "gemm_n={} is not a multiple of the B/C access width {}",
                p.gemm_n, n_align
            ));
        }
        if self.epilogue.has_bias() != operands.has_bias() {
            return Err("bias operand does not match the epilogue".to_string());
        }
        if v.path().is_weight_only() && !operands.has_weight_scales() {
            return Err("weight-only kernel requires weight scales".to_string());
        }
        Ok(())
    }
}

/// Run the pre-flight, initialize and enqueue steps for a planned launch.
pub fn launch_grouped_gemm<K: GroupedGemmKernel>(
    kernel: &K,
    args: &GroupedGemmArguments<'_>,
    operands: &mut K::Operands,
    stream: &K::Stream,
) -> Result<()> {
    args.validate(&*operands)
        .and_then(|()| kernel.can_implement(args, operands))
        .map_err(MoeGemmError::Preflight)?;
    kernel
        .initialize(args, operands)
        .map_err(MoeGemmError::Initialize)?;
    kernel
        .run(args, operands, stream)
        .map_err(MoeGemmError::Launch)?;

    tracing::debug!(
        kernel = %args.variant.kernel_name(&args.epilogue),
        threadblocks = args.threadblock_count,
        experts = args.problem.num_experts,
        rows = args.problem.total_rows,
        "launched grouped gemm"
    );
    Ok(())
}
