use crate::arch::{ArchDispatcher, DeviceContext};
use crate::config::{ConfigCatalog, GemmConfig};
use crate::epilogue::{EpilogueParams, EpilogueSelection};
use crate::error::Result;
use crate::heuristic::{probe_candidates_with, select_config, ScoredConfig};
use crate::launcher::{
    launch_grouped_gemm, GroupedGemmArguments, GroupedGemmKernel, KernelOperands, LaunchPlan,
};
use crate::types::{
    ActivationType, ElementType, ExpertGroupDescriptor, PrecisionPath, ProblemShape, WeightType,
};

/// What was launched, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub config: GemmConfig,
    pub kernel_name: String,
    /// Resident blocks per multiprocessor the grid was sized for.
    pub occupancy: u32,
    pub threadblock_count: u32,
    /// Zero when the configuration was supplied by the caller.
    pub candidates_probed: usize,
}

/// Grouped MoE GEMM entry point for one device and one type pair.
///
/// Every call selects its configuration afresh: candidates come from the
/// process-wide catalog, are probed for occupancy on this device and scored
/// against the call's shape. Nothing is cached between calls, so a runner
/// can be shared across host threads.
///
/// # Example
///
/// ```
/// use moe_gemm::prelude::*;
///
/// let ctx = DeviceContext::for_sm_version(80, 108).unwrap();
/// let runner =
///     MoeGemmRunner::new(ctx, ElementType::F16, WeightType::F16, HostGroupedGemm).unwrap();
///
/// // 2 experts: rows 0..3 and 3..4
/// let bounds = [3i64, 4];
/// let desc = ExpertGroupDescriptor::new(2, &bounds, 8, 8).unwrap();
/// let mut ops = HostOperands {
///     activations: vec![1.0; 4 * 8],
///     weights: HostWeights::Float(vec![0.5; 2 * 8 * 8]),
///     weight_scales: None,
///     bias: Some(vec![-3.0; 2 * 8]),
///     output: vec![0.0; 4 * 8],
/// };
/// let stream = HostStream::new();
///
/// let report = runner
///     .moe_gemm_bias_act(&desc, ActivationType::Relu, &mut ops, &stream)
///     .unwrap();
/// assert_eq!(report.candidates_probed, 9);
/// assert!(ops.output.iter().all(|&x| x == 1.0)); // relu(8 × 0.5 − 3)
/// ```
#[derive(Debug, Clone)]
pub struct MoeGemmRunner<K> {
    context: DeviceContext,
    dispatcher: ArchDispatcher,
    kernel: K,
}

impl<K: GroupedGemmKernel> MoeGemmRunner<K> {
    /// Fails when the type pair has no precision path.
    pub fn new(
        context: DeviceContext,
        element: ElementType,
        weight: WeightType,
        kernel: K,
    ) -> Result<Self> {
        let dispatcher = ArchDispatcher::new(&context, element, weight)?;
        Ok(Self {
            context,
            dispatcher,
            kernel,
        })
    }

    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn precision_path(&self) -> PrecisionPath {
        self.dispatcher.path()
    }

    /// Catalog entries for this device and type pair.
    pub fn candidate_configs(&self) -> &'static [GemmConfig] {
        ConfigCatalog::global().get(self.dispatcher.tier(), self.dispatcher.path())
    }

    /// Occupancy of every candidate, in catalog order, as the kernel
    /// reports it.
    pub fn probe_occupancies(&self) -> Result<Vec<u32>> {
        let limits = self.context.limits();
        probe_candidates_with(&self.dispatcher, self.candidate_configs(), |variant| {
            self.kernel.max_active_blocks(variant, limits)
        })
    }

    /// Probe and score the catalog for `problem`.
    pub fn select_config(&self, problem: &ProblemShape) -> Result<ScoredConfig> {
        let occupancies = self.probe_occupancies()?;
        select_config(
            self.candidate_configs(),
            &occupancies,
            problem,
            self.context.multi_processor_count(),
            self.dispatcher.path().is_weight_only(),
        )
    }

    /// Grouped GEMM with bias and a fused activation.
    ///
    /// The activation is checked before anything is probed, and an invalid
    /// or gated activation launches nothing. The bias add is elided when
    /// `operands` carries no bias.
    pub fn moe_gemm_bias_act(
        &self,
        descriptor: &ExpertGroupDescriptor<'_>,
        activation: ActivationType,
        operands: &mut K::Operands,
        stream: &K::Stream,
    ) -> Result<LaunchReport> {
        let epilogue = EpilogueSelection::new(activation, operands.has_bias())?;
        self.select_and_run(descriptor, epilogue, operands, stream)
    }

    /// Grouped GEMM with neither bias nor activation.
    pub fn moe_gemm(
        &self,
        descriptor: &ExpertGroupDescriptor<'_>,
        operands: &mut K::Operands,
        stream: &K::Stream,
    ) -> Result<LaunchReport> {
        self.select_and_run(descriptor, EpilogueSelection::no_bias(), operands, stream)
    }

    /// Launch a caller-chosen configuration, skipping selection.
    ///
    /// The configuration goes through the same dispatcher checks as
    /// catalog entries.
    pub fn run_with_config(
        &self,
        descriptor: &ExpertGroupDescriptor<'_>,
        config: &GemmConfig,
        epilogue: EpilogueSelection,
        operands: &mut K::Operands,
        stream: &K::Stream,
    ) -> Result<LaunchReport> {
        self.run(descriptor, config, epilogue, operands, stream, 0)
    }

    fn select_and_run(
        &self,
        descriptor: &ExpertGroupDescriptor<'_>,
        epilogue: EpilogueSelection,
        operands: &mut K::Operands,
        stream: &K::Stream,
    ) -> Result<LaunchReport> {
        let _span = tracing::debug_span!(
            "moe_gemm",
            experts = descriptor.num_experts(),
            rows = descriptor.total_rows(),
            n = descriptor.gemm_n(),
            k = descriptor.gemm_k(),
        )
        .entered();

        let best = self.select_config(&descriptor.problem_shape())?;
        let probed = self.candidate_configs().len();
        self.run(descriptor, &best.config, epilogue, operands, stream, probed)
    }

    fn run(
        &self,
        descriptor: &ExpertGroupDescriptor<'_>,
        config: &GemmConfig,
        epilogue: EpilogueSelection,
        operands: &mut K::Operands,
        stream: &K::Stream,
        candidates_probed: usize,
    ) -> Result<LaunchReport> {
        let variant = self.dispatcher.resolve(config)?;
        let plan = LaunchPlan::from_occupancy(
            self.kernel.max_active_blocks(&variant, self.context.limits()),
            self.context.multi_processor_count(),
        )?;
        let args = GroupedGemmArguments {
            variant,
            epilogue,
            params: EpilogueParams::default(),
            problem: descriptor.problem_shape(),
            row_boundaries: descriptor.row_boundaries(),
            threadblock_count: plan.threadblock_count,
        };
        launch_grouped_gemm(&self.kernel, &args, operands, stream)?;

        Ok(LaunchReport {
            config: *config,
            kernel_name: variant.kernel_name(&epilogue),
            occupancy: plan.occupancy,
            threadblock_count: plan.threadblock_count,
            candidates_probed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{DeviceLimits, KernelVariant};
    use crate::config::TileConfig;
    use crate::error::MoeGemmError;
    use crate::reference::{HostGroupedGemm, HostOperands, HostStream, HostWeights};
    use std::cell::{Cell, RefCell};

    /// Records launches without computing anything.
    #[derive(Debug, Default)]
    struct CountingKernel {
        launched: RefCell<Vec<GemmConfig>>,
        /// Reported in place of the analytic occupancy when set.
        occupancy: Option<u32>,
    }

    struct NoOperands {
        bias: bool,
        scales: bool,
    }

    impl KernelOperands for NoOperands {
        fn has_bias(&self) -> bool {
            self.bias
        }
        fn has_weight_scales(&self) -> bool {
            self.scales
        }
    }

    impl GroupedGemmKernel for CountingKernel {
        type Operands = NoOperands;
        type Stream = Cell<usize>;

        fn can_implement(
            &self,
            _args: &GroupedGemmArguments<'_>,
            _operands: &NoOperands,
        ) -> std::result::Result<(), String> {
            Ok(())
        }

        fn max_active_blocks(&self, variant: &KernelVariant, limits: &DeviceLimits) -> u32 {
            self.occupancy
                .unwrap_or_else(|| crate::heuristic::max_active_blocks(variant, limits))
        }

        fn run(
            &self,
            args: &GroupedGemmArguments<'_>,
            _operands: &mut NoOperands,
            stream: &Cell<usize>,
        ) -> std::result::Result<(), String> {
            self.launched.borrow_mut().push(*args.variant.config());
            stream.set(stream.get() + 1);
            Ok(())
        }
    }

    fn counting_runner(sm: u32, sms: u32, weight: WeightType) -> MoeGemmRunner<CountingKernel> {
        let ctx = DeviceContext::for_sm_version(sm, sms).unwrap();
        MoeGemmRunner::new(ctx, ElementType::F16, weight, CountingKernel::default()).unwrap()
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    const MIXTRAL_ROWS: [i64; 8] = [100, 260, 300, 512, 640, 700, 900, 1024];

    #[test]
    fn test_a100_uniform_bias_relu() {
        init_tracing();
        let runner = counting_runner(80, 108, WeightType::F16);
        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: true,
            scales: false,
        };
        let stream = Cell::new(0);

        let report = runner
            .moe_gemm_bias_act(&desc, ActivationType::Relu, &mut ops, &stream)
            .unwrap();

        // 3 tiles × stages 2..=4
        assert_eq!(report.candidates_probed, 9);
        assert_eq!(stream.get(), 1);
        assert_eq!(
            report.config.tile_config,
            TileConfig::CtaShape32x128x64WarpShape32x32x64
        );
        assert_eq!(report.config.stages, 2);
        // occupancy 4 is capped at 2 resident blocks
        assert_eq!(report.occupancy, 2);
        assert_eq!(report.threadblock_count, 216);
        assert!(report.kernel_name.ends_with("_s2_bias_relu"));
        assert_eq!(runner.kernel().launched.borrow().as_slice(), &[report.config]);
    }

    #[test]
    fn test_kernel_occupancy_drives_probe_and_grid() {
        let ctx = DeviceContext::for_sm_version(80, 108).unwrap();
        let kernel = CountingKernel {
            occupancy: Some(1),
            ..Default::default()
        };
        let runner = MoeGemmRunner::new(ctx, ElementType::F16, WeightType::F16, kernel).unwrap();
        assert_eq!(runner.probe_occupancies().unwrap(), vec![1; 9]);

        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: false,
            scales: false,
        };
        let stream = Cell::new(0);
        let report = runner.moe_gemm(&desc, &mut ops, &stream).unwrap();
        assert_eq!(report.occupancy, 1);
        assert_eq!(report.threadblock_count, 108);
    }

    #[test]
    fn test_selection_is_repeatable() {
        let runner = counting_runner(80, 108, WeightType::F16);
        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let a = runner.select_config(&desc.problem_shape()).unwrap();
        let b = runner.select_config(&desc.problem_shape()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_volta_quantized_candidates() {
        let quant = counting_runner(70, 80, WeightType::U8);
        let uniform = counting_runner(70, 80, WeightType::F16);
        assert_eq!(quant.candidate_configs().len(), 2);
        assert_eq!(uniform.candidate_configs().len(), 3);
        assert!(quant.candidate_configs().iter().all(|c| c.stages == 2));
        assert_eq!(quant.precision_path(), PrecisionPath::WeightQuantized);

        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: true,
            scales: true,
        };
        let stream = Cell::new(0);
        let report = quant
            .moe_gemm_bias_act(&desc, ActivationType::Relu, &mut ops, &stream)
            .unwrap();

        assert_eq!(report.candidates_probed, 2);
        assert_eq!(stream.get(), 1);
        assert!(quant.candidate_configs().contains(&report.config));
        assert_eq!(quant.kernel().launched.borrow().as_slice(), &[report.config]);
    }

    #[test]
    fn test_turing_excludes_large_tile() {
        init_tracing();
        let runner = counting_runner(75, 40, WeightType::F16);
        let occ = runner.probe_occupancies().unwrap();
        assert_eq!(occ.len(), 3);
        assert_eq!(occ[2], 0);

        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let best = runner.select_config(&desc.problem_shape()).unwrap();
        assert_ne!(best.index, 2);
    }

    #[test]
    fn test_invalid_activation_launches_nothing() {
        let runner = counting_runner(80, 108, WeightType::F16);
        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: true,
            scales: false,
        };
        let stream = Cell::new(0);
        for act in [ActivationType::InvalidType, ActivationType::SwiGlu] {
            let err = runner
                .moe_gemm_bias_act(&desc, act, &mut ops, &stream)
                .unwrap_err();
            assert!(matches!(err, MoeGemmError::Activation(_)));
        }
        assert_eq!(stream.get(), 0);
    }

    #[test]
    fn test_bad_stages_launch_nothing() {
        let stream = Cell::new(0);
        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: false,
            scales: false,
        };
        let tile = TileConfig::CtaShape64x128x64WarpShape32x64x64;

        let ampere = counting_runner(80, 108, WeightType::F16);
        for stages in [1, 5] {
            let err = ampere
                .run_with_config(
                    &desc,
                    &GemmConfig::new(tile, stages),
                    EpilogueSelection::no_bias(),
                    &mut ops,
                    &stream,
                )
                .unwrap_err();
            assert!(matches!(err, MoeGemmError::Config(_)));
        }

        let turing = counting_runner(75, 40, WeightType::F16);
        for stages in [3, 4] {
            assert!(turing
                .run_with_config(
                    &desc,
                    &GemmConfig::new(tile, stages),
                    EpilogueSelection::no_bias(),
                    &mut ops,
                    &stream,
                )
                .is_err());
        }
        assert_eq!(stream.get(), 0);
    }

    #[test]
    fn test_run_with_config_reports_no_probes() {
        let runner = counting_runner(80, 108, WeightType::F16);
        let desc = ExpertGroupDescriptor::new(8, &MIXTRAL_ROWS, 4096, 1024).unwrap();
        let mut ops = NoOperands {
            bias: false,
            scales: false,
        };
        let stream = Cell::new(0);
        let config = GemmConfig::new(TileConfig::CtaShape128x128x64WarpShape64x32x64, 3);
        let report = runner
            .run_with_config(&desc, &config, EpilogueSelection::no_bias(), &mut ops, &stream)
            .unwrap();
        assert_eq!(report.candidates_probed, 0);
        assert_eq!(report.occupancy, 1);
        assert_eq!(report.threadblock_count, 108);
        assert_eq!(stream.get(), 1);
    }

    #[test]
    fn test_unsupported_type_pair() {
        let ctx = DeviceContext::for_sm_version(80, 108).unwrap();
        let err = MoeGemmRunner::new(
            ctx,
            ElementType::F32,
            WeightType::U8,
            CountingKernel::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MoeGemmError::Config(_)));
    }

    #[test]
    fn test_host_int8_with_scales_and_gelu() {
        let ctx = DeviceContext::for_sm_version(86, 84).unwrap();
        let runner =
            MoeGemmRunner::new(ctx, ElementType::F16, WeightType::U8, HostGroupedGemm).unwrap();

        let (e, k, n) = (3usize, 64usize, 16usize);
        let bounds = [5i64, 5, 9];
        let desc = ExpertGroupDescriptor::new(e, &bounds, n, k).unwrap();
        let activations: Vec<f32> = (0..9 * k).map(|i| ((i % 9) as f32 - 4.0) * 0.1).collect();
        let weights: Vec<i8> = (0..e * k * n).map(|i| (i % 11) as i8 - 5).collect();
        let scales: Vec<f32> = (0..e * n).map(|i| 0.01 + (i % 4) as f32 * 0.005).collect();
        let bias: Vec<f32> = (0..e * n).map(|i| (i % 3) as f32 - 1.0).collect();
        let mut ops = HostOperands {
            activations: activations.clone(),
            weights: HostWeights::Int8(weights.clone()),
            weight_scales: Some(scales.clone()),
            bias: Some(bias.clone()),
            output: vec![0.0; 9 * n],
        };
        let stream = HostStream::new();
        runner
            .moe_gemm_bias_act(&desc, ActivationType::Gelu, &mut ops, &stream)
            .unwrap();

        let gelu = crate::epilogue::EpilogueActivation::Gelu;
        for r in 0..9 {
            let expert = if r < 5 { 0 } else { 2 };
            for c in 0..n {
                let mut acc = 0.0f32;
                for kk in 0..k {
                    acc += activations[r * k + kk] * weights[expert * k * n + kk * n + c] as f32;
                }
                let want = gelu.apply(acc * scales[expert * n + c] + bias[expert * n + c]);
                assert!((ops.output[r * n + c] - want).abs() < 1e-4);
            }
        }
        assert_eq!(stream.launch_count(), 1);
    }

    #[test]
    fn test_host_moe_gemm_without_bias() {
        let ctx = DeviceContext::for_sm_version(75, 40).unwrap();
        let runner =
            MoeGemmRunner::new(ctx, ElementType::F32, WeightType::F32, HostGroupedGemm).unwrap();
        let bounds = [2i64, 3];
        let desc = ExpertGroupDescriptor::new(2, &bounds, 3, 2).unwrap();
        let mut ops = HostOperands {
            activations: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            weights: HostWeights::Float(vec![
                1.0, 0.0, 1.0, 0.0, 1.0, 1.0, // expert 0
                2.0, 2.0, 2.0, -1.0, 0.0, 1.0, // expert 1
            ]),
            weight_scales: None,
            bias: None,
            output: vec![0.0; 9],
        };
        let stream = HostStream::new();
        let report = runner.moe_gemm(&desc, &mut ops, &stream).unwrap();

        assert_eq!(report.candidates_probed, 1);
        assert!(report.kernel_name.ends_with("_nobias"));
        assert_eq!(ops.output, vec![1.0, 2.0, 3.0, 3.0, 4.0, 7.0, 4.0, 10.0, 16.0]);
    }

    #[test]
    fn test_host_mismatched_operands_are_preflight() {
        let ctx = DeviceContext::for_sm_version(80, 108).unwrap();
        let runner =
            MoeGemmRunner::new(ctx, ElementType::F16, WeightType::F16, HostGroupedGemm).unwrap();
        let bounds = [4i64];
        let desc = ExpertGroupDescriptor::new(1, &bounds, 8, 8).unwrap();
        let mut ops = HostOperands {
            activations: vec![0.0; 3 * 8],
            weights: HostWeights::Float(vec![0.0; 64]),
            weight_scales: None,
            bias: None,
            output: vec![0.0; 4 * 8],
        };
        let stream = HostStream::new();
        let err = runner.moe_gemm(&desc, &mut ops, &stream).unwrap_err();
        assert!(matches!(err, MoeGemmError::Preflight(_)));
        assert_eq!(stream.launch_count(), 0);
    }
}
