use super::{ArchitectureTier, DeviceContext};
use crate::config::{GemmConfig, GemmShape, TileConfig, MIN_STAGES};
use crate::epilogue::EpilogueSelection;
use crate::error::{MoeGemmError, Result};
use crate::types::{ElementType, OperatorClass, PrecisionPath, WeightType};

/// Widest global-memory access, in bits.
const ACCESS_BITS: u32 = 128;

/// Base register budget per thread outside the accumulator fragment.
const BASE_REGISTERS: usize = 64;
const MAX_REGISTERS_PER_THREAD: usize = 255;

/// A fully resolved kernel: tier, precision, tile shapes and pipeline depth.
///
/// Every variant that exists is instantiable; combinations with no kernel
/// are rejected by [`ArchDispatcher::resolve`] instead of being
/// representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelVariant {
    tier: ArchitectureTier,
    element: ElementType,
    weight: WeightType,
    path: PrecisionPath,
    config: GemmConfig,
    threadblock: GemmShape,
    warp: GemmShape,
    instruction: GemmShape,
}

impl KernelVariant {
    pub fn tier(&self) -> ArchitectureTier {
        self.tier
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn weight(&self) -> WeightType {
        self.weight
    }

    pub fn path(&self) -> PrecisionPath {
        self.path
    }

    pub fn operator_class(&self) -> OperatorClass {
        self.path.operator_class()
    }

    /// The configuration this variant was resolved from.
    pub fn config(&self) -> &GemmConfig {
        &self.config
    }

    pub fn threadblock_shape(&self) -> GemmShape {
        self.threadblock
    }

    pub fn warp_shape(&self) -> GemmShape {
        self.warp
    }

    pub fn instruction_shape(&self) -> GemmShape {
        self.instruction
    }

    pub fn stages(&self) -> u32 {
        self.config.stages
    }

    /// Accumulation type; f32 on every path.
    pub fn accumulator(&self) -> ElementType {
        ElementType::F32
    }

    /// Warps per threadblock.
    pub fn warp_count(&self) -> usize {
        (self.threadblock.m / self.warp.m)
            * (self.threadblock.n / self.warp.n)
            * (self.threadblock.k / self.warp.k)
    }

    pub fn thread_count(&self) -> usize {
        self.warp_count() * 32
    }

    /// Mainloop shared storage: one A tile and one B tile per stage.
    pub fn shared_memory_bytes(&self) -> usize {
        let tb = self.threadblock;
        let a_bits = tb.m * tb.k * self.element.bits() as usize;
        let b_bits = tb.k * tb.n * self.weight.bits() as usize;
        self.config.stages as usize * (a_bits + b_bits) / 8
    }

    /// Estimated registers per thread: the f32 accumulator fragment plus a
    /// fixed budget for operand fragments and addressing.
    pub fn registers_per_thread(&self) -> usize {
        let accumulators = self.warp.mn() / 32;
        (accumulators + BASE_REGISTERS).min(MAX_REGISTERS_PER_THREAD)
    }

    /// Elements of A per vectorized load.
    pub fn access_width_a(&self) -> usize {
        self.access_width(self.element.bits())
    }

    /// Elements of B per vectorized load.
    pub fn access_width_b(&self) -> usize {
        self.access_width(self.weight.bits())
    }

    /// Elements of C per vectorized store.
    pub fn access_width_c(&self) -> usize {
        self.access_width(self.element.bits())
    }

    fn access_width(&self, bits: u32) -> usize {
        match self.operator_class() {
            OperatorClass::TensorOp => (ACCESS_BITS / bits) as usize,
            OperatorClass::Simt => 1,
        }
    }

    /// Symbol of the instantiated kernel for an epilogue.
    ///
    /// e.g. `moe_gemm_sm80_f16_u8_32x128x64_32x32x64_s3_bias_relu`
    pub fn kernel_name(&self, epilogue: &EpilogueSelection) -> String {
        format!(
            "moe_gemm_{}_{}_{}_{}_{}_s{}_{}",
            self.tier,
            self.element.name(),
            self.weight.name(),
            self.threadblock,
            self.warp,
            self.config.stages,
            epilogue.tag()
        )
    }
}

/// Routes configurations to the kernel family of one device and type pair.
///
/// This is the architecture dispatcher: tier × precision path × pipeline
/// depth. Both the probing pass and the launch pass go through
/// [`resolve`](Self::resolve), so a configuration is validated identically
/// whether it is measured or run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchDispatcher {
    tier: ArchitectureTier,
    element: ElementType,
    weight: WeightType,
    path: PrecisionPath,
}

impl ArchDispatcher {
    /// Dispatcher for a device and an activation/weight type pair.
    pub fn new(ctx: &DeviceContext, element: ElementType, weight: WeightType) -> Result<Self> {
        Self::for_tier(ctx.tier(), element, weight)
    }

    /// Dispatcher for a tier without a concrete device.
    pub fn for_tier(
        tier: ArchitectureTier,
        element: ElementType,
        weight: WeightType,
    ) -> Result<Self> {
        let path = PrecisionPath::from_types(element, weight)?;
        Ok(Self {
            tier,
            element,
            weight,
            path,
        })
    }

    pub fn tier(&self) -> ArchitectureTier {
        self.tier
    }

    pub fn path(&self) -> PrecisionPath {
        self.path
    }

    /// Resolve a configuration into a kernel variant.
    ///
    /// Rejects, in order: placeholder tile tags, tiles not instantiated for
    /// the precision path, stage counts outside {2, 3, 4}, stages above 2
    /// on lower tiers or SIMT kernels, and split-k.
    pub fn resolve(&self, config: &GemmConfig) -> Result<KernelVariant> {
        let (threadblock, warp) = config.tile_config.shapes().map_err(|e| match e {
            MoeGemmError::Config(msg) => {
                MoeGemmError::Config(format!("[{} {}] {}", self.tier, self.path, msg))
            }
            other => other,
        })?;
        self.check_tile(config.tile_config)?;
        self.check_stages(config.stages)?;
        config.ensure_no_split_k()?;

        Ok(KernelVariant {
            tier: self.tier,
            element: self.element,
            weight: self.weight,
            path: self.path,
            config: *config,
            threadblock,
            warp,
            instruction: self.tier.instruction_shape(self.path.operator_class()),
        })
    }

    fn check_tile(&self, tile: TileConfig) -> Result<()> {
        use TileConfig::*;
        let legal = match self.path {
            PrecisionPath::Uniform => matches!(
                tile,
                CtaShape32x128x64WarpShape32x32x64
                    | CtaShape64x128x64WarpShape32x64x64
                    | CtaShape128x128x64WarpShape64x32x64
            ),
            PrecisionPath::WeightQuantized => matches!(
                tile,
                CtaShape32x128x64WarpShape32x32x64
                    | CtaShape64x128x64WarpShape64x32x64
                    | CtaShape128x128x64WarpShape128x32x64
            ),
            PrecisionPath::SimtOnly => matches!(tile, CtaShape128x128x8WarpShape64x64x8),
        };
        if legal {
            return Ok(());
        }
        let family = match self.path {
            PrecisionPath::Uniform => "same type MoE tensorop GEMM",
            PrecisionPath::WeightQuantized => "mixed type MoE tensorop GEMM",
            PrecisionPath::SimtOnly => "float MoE SIMT GEMM",
        };
        Err(MoeGemmError::Config(format!(
            "tile {} is invalid for {}",
            tile, family
        )))
    }

    fn check_stages(&self, stages: u32) -> Result<()> {
        match stages {
            MIN_STAGES => Ok(()),
            3 | 4
                if self.tier.supports_multistage()
                    && self.path.operator_class() == OperatorClass::TensorOp =>
            {
                Ok(())
            }
            3 | 4 => Err(MoeGemmError::Config(format!(
                "kernel not instantiated for {} {} with stages set to {}",
                self.tier, self.path, stages
            ))),
            other => Err(MoeGemmError::Config(format!(
                "dispatch does not support stages {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitKStyle;
    use crate::epilogue::EpilogueSelection;
    use crate::types::ActivationType;

    fn dispatcher(sm: u32, element: ElementType, weight: WeightType) -> ArchDispatcher {
        let ctx = DeviceContext::for_sm_version(sm, 80).unwrap();
        ArchDispatcher::new(&ctx, element, weight).unwrap()
    }

    #[test]
    fn test_resolve_uniform_ampere() {
        let d = dispatcher(80, ElementType::F16, WeightType::F16);
        let config = GemmConfig::new(TileConfig::CtaShape128x128x64WarpShape64x32x64, 3);
        let v = d.resolve(&config).unwrap();

        assert_eq!(v.threadblock_shape(), GemmShape::new(128, 128, 64));
        assert_eq!(v.instruction_shape(), GemmShape::new(16, 8, 16));
        // 2 × 4 × 1 warps
        assert_eq!(v.warp_count(), 8);
        assert_eq!(v.thread_count(), 256);
        // 3 stages × (128×64 + 64×128) halves
        assert_eq!(v.shared_memory_bytes(), 3 * 32 * 1024);
        assert_eq!(v.registers_per_thread(), 128);
        assert_eq!(v.access_width_a(), 8);
    }

    #[test]
    fn test_quantized_footprint_is_smaller() {
        let d = dispatcher(80, ElementType::F16, WeightType::U4);
        let config = GemmConfig::new(TileConfig::CtaShape32x128x64WarpShape32x32x64, 2);
        let v = d.resolve(&config).unwrap();
        // 2 × (32×64×16 + 64×128×4) bits
        assert_eq!(v.shared_memory_bytes(), 2 * (4096 + 4096));
        assert_eq!(v.access_width_b(), 32);
    }

    #[test]
    fn test_simt_access_width() {
        let d = dispatcher(75, ElementType::F32, WeightType::F32);
        let config = GemmConfig::new(TileConfig::CtaShape128x128x8WarpShape64x64x8, 2);
        let v = d.resolve(&config).unwrap();
        assert_eq!(v.operator_class(), OperatorClass::Simt);
        assert_eq!(v.access_width_a(), 1);
        assert_eq!(v.access_width_b(), 1);
        assert_eq!(v.instruction_shape(), GemmShape::new(1, 1, 1));
    }

    #[test]
    fn test_placeholder_tiles_rejected() {
        let d = dispatcher(80, ElementType::F16, WeightType::F16);
        for tile in [TileConfig::Undefined, TileConfig::ChooseWithHeuristic] {
            let err = d.resolve(&GemmConfig::new(tile, 2)).unwrap_err();
            assert!(matches!(err, MoeGemmError::Config(_)));
        }
    }

    #[test]
    fn test_tile_not_legal_for_path() {
        let uniform = dispatcher(80, ElementType::F16, WeightType::F16);
        let err = uniform
            .resolve(&GemmConfig::new(TileConfig::CtaShape128x128x64WarpShape128x32x64, 2))
            .unwrap_err();
        assert!(err.to_string().contains("same type"));

        let dense_only = GemmConfig::new(TileConfig::CtaShape128x256x64WarpShape64x64x64, 2);
        assert!(uniform.resolve(&dense_only).is_err());

        let simt = dispatcher(80, ElementType::F32, WeightType::F32);
        let err = simt
            .resolve(&GemmConfig::new(TileConfig::CtaShape32x128x64WarpShape32x32x64, 2))
            .unwrap_err();
        assert!(err.to_string().contains("SIMT"));
    }

    #[test]
    fn test_stage_depths() {
        let tile = TileConfig::CtaShape32x128x64WarpShape32x32x64;
        let ampere = dispatcher(86, ElementType::F16, WeightType::F16);
        for stages in [2, 3, 4] {
            assert!(ampere.resolve(&GemmConfig::new(tile, stages)).is_ok());
        }
        for stages in [0, 1, 5, 8] {
            let err = ampere.resolve(&GemmConfig::new(tile, stages)).unwrap_err();
            assert!(err.to_string().contains("does not support stages"));
        }

        for sm in [70, 75] {
            let lower = dispatcher(sm, ElementType::F16, WeightType::F16);
            assert!(lower.resolve(&GemmConfig::new(tile, 2)).is_ok());
            for stages in [3, 4] {
                let err = lower.resolve(&GemmConfig::new(tile, stages)).unwrap_err();
                assert!(err.to_string().contains("not instantiated"));
            }
        }
    }

    #[test]
    fn test_every_catalog_entry_resolves() {
        use crate::config::ConfigCatalog;
        let pairs = [
            (ElementType::F16, WeightType::F16),
            (ElementType::F16, WeightType::U8),
            (ElementType::F16, WeightType::U4),
            (ElementType::F32, WeightType::F32),
        ];
        for tier in ArchitectureTier::ALL {
            for (element, weight) in pairs {
                let d = ArchDispatcher::for_tier(tier, element, weight).unwrap();
                for config in ConfigCatalog::global().get(tier, d.path()) {
                    assert!(d.resolve(config).is_ok(), "{} {} {}", tier, d.path(), config);
                }
            }
        }
    }

    #[test]
    fn test_simt_multistage_not_instantiated() {
        let simt = dispatcher(80, ElementType::F32, WeightType::F32);
        let config = GemmConfig::new(TileConfig::CtaShape128x128x8WarpShape64x64x8, 3);
        assert!(simt.resolve(&config).is_err());
    }

    #[test]
    fn test_split_k_rejected() {
        let d = dispatcher(80, ElementType::F16, WeightType::F16);
        let mut config = GemmConfig::new(TileConfig::CtaShape64x128x64WarpShape32x64x64, 2);
        config.split_k_style = SplitKStyle::SplitKSerial;
        config.split_k_factor = 2;
        let err = d.resolve(&config).unwrap_err();
        assert!(err.to_string().contains("split-k"));
    }

    #[test]
    fn test_kernel_name() {
        let d = dispatcher(80, ElementType::F16, WeightType::U8);
        let v = d
            .resolve(&GemmConfig::new(TileConfig::CtaShape32x128x64WarpShape32x32x64, 3))
            .unwrap();
        let epilogue = EpilogueSelection::new(ActivationType::Relu, true).unwrap();
        assert_eq!(
            v.kernel_name(&epilogue),
            "moe_gemm_sm80_f16_u8_32x128x64_32x32x64_s3_bias_relu"
        );
    }
}
