use super::{GemmConfig, TileConfig};
use crate::arch::ArchitectureTier;
use crate::types::{OperatorClass, PrecisionPath};
use once_cell::sync::Lazy;

/// Shallowest software pipeline; legal on every tier.
pub const MIN_STAGES: u32 = 2;

/// Deepest pipeline on multistage-capable tiers.
const MAX_MULTISTAGE: u32 = 4;

const SIMT_TILES: &[TileConfig] = &[TileConfig::CtaShape128x128x8WarpShape64x64x8];

const UNIFORM_TILES: &[TileConfig] = &[
    TileConfig::CtaShape32x128x64WarpShape32x32x64,
    TileConfig::CtaShape64x128x64WarpShape32x64x64,
    TileConfig::CtaShape128x128x64WarpShape64x32x64,
];

const QUANT_TILES_SM70: &[TileConfig] = &[
    TileConfig::CtaShape32x128x64WarpShape32x32x64,
    TileConfig::CtaShape64x128x64WarpShape64x32x64,
];

const QUANT_TILES_SM80: &[TileConfig] = &[
    TileConfig::CtaShape32x128x64WarpShape32x32x64,
    TileConfig::CtaShape64x128x64WarpShape64x32x64,
    TileConfig::CtaShape128x128x64WarpShape128x32x64,
];

/// Deepest pipeline the tier supports for an operator class.
///
/// Multistage (`cp.async`) mainloops exist only on the top tier and only for
/// tensor-core kernels.
pub fn max_stages(tier: ArchitectureTier, operator_class: OperatorClass) -> u32 {
    if tier.supports_multistage() && operator_class == OperatorClass::TensorOp {
        MAX_MULTISTAGE
    } else {
        MIN_STAGES
    }
}

/// Tile tags legal for a tier and precision path, in catalog order.
pub fn candidate_tiles(tier: ArchitectureTier, path: PrecisionPath) -> &'static [TileConfig] {
    match path {
        PrecisionPath::SimtOnly => SIMT_TILES,
        PrecisionPath::Uniform => UNIFORM_TILES,
        PrecisionPath::WeightQuantized if tier.supports_multistage() => QUANT_TILES_SM80,
        PrecisionPath::WeightQuantized => QUANT_TILES_SM70,
    }
}

/// Every tile × stage combination for a tier and precision path.
///
/// Ordered by tile (catalog order), then by increasing stage count.
pub fn candidate_configs(tier: ArchitectureTier, path: PrecisionPath) -> Vec<GemmConfig> {
    let max = max_stages(tier, path.operator_class());
    candidate_tiles(tier, path)
        .iter()
        .flat_map(|&tile| (MIN_STAGES..=max).map(move |stages| GemmConfig::new(tile, stages)))
        .collect()
}

static CATALOG: Lazy<ConfigCatalog> = Lazy::new(ConfigCatalog::build);

/// Read-only table of candidate configurations per (tier, path).
#[derive(Debug, Clone)]
pub struct ConfigCatalog {
    entries: Vec<Vec<GemmConfig>>,
}

impl ConfigCatalog {
    /// Build the full table.
    pub fn build() -> Self {
        let mut entries =
            Vec::with_capacity(ArchitectureTier::ALL.len() * PrecisionPath::ALL.len());
        for tier in ArchitectureTier::ALL {
            for path in PrecisionPath::ALL {
                entries.push(candidate_configs(tier, path));
            }
        }
        Self { entries }
    }

    /// Process-wide catalog, built on first use.
    pub fn global() -> &'static ConfigCatalog {
        &CATALOG
    }

    /// Candidates for a tier and precision path.
    pub fn get(&self, tier: ArchitectureTier, path: PrecisionPath) -> &[GemmConfig] {
        &self.entries[tier.index() * PrecisionPath::ALL.len() + path.index()]
    }
}
