//! Kernel configurations and the per-architecture configuration catalog.
//!
//! A [`GemmConfig`] names a threadblock/warp tile ([`TileConfig`]), a
//! software-pipeline depth and a split-k policy. Grouped MoE GEMMs never
//! split along K: expert row counts vary per call, so a serial split-k
//! reduction workspace cannot be sized ahead of time.
//!
//! The [`ConfigCatalog`] is a read-only table from
//! (architecture tier, precision path) to an ordered candidate list, built
//! once per process.

mod catalog;
mod tile;

pub use catalog::{candidate_configs, candidate_tiles, max_stages, ConfigCatalog, MIN_STAGES};
pub use tile::{GemmShape, TileConfig};

use crate::error::{MoeGemmError, Result};
use std::fmt;

/// Split-k decomposition policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitKStyle {
    NoSplitK,
    SplitKSerial,
}

/// One kernel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmConfig {
    pub tile_config: TileConfig,
    pub split_k_style: SplitKStyle,
    pub split_k_factor: u32,
    /// Software-pipeline depth of the mainloop.
    pub stages: u32,
}

impl GemmConfig {
    /// A non-split configuration.
    pub const fn new(tile_config: TileConfig, stages: u32) -> Self {
        Self {
            tile_config,
            split_k_style: SplitKStyle::NoSplitK,
            split_k_factor: 1,
            stages,
        }
    }

    /// Reject anything other than "no split".
    pub fn ensure_no_split_k(&self) -> Result<()> {
        if self.split_k_style != SplitKStyle::NoSplitK || self.split_k_factor != 1 {
            return Err(MoeGemmError::Config(format!(
                "grouped gemm does not support split-k (style {:?}, factor {})",
                self.split_k_style, self.split_k_factor
            )));
        }
        Ok(())
    }
}

impl Default for GemmConfig {
    fn default() -> Self {
        Self::new(TileConfig::ChooseWithHeuristic, MIN_STAGES)
    }
}

impl fmt::Display for GemmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_s{}", self.tile_config, self.stages)?;
        if self.split_k_style != SplitKStyle::NoSplitK {
            write!(f, "_splitk{}", self.split_k_factor)?;
        }
        Ok(())
    }
}
