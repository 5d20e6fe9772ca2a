//! Kernel configuration selection and dispatch for grouped
//! Mixture-of-Experts GEMM.
//!
//! A grouped MoE GEMM multiplies each expert's slice of the activation
//! matrix by that expert's weight matrix in a single launch. This crate
//! decides *which* kernel runs:
//!
//! 1. [`types`]: validate the expert row partition and the type pair
//! 2. [`config`]: look up the candidate configurations of the device tier
//! 3. [`heuristic`]: probe each candidate's occupancy and pick the one that
//!    wastes the least of its last wave
//! 4. [`arch`]: route the winner to its tier × precision × depth variant
//! 5. [`launcher`]: size the persistent grid and enqueue the kernel
//!
//! Kernels are supplied through [`GroupedGemmKernel`]. [`reference`]
//! provides a CPU implementation; `moe-gemm-cuda` provides the device one.
//!
//! # Example
//!
//! ```
//! use moe_gemm::prelude::*;
//!
//! let ctx = DeviceContext::for_sm_version(80, 108).unwrap();
//! let runner =
//!     MoeGemmRunner::new(ctx, ElementType::F16, WeightType::U4, HostGroupedGemm).unwrap();
//!
//! let bounds = [100i64, 260, 300, 512, 640, 700, 900, 1024];
//! let desc = ExpertGroupDescriptor::new(8, &bounds, 4096, 1024).unwrap();
//! let best = runner.select_config(&desc.problem_shape()).unwrap();
//! assert!(best.occupancy > 0);
//! ```
//!
//! # Features
//!
//! - `parallel` (default): the host reference backend computes tiles with
//!   rayon.

pub mod api;
pub mod arch;
pub mod config;
pub mod epilogue;
pub mod error;
pub mod heuristic;
pub mod launcher;
pub mod reference;
pub mod types;

pub use api::{LaunchReport, MoeGemmRunner};
pub use arch::{ArchDispatcher, ArchitectureTier, DeviceContext, DeviceLimits, KernelVariant};
pub use config::{ConfigCatalog, GemmConfig, GemmShape, SplitKStyle, TileConfig};
pub use epilogue::{EpilogueActivation, EpilogueParams, EpilogueSelection};
pub use error::{MoeGemmError, Result};
pub use heuristic::{
    max_active_blocks, probe_candidates, probe_candidates_with, select_config, ScoredConfig,
};
pub use launcher::{
    launch_grouped_gemm, plan_launch, GroupedGemmArguments, GroupedGemmKernel, KernelOperands,
    LaunchPlan, MAX_RESIDENT_WAVES,
};
pub use types::{
    ActivationType, ElementType, ExpertGroupDescriptor, OperatorClass, PrecisionPath, ProblemShape,
    WeightType,
};

/// Common imports.
pub mod prelude {
    pub use crate::api::{LaunchReport, MoeGemmRunner};
    pub use crate::arch::DeviceContext;
    pub use crate::config::{GemmConfig, TileConfig};
    pub use crate::epilogue::EpilogueSelection;
    pub use crate::error::{MoeGemmError, Result};
    pub use crate::launcher::{GroupedGemmKernel, KernelOperands};
    pub use crate::reference::{HostGroupedGemm, HostOperands, HostStream, HostWeights};
    pub use crate::types::{
        ActivationType, ElementType, ExpertGroupDescriptor, PrecisionPath, WeightType,
    };
}
