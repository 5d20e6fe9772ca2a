//! Host reference backend.
//!
//! Runs the grouped GEMM on the CPU through the same launch protocol as a
//! device backend: the same tile schedule, the same epilogue and the same
//! pre-flight rules. Used to check selection and launch end to end without
//! a GPU, and as ground truth for device kernels.

mod kernel;
mod scheduler;

pub use kernel::{pack_int4, HostGroupedGemm, HostOperands, HostStream, HostWeights, LaunchRecord};
pub use scheduler::{GroupedTileScheduler, TileAssignment};
