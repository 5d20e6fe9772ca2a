//! GPU architecture tiers, the per-device context, and call dispatch.
//!
//! Compute capabilities are banded into three [`ArchitectureTier`]s. Each
//! tier has its own MMA instruction shape and pipeline-depth limit:
//!
//! | Tier | Compute capability | Tensor-op instruction | Max stages |
//! |------|--------------------|-----------------------|------------|
//! | Volta | 7.0 – 7.4 | 8x8x4 | 2 |
//! | Turing | 7.5 – 7.9 | 16x8x8 | 2 |
//! | Ampere | 8.0 – 8.9 | 16x8x16 | 4 |
//!
//! Anything outside these bands is rejected; there is no generic fallback
//! kernel.
//!
//! [`DeviceContext`] is built once per device and passed by reference to
//! every call. [`ArchDispatcher`] turns a [`GemmConfig`](crate::config::GemmConfig)
//! into a [`KernelVariant`], the resolved strategy that the occupancy prober
//! and the launcher both consume.

mod device;
mod dispatch;
mod tier;

pub use device::{DeviceContext, DeviceLimits};
pub use dispatch::{ArchDispatcher, KernelVariant};
pub use tier::ArchitectureTier;
