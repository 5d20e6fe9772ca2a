//! Value types shared by every stage of the grouped GEMM pipeline.
//!
//! - [`ElementType`] / [`WeightType`]: storage types of activations and weights
//! - [`PrecisionPath`]: which family of kernels a type pair may use
//! - [`ActivationType`]: the activation requested by the host graph
//! - [`ExpertGroupDescriptor`]: row boundaries and GEMM extents of one call
//!
//! # Precision paths
//!
//! | Activations | Weights | Path | Operator class |
//! |-------------|---------|------|----------------|
//! | f16 | f16 | [`PrecisionPath::Uniform`] | tensor op |
//! | f16 | u8 / u4 | [`PrecisionPath::WeightQuantized`] | tensor op |
//! | f32 | f32 | [`PrecisionPath::SimtOnly`] | SIMT |

mod activation;
mod descriptor;
mod precision;

pub use activation::ActivationType;
pub use descriptor::{ExpertGroupDescriptor, ProblemShape};
pub use precision::{ElementType, OperatorClass, PrecisionPath, WeightType};
