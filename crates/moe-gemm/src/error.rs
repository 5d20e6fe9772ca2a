//! Error types for grouped MoE GEMM dispatch.

use thiserror::Error;

/// Errors raised while selecting or launching a grouped GEMM.
///
/// Every variant is fatal for the current invocation. Nothing in this crate
/// retries or substitutes a different configuration after an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoeGemmError {
    /// Invalid configuration: placeholder tile tags, tiles that are illegal for
    /// the precision path, unsupported stage counts, or split-k requests.
    #[error("Invalid gemm config: {0}")]
    Config(String),

    /// The expert group descriptor is inconsistent.
    #[error("Invalid expert group descriptor: {0}")]
    Descriptor(String),

    /// The activation cannot be fused into the grouped epilogue.
    #[error("Invalid activation: {0}")]
    Activation(String),

    /// The device cannot run any (or the chosen) configuration.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Compute capability outside the supported tiers.
    #[error("Arch unsupported for MoE GEMM: sm_{sm}")]
    UnsupportedArchitecture {
        /// Compute capability as `major * 10 + minor`.
        sm: u32,
    },

    /// The kernel's pre-flight validation rejected the arguments.
    #[error("MoE grouped kernel will fail for params: {0}")]
    Preflight(String),

    /// The kernel failed to initialize its launch parameters.
    #[error("Failed to initialize grouped gemm: {0}")]
    Initialize(String),

    /// The asynchronous launch could not be enqueued.
    #[error("Failed to run grouped gemm: {0}")]
    Launch(String),
}

/// Result type for grouped MoE GEMM operations.
pub type Result<T> = std::result::Result<T, MoeGemmError>;
