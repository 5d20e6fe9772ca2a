//! Error types for the CUDA backend.

use cudarc::driver::DriverError;
use moe_gemm::MoeGemmError;
use thiserror::Error;

/// Errors that can occur in CUDA grouped GEMM operations.
#[derive(Debug, Error)]
pub enum CudaError {
    /// CUDA driver error.
    #[error("CUDA driver error: {0}")]
    Driver(#[from] DriverError),

    /// Selection, dispatch or launch error.
    #[error(transparent)]
    MoeGemm(#[from] MoeGemmError),

    /// A kernel symbol is missing from the loaded module.
    #[error("Kernel not found: {0}")]
    KernelNotFound(String),
}

/// Result type for CUDA operations.
pub type Result<T> = std::result::Result<T, CudaError>;
