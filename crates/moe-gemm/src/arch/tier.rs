use crate::config::GemmShape;
use crate::error::{MoeGemmError, Result};
use crate::types::OperatorClass;
use std::fmt;

/// Banded compute-capability classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchitectureTier {
    /// sm_70 up to sm_75 (exclusive).
    Volta,
    /// sm_75 up to sm_80 (exclusive).
    Turing,
    /// sm_80 up to sm_90 (exclusive).
    Ampere,
}

impl ArchitectureTier {
    /// All tiers, least capable first.
    pub const ALL: [ArchitectureTier; 3] = [
        ArchitectureTier::Volta,
        ArchitectureTier::Turing,
        ArchitectureTier::Ampere,
    ];

    /// Classify `sm_version` (`major * 10 + minor`).
    pub fn from_sm_version(sm_version: u32) -> Result<Self> {
        match sm_version {
            70..=74 => Ok(ArchitectureTier::Volta),
            75..=79 => Ok(ArchitectureTier::Turing),
            80..=89 => Ok(ArchitectureTier::Ampere),
            sm => Err(MoeGemmError::UnsupportedArchitecture { sm }),
        }
    }

    /// Lowest compute capability of the band; kernels are built for it.
    pub const fn min_compute_capability(self) -> u32 {
        match self {
            ArchitectureTier::Volta => 70,
            ArchitectureTier::Turing => 75,
            ArchitectureTier::Ampere => 80,
        }
    }

    /// Whether mainloops deeper than two stages exist on this tier.
    pub const fn supports_multistage(self) -> bool {
        matches!(self, ArchitectureTier::Ampere)
    }

    /// MMA instruction shape for an operator class.
    pub const fn instruction_shape(self, operator_class: OperatorClass) -> GemmShape {
        match (operator_class, self) {
            (OperatorClass::Simt, _) => GemmShape::new(1, 1, 1),
            (OperatorClass::TensorOp, ArchitectureTier::Volta) => GemmShape::new(8, 8, 4),
            (OperatorClass::TensorOp, ArchitectureTier::Turing) => GemmShape::new(16, 8, 8),
            (OperatorClass::TensorOp, ArchitectureTier::Ampere) => GemmShape::new(16, 8, 16),
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            ArchitectureTier::Volta => 0,
            ArchitectureTier::Turing => 1,
            ArchitectureTier::Ampere => 2,
        }
    }
}

impl fmt::Display for ArchitectureTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sm{}", self.min_compute_capability())
    }
}
