use crate::error::{MoeGemmError, Result};
use std::fmt;

/// Storage type of activations, bias and output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F16,
    F32,
}

impl ElementType {
    /// Width of one element in bits.
    pub const fn bits(self) -> u32 {
        match self {
            ElementType::F16 => 16,
            ElementType::F32 => 32,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::F16 => "f16",
            ElementType::F32 => "f32",
        }
    }
}

/// Storage type of the expert weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeightType {
    F16,
    F32,
    /// 8-bit integer weights with per-column scales.
    U8,
    /// 4-bit integer weights packed two per byte, with per-column scales.
    U4,
}

impl WeightType {
    /// Width of one element in bits.
    pub const fn bits(self) -> u32 {
        match self {
            WeightType::F16 => 16,
            WeightType::F32 => 32,
            WeightType::U8 => 8,
            WeightType::U4 => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WeightType::F16 => "f16",
            WeightType::F32 => "f32",
            WeightType::U8 => "u8",
            WeightType::U4 => "u4",
        }
    }

    /// Whether weights are stored below activation precision.
    pub const fn is_quantized(self) -> bool {
        matches!(self, WeightType::U8 | WeightType::U4)
    }
}

/// Matrix-multiply instruction family used by a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    /// Tensor-core MMA instructions.
    TensorOp,
    /// General-purpose FMA on CUDA cores.
    Simt,
}

/// Numeric path of a grouped GEMM, derived from its element/weight types.
///
/// The path decides which catalog subset is legal and whether tensor cores
/// are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecisionPath {
    /// Activations and weights share one half-precision type.
    Uniform,
    /// Half-precision activations with 8-bit or 4-bit weights.
    WeightQuantized,
    /// 32-bit float; tensor-core paths disabled.
    SimtOnly,
}

impl PrecisionPath {
    /// Every path, in catalog order.
    pub const ALL: [PrecisionPath; 3] = [
        PrecisionPath::Uniform,
        PrecisionPath::WeightQuantized,
        PrecisionPath::SimtOnly,
    ];

    /// Resolve the path for an activation/weight type pair.
    pub fn from_types(element: ElementType, weight: WeightType) -> Result<Self> {
        match (element, weight) {
            (ElementType::F16, WeightType::F16) => Ok(PrecisionPath::Uniform),
            (ElementType::F16, WeightType::U8 | WeightType::U4) => {
                Ok(PrecisionPath::WeightQuantized)
            }
            (ElementType::F32, WeightType::F32) => Ok(PrecisionPath::SimtOnly),
            (element, weight) => Err(MoeGemmError::Config(format!(
                "unsupported element/weight type pair for MoE GEMM: {}/{}",
                element.name(),
                weight.name()
            ))),
        }
    }

    pub const fn operator_class(self) -> OperatorClass {
        match self {
            PrecisionPath::Uniform | PrecisionPath::WeightQuantized => OperatorClass::TensorOp,
            PrecisionPath::SimtOnly => OperatorClass::Simt,
        }
    }

    pub const fn is_weight_only(self) -> bool {
        matches!(self, PrecisionPath::WeightQuantized)
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            PrecisionPath::Uniform => 0,
            PrecisionPath::WeightQuantized => 1,
            PrecisionPath::SimtOnly => 2,
        }
    }
}

impl fmt::Display for PrecisionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrecisionPath::Uniform => "uniform",
            PrecisionPath::WeightQuantized => "weight-quantized",
            PrecisionPath::SimtOnly => "simt-only",
        };
        f.write_str(name)
    }
}
