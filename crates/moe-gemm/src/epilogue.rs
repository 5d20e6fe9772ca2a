//! Epilogue policy: bias add and activation fused into the output stage.
//!
//! The selection is derived from the activation attribute and the presence
//! of a bias operand:
//!
//! | Activation | Bias | Epilogue |
//! |------------|------|----------|
//! | Identity | yes | `acc + bias` |
//! | Relu / Gelu / Silu | yes | `act(acc + bias)` |
//! | Identity | no | `acc` |
//! | Relu / Gelu / Silu | no | `act(acc)` |
//!
//! Without a bias operand the add is skipped entirely rather than scaling a
//! bias by zero. Gated and invalid activations are rejected before anything
//! is probed or launched.

use crate::error::{MoeGemmError, Result};
use crate::types::ActivationType;

/// sqrt(2 / pi), used by the tanh approximation of GELU.
const GELU_SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044_715;

/// Activation applied by the epilogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpilogueActivation {
    Identity,
    Relu,
    /// Tanh approximation.
    Gelu,
    Silu,
}

impl EpilogueActivation {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            EpilogueActivation::Identity => x,
            EpilogueActivation::Relu => x.max(0.0),
            EpilogueActivation::Gelu => {
                let inner = GELU_SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
                0.5 * x * (1.0 + inner.tanh())
            }
            EpilogueActivation::Silu => x / (1.0 + (-x).exp()),
        }
    }
}

/// Output scale of the epilogue: `alpha * acc`.
///
/// There is no `C` source term. The bias is a separate per-expert operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpilogueParams {
    pub alpha: f32,
}

impl Default for EpilogueParams {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Resolved epilogue variant of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpilogueSelection {
    activation: EpilogueActivation,
    bias: bool,
}

impl EpilogueSelection {
    /// Every epilogue a kernel family is instantiated with.
    pub const ALL: [EpilogueSelection; 8] = [
        Self::with(EpilogueActivation::Identity, true),
        Self::with(EpilogueActivation::Relu, true),
        Self::with(EpilogueActivation::Gelu, true),
        Self::with(EpilogueActivation::Silu, true),
        Self::with(EpilogueActivation::Identity, false),
        Self::with(EpilogueActivation::Relu, false),
        Self::with(EpilogueActivation::Gelu, false),
        Self::with(EpilogueActivation::Silu, false),
    ];

    const fn with(activation: EpilogueActivation, bias: bool) -> Self {
        Self { activation, bias }
    }

    /// Derive the epilogue from an activation attribute and bias presence.
    pub fn new(activation: ActivationType, has_bias: bool) -> Result<Self> {
        let activation = match activation {
            ActivationType::Identity => EpilogueActivation::Identity,
            ActivationType::Relu => EpilogueActivation::Relu,
            ActivationType::Gelu => EpilogueActivation::Gelu,
            ActivationType::Silu => EpilogueActivation::Silu,
            ActivationType::GeGlu | ActivationType::ReGlu | ActivationType::SwiGlu => {
                return Err(MoeGemmError::Activation(format!(
                    "gated activation {} cannot be fused into the grouped epilogue",
                    activation.name()
                )));
            }
            ActivationType::InvalidType => {
                return Err(MoeGemmError::Activation(
                    "invalid activation type for MoE GEMM".to_string(),
                ));
            }
        };
        Ok(Self {
            activation,
            bias: has_bias,
        })
    }

    /// Plain GEMM output: no bias, no activation.
    pub const fn no_bias() -> Self {
        Self::with(EpilogueActivation::Identity, false)
    }

    pub fn activation(&self) -> EpilogueActivation {
        self.activation
    }

    pub fn has_bias(&self) -> bool {
        self.bias
    }

    /// Suffix identifying the epilogue in kernel names.
    pub fn tag(&self) -> &'static str {
        match (self.bias, self.activation) {
            (true, EpilogueActivation::Identity) => "bias",
            (true, EpilogueActivation::Relu) => "bias_relu",
            (true, EpilogueActivation::Gelu) => "bias_gelu",
            (true, EpilogueActivation::Silu) => "bias_silu",
            (false, EpilogueActivation::Identity) => "nobias",
            (false, EpilogueActivation::Relu) => "relu",
            (false, EpilogueActivation::Gelu) => "gelu",
            (false, EpilogueActivation::Silu) => "silu",
        }
    }

    /// Output value for one accumulator.
    ///
    /// `bias` is ignored when the selection carries no bias.
    #[inline]
    pub fn apply(&self, params: &EpilogueParams, acc: f32, bias: f32) -> f32 {
        let mut x = params.alpha * acc;
        if self.bias {
            x += bias;
        }
        self.activation.apply(x)
    }
}
