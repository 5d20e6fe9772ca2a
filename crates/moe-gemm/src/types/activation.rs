/// Activation attribute of an MoE expert projection.
///
/// Only the non-gated activations can be fused into the grouped GEMM
/// epilogue. Gated variants are applied by the host graph after the GEMM,
/// and [`ActivationType::InvalidType`] stands for a missing or unparsable
/// attribute; both are rejected by the epilogue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivationType {
    Gelu,
    Relu,
    Silu,
    GeGlu,
    ReGlu,
    SwiGlu,
    Identity,
    #[default]
    InvalidType,
}

impl ActivationType {
    /// Gated linear unit variants, which need two GEMM outputs per element.
    pub const fn is_gated(self) -> bool {
        matches!(
            self,
            ActivationType::GeGlu | ActivationType::ReGlu | ActivationType::SwiGlu
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            ActivationType::Gelu => "gelu",
            ActivationType::Relu => "relu",
            ActivationType::Silu => "silu",
            ActivationType::GeGlu => "geglu",
            ActivationType::ReGlu => "reglu",
            ActivationType::SwiGlu => "swiglu",
            ActivationType::Identity => "identity",
            ActivationType::InvalidType => "invalid",
        }
    }
}

impl From<&str> for ActivationType {
    /// Parse a graph attribute. Unknown names map to `InvalidType`.
    fn from(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "gelu" => ActivationType::Gelu,
            "relu" => ActivationType::Relu,
            "silu" | "swish" => ActivationType::Silu,
            "geglu" => ActivationType::GeGlu,
            "reglu" => ActivationType::ReGlu,
            "swiglu" => ActivationType::SwiGlu,
            "identity" | "none" => ActivationType::Identity,
            _ => ActivationType::InvalidType,
        }
    }
}
