use crate::error::{MoeGemmError, Result};
use std::fmt;

/// Extents of a GEMM tile along M, N and K.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GemmShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl GemmShape {
    pub const fn new(m: usize, n: usize, k: usize) -> Self {
        Self { m, n, k }
    }

    /// Number of elements in the M×N face.
    pub const fn mn(&self) -> usize {
        self.m * self.n
    }
}

impl fmt::Display for GemmShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.m, self.n, self.k)
    }
}

/// Threadblock/warp shape tag of a kernel configuration.
///
/// `Undefined` and `ChooseWithHeuristic` are placeholders that must be
/// resolved before dispatch. The 128x256 and 256x128 tags exist for dense
/// GEMM and are not instantiated for grouped MoE kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileConfig {
    Undefined,
    ChooseWithHeuristic,
    // SIMT
    CtaShape128x128x8WarpShape64x64x8,
    // Tensor op
    CtaShape32x128x64WarpShape32x32x64,
    CtaShape64x128x64WarpShape32x64x64,
    CtaShape64x128x64WarpShape64x32x64,
    CtaShape128x128x64WarpShape64x32x64,
    CtaShape128x128x64WarpShape128x32x64,
    CtaShape128x256x64WarpShape64x64x64,
    CtaShape256x128x64WarpShape64x64x64,
}

impl TileConfig {
    /// Threadblock and warp shapes, or a configuration error for placeholders.
    pub fn shapes(self) -> Result<(GemmShape, GemmShape)> {
        use TileConfig::*;
        let g = GemmShape::new;
        let shapes = match self {
            Undefined => {
                return Err(MoeGemmError::Config("gemm config undefined".to_string()));
            }
            ChooseWithHeuristic => {
                return Err(MoeGemmError::Config(
                    "gemm config should have already been set by heuristic".to_string(),
                ));
            }
            CtaShape128x128x8WarpShape64x64x8 => (g(128, 128, 8), g(64, 64, 8)),
            CtaShape32x128x64WarpShape32x32x64 => (g(32, 128, 64), g(32, 32, 64)),
            CtaShape64x128x64WarpShape32x64x64 => (g(64, 128, 64), g(32, 64, 64)),
            CtaShape64x128x64WarpShape64x32x64 => (g(64, 128, 64), g(64, 32, 64)),
            CtaShape128x128x64WarpShape64x32x64 => (g(128, 128, 64), g(64, 32, 64)),
            CtaShape128x128x64WarpShape128x32x64 => (g(128, 128, 64), g(128, 32, 64)),
            CtaShape128x256x64WarpShape64x64x64 => (g(128, 256, 64), g(64, 64, 64)),
            CtaShape256x128x64WarpShape64x64x64 => (g(256, 128, 64), g(64, 64, 64)),
        };
        Ok(shapes)
    }

    /// Threadblock shape only.
    pub fn threadblock_shape(self) -> Result<GemmShape> {
        self.shapes().map(|(cta, _)| cta)
    }

    /// Whether the tag names a concrete shape.
    pub fn is_concrete(self) -> bool {
        !matches!(self, TileConfig::Undefined | TileConfig::ChooseWithHeuristic)
    }
}

impl fmt::Display for TileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shapes() {
            Ok((cta, warp)) => write!(f, "cta{}_warp{}", cta, warp),
            Err(_) if *self == TileConfig::Undefined => f.write_str("undefined"),
            Err(_) => f.write_str("choose_with_heuristic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes() {
        let (cta, warp) = TileConfig::CtaShape64x128x64WarpShape32x64x64.shapes().unwrap();
        assert_eq!(cta, GemmShape::new(64, 128, 64));
        assert_eq!(warp, GemmShape::new(32, 64, 64));
        assert_eq!(
            TileConfig::CtaShape128x128x8WarpShape64x64x8.threadblock_shape().unwrap().k,
            8
        );
    }

    #[test]
    fn test_placeholders_fail_fast() {
        let err = TileConfig::Undefined.shapes().unwrap_err();
        assert!(matches!(err, MoeGemmError::Config(_)));
        assert!(err.to_string().contains("undefined"));

        let err = TileConfig::ChooseWithHeuristic.shapes().unwrap_err();
        assert!(err.to_string().contains("heuristic"));
        assert!(!TileConfig::ChooseWithHeuristic.is_concrete());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TileConfig::CtaShape128x128x64WarpShape64x32x64.to_string(),
            "cta128x128x64_warp64x32x64"
        );
        assert_eq!(TileConfig::Undefined.to_string(), "undefined");
    }
}
