use crate::error::{MoeGemmError, Result};

/// Shape signals consumed by the heuristic selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProblemShape {
    /// Rows summed over all experts.
    pub total_rows: usize,
    /// Output width.
    pub gemm_n: usize,
    /// Reduction depth.
    pub gemm_k: usize,
    pub num_experts: usize,
}

/// Row partition and GEMM extents of one grouped invocation.
///
/// `row_boundaries[e]` is the cumulative row count up to and including
/// expert `e`, so expert `e` owns rows
/// `row_boundaries[e - 1]..row_boundaries[e]` of the activation matrix and
/// the last entry is the total row count. This is the host view of the
/// boundary table. The kernel reads its own device-resident copy at launch
/// time to map output tiles onto experts.
#[derive(Debug, Clone, Copy)]
pub struct ExpertGroupDescriptor<'a> {
    num_experts: usize,
    row_boundaries: &'a [i64],
    gemm_n: usize,
    gemm_k: usize,
}

impl<'a> ExpertGroupDescriptor<'a> {
    /// Validate and wrap a boundary table.
    ///
    /// Fails with [`MoeGemmError::Descriptor`] when there are no experts, the
    /// table length differs from `num_experts`, an entry is negative or
    /// smaller than its predecessor, or a GEMM extent is zero.
    pub fn new(
        num_experts: usize,
        row_boundaries: &'a [i64],
        gemm_n: usize,
        gemm_k: usize,
    ) -> Result<Self> {
        if num_experts == 0 {
            return Err(MoeGemmError::Descriptor(
                "num_experts must be at least 1".to_string(),
            ));
        }
        if row_boundaries.len() != num_experts {
            return Err(MoeGemmError::Descriptor(format!(
                "row boundary table has {} entries for {} experts",
                row_boundaries.len(),
                num_experts
            )));
        }
        if row_boundaries[0] < 0 {
            return Err(MoeGemmError::Descriptor(format!(
                "row boundary of expert 0 is negative ({})",
                row_boundaries[0]
            )));
        }
        if let Some(e) = row_boundaries.windows(2).position(|w| w[1] < w[0]) {
            return Err(MoeGemmError::Descriptor(format!(
                "row boundaries decrease at expert {}: {} < {}",
                e + 1,
                row_boundaries[e + 1],
                row_boundaries[e]
            )));
        }
        if gemm_n == 0 || gemm_k == 0 {
            return Err(MoeGemmError::Descriptor(format!(
                "gemm extents must be non-zero (gemm_n={}, gemm_k={})",
                gemm_n, gemm_k
            )));
        }

        Ok(Self {
            num_experts,
            row_boundaries,
            gemm_n,
            gemm_k,
        })
    }

    pub fn num_experts(&self) -> usize {
        self.num_experts
    }

    pub fn row_boundaries(&self) -> &'a [i64] {
        self.row_boundaries
    }

    pub fn gemm_n(&self) -> usize {
        self.gemm_n
    }

    pub fn gemm_k(&self) -> usize {
        self.gemm_k
    }

    /// Total number of rows (last boundary).
    pub fn total_rows(&self) -> usize {
        self.row_boundaries[self.num_experts - 1] as usize
    }

    /// Row range owned by expert `e`.
    pub fn expert_rows(&self, e: usize) -> std::ops::Range<usize> {
        let start = if e == 0 {
            0
        } else {
            self.row_boundaries[e - 1] as usize
        };
        start..self.row_boundaries[e] as usize
    }

    pub fn problem_shape(&self) -> ProblemShape {
        ProblemShape {
            total_rows: self.total_rows(),
            gemm_n: self.gemm_n,
            gemm_k: self.gemm_k,
            num_experts: self.num_experts,
        }
    }
}
