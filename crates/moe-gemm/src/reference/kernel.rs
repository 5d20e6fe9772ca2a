use super::scheduler::{GroupedTileScheduler, TileAssignment};
use crate::launcher::{GroupedGemmArguments, GroupedGemmKernel, KernelOperands};
use crate::types::WeightType;
use std::sync::Mutex;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Expert weights, `[experts, k, n]` row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum HostWeights {
    Float(Vec<f32>),
    Int8(Vec<i8>),
    /// Two signed 4-bit values per byte, low nibble first.
    Int4(Vec<u8>),
}

impl HostWeights {
    fn matches(&self, weight: WeightType) -> bool {
        matches!(
            (self, weight),
            (HostWeights::Float(_), WeightType::F16 | WeightType::F32)
                | (HostWeights::Int8(_), WeightType::U8)
                | (HostWeights::Int4(_), WeightType::U4)
        )
    }

    fn element_count(&self) -> usize {
        match self {
            HostWeights::Float(w) => w.len(),
            HostWeights::Int8(w) => w.len(),
            HostWeights::Int4(w) => w.len() * 2,
        }
    }

    #[inline]
    fn get(&self, idx: usize) -> f32 {
        match self {
            HostWeights::Float(w) => w[idx],
            HostWeights::Int8(w) => w[idx] as f32,
            HostWeights::Int4(w) => {
                let byte = w[idx / 2];
                let nibble = if idx % 2 == 0 { byte & 0x0f } else { byte >> 4 };
                (((nibble << 4) as i8) >> 4) as f32
            }
        }
    }
}

/// Pack signed 4-bit values (`-8..=7`) two per byte, low nibble first.
pub fn pack_int4(values: &[i8]) -> Vec<u8> {
    values
        .chunks(2)
        .map(|pair| {
            let lo = pair[0] as u8 & 0x0f;
            let hi = pair.get(1).map_or(0, |&v| v as u8 & 0x0f);
            lo | (hi << 4)
        })
        .collect()
}

/// Operands of a host grouped GEMM.
///
/// Activations are `[total_rows, k]`, scales and bias `[experts, n]`, output
/// `[total_rows, n]`, all row-major.
#[derive(Debug, Clone)]
pub struct HostOperands {
    pub activations: Vec<f32>,
    pub weights: HostWeights,
    pub weight_scales: Option<Vec<f32>>,
    pub bias: Option<Vec<f32>>,
    pub output: Vec<f32>,
}

impl KernelOperands for HostOperands {
    fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    fn has_weight_scales(&self) -> bool {
        self.weight_scales.is_some()
    }
}

/// What a [`HostStream`] saw for one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub kernel_name: String,
    pub threadblock_count: u32,
    pub threads_per_block: usize,
    pub shared_memory_bytes: usize,
}

/// In-order host stream. Work runs eagerly at enqueue time and every launch
/// is recorded.
#[derive(Debug, Default)]
pub struct HostStream {
    records: Mutex<Vec<LaunchRecord>>,
}

impl HostStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launch_count(&self) -> usize {
        self.lock().len()
    }

    pub fn records(&self) -> Vec<LaunchRecord> {
        self.lock().clone()
    }

    /// Forget recorded launches.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn push(&self, record: LaunchRecord) {
        self.lock().push(record);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LaunchRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// CPU grouped GEMM over a persistent tile schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostGroupedGemm;

impl HostGroupedGemm {
    fn compute_tile(
        args: &GroupedGemmArguments<'_>,
        operands: &HostOperands,
        tile: &TileAssignment,
    ) -> Vec<f32> {
        let k = args.problem.gemm_k;
        let n = args.problem.gemm_n;
        let e = tile.expert;
        let w_base = e * k * n;
        let mut out = Vec::with_capacity(tile.rows.len() * tile.cols.len());

        for r in tile.rows.clone() {
            let a_row = &operands.activations[r * k..(r + 1) * k];
            for c in tile.cols.clone() {
                let mut acc = 0.0f32;
                for (kk, &a) in a_row.iter().enumerate() {
                    acc += a * operands.weights.get(w_base + kk * n + c);
                }
                if let Some(scales) = &operands.weight_scales {
                    acc *= scales[e * n + c];
                }
                let bias = operands.bias.as_ref().map_or(0.0, |b| b[e * n + c]);
                out.push(args.epilogue.apply(&args.params, acc, bias));
            }
        }
        out
    }
}

impl GroupedGemmKernel for HostGroupedGemm {
    type Operands = HostOperands;
    type Stream = HostStream;

    fn can_implement(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &HostOperands,
    ) -> Result<(), String> {
        let p = &args.problem;
        let weight = args.variant.weight();
        if !operands.weights.matches(weight) {
            return Err(format!("weights do not hold {} values", weight.name()));
        }
        let expect = |what: &str, got: usize, want: usize| {
            if got == want {
                Ok(())
            } else {
                Err(format!("{} has {} elements, expected {}", what, got, want))
            }
        };
        expect("activations", operands.activations.len(), p.total_rows * p.gemm_k)?;
        expect("output", operands.output.len(), p.total_rows * p.gemm_n)?;

        let weight_elems = p.num_experts * p.gemm_k * p.gemm_n;
        let got = operands.weights.element_count();
        // Int4 storage rounds up to a whole byte
        if got != weight_elems && got != weight_elems + weight_elems % 2 {
            return Err(format!("weights have {} elements, expected {}", got, weight_elems));
        }
        if let Some(bias) = &operands.bias {
            expect("bias", bias.len(), p.num_experts * p.gemm_n)?;
        }
        if let Some(scales) = &operands.weight_scales {
            expect("weight scales", scales.len(), p.num_experts * p.gemm_n)?;
        }
        Ok(())
    }

    fn run(
        &self,
        args: &GroupedGemmArguments<'_>,
        operands: &mut HostOperands,
        stream: &HostStream,
    ) -> Result<(), String> {
        let tb = args.variant.threadblock_shape();
        let scheduler = GroupedTileScheduler::new(args.row_boundaries, tb, args.problem.gemm_n);
        let blocks = args.threadblock_count as usize;

        // Block-strided order, as a persistent grid would visit them
        let tiles: Vec<TileAssignment> = (0..blocks)
            .flat_map(|b| scheduler.tiles_for_block(b, blocks))
            .collect();
        let ops = &*operands;

        #[cfg(feature = "parallel")]
        let computed: Vec<Vec<f32>> = tiles
            .par_iter()
            .map(|t| Self::compute_tile(args, ops, t))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let computed: Vec<Vec<f32>> = tiles
            .iter()
            .map(|t| Self::compute_tile(args, ops, t))
            .collect();

        let n = args.problem.gemm_n;
        for (tile, values) in tiles.iter().zip(computed) {
            let width = tile.cols.len();
            for (i, r) in tile.rows.clone().enumerate() {
                let dst = &mut operands.output[r * n + tile.cols.start..r * n + tile.cols.end];
                dst.copy_from_slice(&values[i * width..(i + 1) * width]);
            }
        }

        stream.push(LaunchRecord {
            kernel_name: args.variant.kernel_name(&args.epilogue),
            threadblock_count: args.threadblock_count,
            threads_per_block: args.variant.thread_count(),
            shared_memory_bytes: args.variant.shared_memory_bytes(),
        });
        Ok(())
    }
}
