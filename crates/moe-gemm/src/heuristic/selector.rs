use crate::config::GemmConfig;
use crate::error::{MoeGemmError, Result};
use crate::types::ProblemShape;

/// Score margin below which a lower-wave candidate is preferred over the
/// current best.
pub const SCORE_SLACK: f32 = 0.1;

/// Reduction-tile depth weight-only kernels are built around.
const WEIGHT_ONLY_K_TILE: usize = 64;

/// The winning candidate and the numbers it won with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredConfig {
    pub config: GemmConfig,
    /// Position in the candidate list.
    pub index: usize,
    pub occupancy: u32,
    pub waves: usize,
    pub score: f32,
}

/// Pick the candidate that wastes the least of its last wave.
///
/// Pure and deterministic: identical inputs give the identical result, and
/// ties resolve by candidate order unless the later candidate is deeper or
/// uses a larger M tile at the same score. Candidates with zero occupancy
/// never win.
pub fn select_config(
    candidates: &[GemmConfig],
    occupancies: &[u32],
    problem: &ProblemShape,
    multi_processor_count: u32,
    is_weight_only: bool,
) -> Result<ScoredConfig> {
    if candidates.len() != occupancies.len() {
        return Err(MoeGemmError::Config(format!(
            "candidate and occupancy lists differ in length ({} vs {})",
            candidates.len(),
            occupancies.len()
        )));
    }
    if multi_processor_count == 0 {
        return Err(MoeGemmError::Resource("zero multiprocessors".to_string()));
    }
    if !occupancies.iter().any(|&o| o > 0) {
        return Err(MoeGemmError::Resource(
            "no candidate configuration fits on this device".to_string(),
        ));
    }

    let rows = problem.total_rows;
    let sm_count = multi_processor_count as usize;
    let mut best: Option<ScoredConfig> = None;
    let mut current_m_tile = 0usize;

    for (index, (config, &occupancy)) in candidates.iter().zip(occupancies).enumerate() {
        if occupancy == 0 {
            continue;
        }
        let tile = config.tile_config.threadblock_shape()?;
        if is_weight_only && problem.gemm_k % WEIGHT_ONLY_K_TILE != 0 {
            continue;
        }
        // Larger M tiles only pad a problem that already fits in one tile
        if best.is_some() && rows < current_m_tile && current_m_tile < tile.m {
            continue;
        }

        let ctas_per_wave = occupancy as usize * sm_count;
        let m_tiles = (rows.div_ceil(tile.m) + problem.num_experts.saturating_sub(1))
            .min(rows)
            .max(1);
        let ctas = m_tiles * problem.gemm_n.div_ceil(tile.n);
        let waves = ctas.div_ceil(ctas_per_wave);
        let score = waves as f32 - ctas as f32 / ctas_per_wave as f32;

        let candidate = ScoredConfig {
            config: *config,
            index,
            occupancy,
            waves,
            score,
        };

        let replace = match &best {
            None => true,
            Some(b) => {
                score < b.score
                    // Fewer waves wins unless it costs more than the slack
                    || (b.waves > waves && score < b.score + SCORE_SLACK)
                    || (score == b.score
                        && (b.config.stages < config.stages || current_m_tile < tile.m))
            }
        };
        if replace {
            current_m_tile = tile.m;
            best = Some(candidate);
        }
    }

    let best = best.ok_or_else(|| {
        MoeGemmError::Config(format!(
            "heuristic found no valid config for n={} k={}",
            problem.gemm_n, problem.gemm_k
        ))
    })?;
    tracing::debug!(
        config = %best.config,
        occupancy = best.occupancy,
        waves = best.waves,
        score = best.score,
        "selected grouped gemm config"
    );
    Ok(best)
}
