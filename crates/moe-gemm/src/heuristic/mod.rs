//! Occupancy probing and occupancy-driven configuration selection.
//!
//! Selection runs on every call, so both halves are cheap host-side
//! computations:
//!
//! 1. [`probe_candidates`] resolves each catalog entry through the
//!    dispatcher and computes how many threadblocks of it fit on one
//!    multiprocessor ([`max_active_blocks`]). No GEMM work is issued.
//! 2. [`select_config`] scores every candidate with non-zero occupancy by
//!    the idle fraction of its last wave and returns the best one.
//!
//! # Scoring
//!
//! ```text
//! ctas_per_wave = occupancy × sm_count
//! m_tiles       = max(1, min(ceil(rows / tile_m) + experts − 1, rows))
//! ctas          = m_tiles × ceil(n / tile_n)
//! waves         = ceil(ctas / ctas_per_wave)
//! score         = waves − ctas / ctas_per_wave        (lower is better)
//! ```
//!
//! `m_tiles` bounds the tile count of the grouped problem: each expert adds
//! at most one partial M tile, and no expert gets a tile without a row.

mod occupancy;
mod selector;

pub use occupancy::{max_active_blocks, probe_candidates, probe_candidates_with};
pub use selector::{select_config, ScoredConfig, SCORE_SLACK};
