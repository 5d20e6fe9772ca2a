use crate::config::GemmShape;
use std::ops::Range;

/// One output tile of the grouped problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileAssignment {
    pub expert: usize,
    /// Absolute rows of the activation and output matrices.
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

/// Maps a flat tile index onto (expert, row range, column range).
///
/// Tiles are numbered expert-major, then M tile, then N tile. Empty experts
/// own no tiles. A persistent grid of `threadblock_count` blocks covers the
/// problem by having block `b` take tiles `b, b + count, b + 2·count, …`.
#[derive(Debug, Clone)]
pub struct GroupedTileScheduler {
    /// Row range of each expert.
    expert_rows: Vec<Range<usize>>,
    tile: GemmShape,
    gemm_n: usize,
    n_tiles: usize,
    /// Tiles owned by experts before `e`; one trailing entry for the total.
    tile_offsets: Vec<usize>,
}

impl GroupedTileScheduler {
    /// A boundary below its predecessor (or below zero) gives that expert
    /// no rows.
    pub fn new(row_boundaries: &[i64], tile: GemmShape, gemm_n: usize) -> Self {
        let n_tiles = gemm_n.div_ceil(tile.n);
        let mut expert_rows = Vec::with_capacity(row_boundaries.len());
        let mut tile_offsets = Vec::with_capacity(row_boundaries.len() + 1);
        let mut total = 0usize;
        let mut start = 0usize;
        tile_offsets.push(0);
        for &end in row_boundaries {
            let end = (end.max(0) as usize).max(start);
            total += (end - start).div_ceil(tile.m) * n_tiles;
            tile_offsets.push(total);
            expert_rows.push(start..end);
            start = end;
        }
        Self {
            expert_rows,
            tile,
            gemm_n,
            n_tiles,
            tile_offsets,
        }
    }

    pub fn total_tiles(&self) -> usize {
        self.tile_offsets.last().copied().unwrap_or(0)
    }

    pub fn tile(&self, index: usize) -> Option<TileAssignment> {
        if index >= self.total_tiles() {
            return None;
        }
        let expert = self.tile_offsets.partition_point(|&o| o <= index) - 1;
        let local = index - self.tile_offsets[expert];
        let (tm, tn) = (local / self.n_tiles, local % self.n_tiles);
        let rows = &self.expert_rows[expert];

        let row_start = rows.start + tm * self.tile.m;
        let col_start = tn * self.tile.n;
        Some(TileAssignment {
            expert,
            rows: row_start..(row_start + self.tile.m).min(rows.end),
            cols: col_start..(col_start + self.tile.n).min(self.gemm_n),
        })
    }

    /// Tiles processed by one block of a persistent grid.
    pub fn tiles_for_block(
        &self,
        block: usize,
        threadblock_count: usize,
    ) -> impl Iterator<Item = TileAssignment> + '_ {
        (block..self.total_tiles())
            .step_by(threadblock_count.max(1))
            .filter_map(move |i| self.tile(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiles_follow_experts() {
        // expert 0: 40 rows, expert 1: empty, expert 2: 10 rows
        let bounds = [40, 40, 50];
        let s = GroupedTileScheduler::new(&bounds, GemmShape::new(32, 64, 8), 128);
        // 2 M tiles × 2 N tiles, then 1 × 2
        assert_eq!(s.total_tiles(), 6);

        let t = s.tile(3).unwrap();
        assert_eq!(t.expert, 0);
        assert_eq!(t.rows, 32..40);
        assert_eq!(t.cols, 64..128);

        let t = s.tile(4).unwrap();
        assert_eq!(t.expert, 2);
        assert_eq!(t.rows, 40..50);
        assert_eq!(t.cols, 0..64);

        assert!(s.tile(6).is_none());
    }

    #[test]
    fn test_partial_column_tile() {
        let bounds = [8];
        let s = GroupedTileScheduler::new(&bounds, GemmShape::new(32, 128, 8), 200);
        assert_eq!(s.total_tiles(), 2);
        assert_eq!(s.tile(1).unwrap().cols, 128..200);
    }

    #[test]
    fn test_persistent_blocks_cover_every_tile_once() {
        let bounds = [100, 130, 300, 300, 512];
        let s = GroupedTileScheduler::new(&bounds, GemmShape::new(64, 128, 64), 512);
        let blocks = 7;
        let mut seen = vec![0usize; s.total_tiles()];
        for b in 0..blocks {
            for t in s.tiles_for_block(b, blocks) {
                let idx = (0..s.total_tiles())
                    .position(|i| s.tile(i).as_ref() == Some(&t))
                    .unwrap();
                seen[idx] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_decreasing_boundary_owns_no_tiles() {
        let bounds = [64, 32, 96];
        let s = GroupedTileScheduler::new(&bounds, GemmShape::new(32, 128, 64), 128);
        // Expert 1 is empty; rows 32..64 are not revisited by expert 2
        assert_eq!(s.total_tiles(), 3);
        let t = s.tile(2).unwrap();
        assert_eq!(t.expert, 2);
        assert_eq!(t.rows, 64..96);
    }

    #[test]
    fn test_no_rows_no_tiles() {
        let bounds = [0, 0];
        let s = GroupedTileScheduler::new(&bounds, GemmShape::new(32, 128, 64), 256);
        assert_eq!(s.total_tiles(), 0);
        assert_eq!(s.tiles_for_block(0, 4).count(), 0);
    }
}
