//! Uniform spatial grid for broad-phase collision pruning.
//!
//! The arena is divided into fixed cells (~2x the largest entity radius).
//! Every alive entity is inserted each tick into the cell(s) overlapping its
//! bounding region; collision passes query the union of candidates in cells
//! overlapping a circle before running exact tests. The grid is fully
//! rebuilt every tick; entity counts are small enough that the O(n)
//! rebuild costs less than the tests it prunes.

use crate::game::constants::spatial::CELL_SIZE;

/// Which flat entity list an [`EntityRef`] indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Projectile,
    Mob,
    Asteroid,
    Pickup,
}

/// Reference into one of the per-kind flat lists rebuilt each tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub idx: usize,
}

/// Fixed-size uniform grid over the arena
pub struct SpatialGrid {
    cols: usize,
    rows: usize,
    cells: Vec<Vec<EntityRef>>,
}

impl SpatialGrid {
    /// Create a grid covering a world of the given size
    pub fn new(world_w: f32, world_h: f32) -> Self {
        let cols = (world_w / CELL_SIZE).ceil() as usize + 1;
        let rows = (world_h / CELL_SIZE).ceil() as usize + 1;
        Self {
            cols,
            rows,
            cells: (0..cols * rows).map(|_| Vec::new()).collect(),
        }
    }

    /// Reset all cells, keeping allocated capacity
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    #[inline]
    fn cell_index(&self, x: f32, y: f32) -> usize {
        let cx = ((x / CELL_SIZE) as isize).clamp(0, self.cols as isize - 1) as usize;
        let cy = ((y / CELL_SIZE) as isize).clamp(0, self.rows as isize - 1) as usize;
        cy * self.cols + cx
    }

    #[inline]
    fn cell_range(&self, x: f32, y: f32, radius: f32) -> (usize, usize, usize, usize) {
        let min_cx = (((x - radius) / CELL_SIZE) as isize).clamp(0, self.cols as isize - 1) as usize;
        let max_cx = (((x + radius) / CELL_SIZE) as isize).clamp(0, self.cols as isize - 1) as usize;
        let min_cy = (((y - radius) / CELL_SIZE) as isize).clamp(0, self.rows as isize - 1) as usize;
        let max_cy = (((y + radius) / CELL_SIZE) as isize).clamp(0, self.rows as isize - 1) as usize;
        (min_cx, max_cx, min_cy, max_cy)
    }

    /// Insert an entity reference at a point
    pub fn insert(&mut self, x: f32, y: f32, entity: EntityRef) {
        let idx = self.cell_index(x, y);
        self.cells[idx].push(entity);
    }

    /// Insert an entity reference into every cell its bounding box overlaps
    pub fn insert_circle(&mut self, x: f32, y: f32, radius: f32, entity: EntityRef) {
        let (min_cx, max_cx, min_cy, max_cy) = self.cell_range(x, y, radius);
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                self.cells[cy * self.cols + cx].push(entity);
            }
        }
    }

    /// Append all candidates in cells overlapping the query circle to `buf`.
    /// Passing a reused buffer avoids per-query allocation; callers clear it
    /// with `buf.clear()` (or hand in `mem::take`-style ownership) first.
    pub fn query_into(&self, x: f32, y: f32, radius: f32, buf: &mut Vec<EntityRef>) {
        let (min_cx, max_cx, min_cy, max_cy) = self.cell_range(x, y, radius);
        for cy in min_cy..=max_cy {
            for cx in min_cx..=max_cx {
                buf.extend_from_slice(&self.cells[cy * self.cols + cx]);
            }
        }
    }

    /// Allocating convenience wrapper around [`query_into`](Self::query_into)
    pub fn query(&self, x: f32, y: f32, radius: f32) -> Vec<EntityRef> {
        let mut buf = Vec::new();
        self.query_into(x, y, radius, &mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(4000.0, 4000.0)
    }

    #[test]
    fn test_insert_and_query() {
        let mut g = grid();
        g.insert(
            100.0,
            100.0,
            EntityRef {
                kind: EntityKind::Player,
                idx: 0,
            },
        );

        let near = g.query(100.0, 100.0, 50.0);
        assert!(near
            .iter()
            .any(|r| r.kind == EntityKind::Player && r.idx == 0));

        let far = g.query(3000.0, 3000.0, 50.0);
        assert!(!far
            .iter()
            .any(|r| r.kind == EntityKind::Player && r.idx == 0));
    }

    #[test]
    fn test_clear_empties_all_cells() {
        let mut g = grid();
        g.insert(
            500.0,
            500.0,
            EntityRef {
                kind: EntityKind::Mob,
                idx: 0,
            },
        );
        g.clear();
        assert!(g.query(500.0, 500.0, 100.0).is_empty());
    }

    #[test]
    fn test_insert_circle_spans_cells() {
        let mut g = grid();
        // Radius 40 at (160,160) spans the cell boundary at 160
        g.insert_circle(
            160.0,
            160.0,
            40.0,
            EntityRef {
                kind: EntityKind::Asteroid,
                idx: 0,
            },
        );

        // Query at the edge of its bounding box should find it
        let results = g.query(120.0, 120.0, 5.0);
        assert!(results
            .iter()
            .any(|r| r.kind == EntityKind::Asteroid && r.idx == 0));
    }

    #[test]
    fn test_out_of_bounds_clamps() {
        let mut g = grid();
        g.insert(
            -10.0,
            -10.0,
            EntityRef {
                kind: EntityKind::Player,
                idx: 0,
            },
        );
        g.insert(
            5000.0,
            5000.0,
            EntityRef {
                kind: EntityKind::Player,
                idx: 1,
            },
        );

        assert!(g
            .query(0.0, 0.0, 50.0)
            .iter()
            .any(|r| r.idx == 0));
        assert!(g
            .query(4000.0, 4000.0, 50.0)
            .iter()
            .any(|r| r.idx == 1));
    }

    #[test]
    fn test_query_into_reuses_buffer() {
        let mut g = grid();
        g.insert(
            200.0,
            200.0,
            EntityRef {
                kind: EntityKind::Pickup,
                idx: 3,
            },
        );

        let mut buf = Vec::with_capacity(16);
        g.query_into(200.0, 200.0, 30.0, &mut buf);
        assert_eq!(buf.len(), 1);

        buf.clear();
        g.query_into(200.0, 200.0, 30.0, &mut buf);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf[0].idx, 3);
    }
}
