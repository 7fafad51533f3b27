use std::sync::Arc;

use crate::components::mask::RegionMask;
use crate::geometry::PixelRect;

/// Default number of grid divisions per axis.
pub const DEFAULT_DIVISIONS: u32 = 4;

/// Fixed `x_divisions × y_divisions` grid over the image.  Each cell holds
/// shared handles to every mask whose bounding rectangle overlaps it; the
/// masks themselves live once, in the pool.
pub struct SpatialIndex {
    bounds: PixelRect,
    x_divisions: u32,
    y_divisions: u32,
    cell_width: u32,
    cell_height: u32,
    cells: Vec<Vec<Arc<RegionMask>>>,
    pool: Vec<Arc<RegionMask>>,
}

impl SpatialIndex {
    /// Divisions are clamped to `1..=extent` on each axis so every cell is at
    /// least one pixel wide.
    pub fn new(bounds: PixelRect, x_divisions: u32, y_divisions: u32) -> Self {
        let x_divisions = x_divisions.clamp(1, bounds.width.max(1));
        let y_divisions = y_divisions.clamp(1, bounds.height.max(1));
        let cell_width = bounds.width.div_ceil(x_divisions).max(1);
        let cell_height = bounds.height.div_ceil(y_divisions).max(1);
        Self {
            bounds,
            x_divisions,
            y_divisions,
            cell_width,
            cell_height,
            cells: vec![Vec::new(); (x_divisions * y_divisions) as usize],
            pool: Vec::new(),
        }
    }

    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn divisions(&self) -> (u32, u32) {
        (self.x_divisions, self.y_divisions)
    }

    /// Add `mask` to the pool and to every cell its bounding rectangle
    /// overlaps.  Masks lying entirely outside the indexed area are kept in
    /// the pool but reachable from no cell.
    pub fn register(&mut self, mask: RegionMask) -> Arc<RegionMask> {
        let mask = Arc::new(mask);
        if let Some(area) = mask.bounds().intersection(&self.bounds) {
            let cx0 = self.column_of(area.x);
            let cx1 = self.column_of(area.right() - 1);
            let cy0 = self.row_of(area.y);
            let cy1 = self.row_of(area.bottom() - 1);
            for cy in cy0..=cy1 {
                for cx in cx0..=cx1 {
                    let idx = (cy * self.x_divisions + cx) as usize;
                    self.cells[idx].push(Arc::clone(&mask));
                }
            }
        }
        self.pool.push(Arc::clone(&mask));
        mask
    }

    /// Candidates for the cell containing `(x, y)`, in registration order.
    /// Callers must still check real membership.
    pub fn query(&self, x: u32, y: u32) -> &[Arc<RegionMask>] {
        match self.cell_index(x, y) {
            Some(idx) => &self.cells[idx],
            None => &[],
        }
    }

    /// Every registered mask, in registration order.
    pub fn masks(&self) -> &[Arc<RegionMask>] {
        &self.pool
    }

    pub fn mask_count(&self) -> usize {
        self.pool.len()
    }

    pub fn compressed_bytes(&self) -> usize {
        self.pool.iter().map(|m| m.compressed_len()).sum()
    }

    /// Rectangle covered by cell `(cx, cy)`, clamped to the indexed area.
    pub fn cell_rect(&self, cx: u32, cy: u32) -> PixelRect {
        let x = self.bounds.x + cx * self.cell_width;
        let y = self.bounds.y + cy * self.cell_height;
        let right = (x + self.cell_width).min(self.bounds.right());
        let bottom = (y + self.cell_height).min(self.bounds.bottom());
        PixelRect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Masks registered in cell `(cx, cy)`.
    pub fn cell(&self, cx: u32, cy: u32) -> &[Arc<RegionMask>] {
        if cx >= self.x_divisions || cy >= self.y_divisions {
            return &[];
        }
        &self.cells[(cy * self.x_divisions + cx) as usize]
    }

    fn column_of(&self, x: u32) -> u32 {
        ((x - self.bounds.x) / self.cell_width).min(self.x_divisions - 1)
    }

    fn row_of(&self, y: u32) -> u32 {
        ((y - self.bounds.y) / self.cell_height).min(self.y_divisions - 1)
    }

    fn cell_index(&self, x: u32, y: u32) -> Option<usize> {
        if !self.bounds.contains(x, y) {
            return None;
        }
        Some((self.row_of(y) * self.x_divisions + self.column_of(x)) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_at(rect: PixelRect) -> RegionMask {
        RegionMask::from_encoded(rect, Vec::new())
    }

    #[test]
    fn mask_appears_in_every_overlapped_cell_and_nowhere_else() {
        let mut index = SpatialIndex::new(PixelRect::new(0, 0, 100, 100), 4, 4);
        index.register(mask_at(PixelRect::new(20, 20, 40, 10)));

        for cy in 0..4 {
            for cx in 0..4 {
                let overlaps = index
                    .cell_rect(cx, cy)
                    .intersects(&PixelRect::new(20, 20, 40, 10));
                assert_eq!(index.cell(cx, cy).len(), overlaps as usize, "cell {cx},{cy}");
            }
        }
        // Shared handle, not a copy
        let a = &index.cell(0, 0)[0];
        let b = &index.cell(2, 0)[0];
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(index.mask_count(), 1);
    }

    #[test]
    fn query_returns_the_cell_of_the_point() {
        let mut index = SpatialIndex::new(PixelRect::new(0, 0, 10, 10), 2, 2);
        index.register(mask_at(PixelRect::new(0, 0, 3, 3)));
        index.register(mask_at(PixelRect::new(6, 6, 4, 4)));
        assert_eq!(index.query(1, 1).len(), 1);
        assert_eq!(index.query(9, 9).len(), 1);
        assert_eq!(index.query(9, 0).len(), 0);
        assert_eq!(index.query(10, 0).len(), 0);
    }

    #[test]
    fn uneven_extent_keeps_last_cell_reachable() {
        let index = SpatialIndex::new(PixelRect::new(0, 0, 10, 7), 4, 4);
        // ceil(10/4)=3, ceil(7/4)=2
        assert_eq!(index.cell_rect(3, 3), PixelRect::new(9, 6, 1, 1));
        assert_eq!(index.cell_index(9, 6), Some(15));
    }

    #[test]
    fn divisions_are_clamped_to_the_image() {
        let index = SpatialIndex::new(PixelRect::new(0, 0, 2, 3), 8, 8);
        assert_eq!(index.divisions(), (2, 3));
    }
}
