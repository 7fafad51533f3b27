// ============================================================================
// REGION QUERY – "which enclosed region contains this point?"
// ============================================================================

use std::time::Instant;

use crate::canvas::PixelBuffer;
use crate::components::mask::RegionFill;
use crate::components::spatial_index::SpatialIndex;
use crate::ops::flood_fill;
use crate::{log_info, log_warn};

/// Resolve the region containing pixel `(x, y)`.
///
/// With no index the region is flood-filled on demand against the live
/// buffer.  With an index, candidates from the point's grid cell are
/// narrowed by bounding-rect containment, ordered by squared distance from
/// each rect's origin, and decoded one by one until true membership is
/// found.  The origin ordering is only a heuristic for which candidate to
/// decode first; membership decides the answer.
///
/// `None` means "no region": out of bounds, an outline pixel, or no
/// candidate claiming the point.
pub fn query_fill(
    buffer: &PixelBuffer,
    index: Option<&SpatialIndex>,
    x: u32,
    y: u32,
) -> Option<RegionFill> {
    if !buffer.in_bounds(x, y) || buffer.is_outline(x, y) {
        return None;
    }
    match index {
        Some(index) => query_precomputed(index, x, y),
        None => flood_fill::fill_region(buffer, x, y),
    }
}

fn query_precomputed(index: &SpatialIndex, x: u32, y: u32) -> Option<RegionFill> {
    let start = Instant::now();
    let cell = index.query(x, y);
    let mut candidates: Vec<_> = cell.iter().filter(|m| m.bounds_contain(x, y)).collect();
    // Stable: equal distances keep registration order
    candidates.sort_by(|a, b| {
        a.squared_distance_from_origin(x, y)
            .total_cmp(&b.squared_distance_from_origin(x, y))
    });

    for (tried, mask) in candidates.iter().enumerate() {
        match mask.decode() {
            Ok(fill) if fill.contains(x, y) => {
                log_info!(
                    "Fill at ({}, {}): match after {}/{} candidates ({} in cell), {} µs",
                    x,
                    y,
                    tried + 1,
                    candidates.len(),
                    cell.len(),
                    start.elapsed().as_micros()
                );
                return Some(fill);
            }
            Ok(_) => {}
            Err(e) => {
                log_warn!("Skipping undecodable mask at {:?}: {}", mask.bounds(), e);
            }
        }
    }
    log_info!(
        "Fill at ({}, {}): no match among {} candidates",
        x,
        y,
        candidates.len()
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BitPlane;
    use crate::components::mask::RegionMask;
    use crate::geometry::PixelRect;
    use crate::ops::segmentation::segment;

    fn blank(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer::new(width, height, width as usize * 4, vec![0; (width * height * 4) as usize])
            .unwrap()
    }

    fn mask_with(bounds: PixelRect, members: &[(u32, u32)]) -> RegionMask {
        let mut bits = BitPlane::new(bounds.width, bounds.height);
        for &(x, y) in members {
            bits.set(x - bounds.x, y - bounds.y);
        }
        RegionMask::encode(bounds, &bits).unwrap()
    }

    #[test]
    fn outline_pixel_is_rejected_in_both_modes() {
        let mut data = vec![0u8; 10 * 10 * 4];
        data[(5 * 10 + 5) * 4 + 3] = 255;
        let buffer = PixelBuffer::new(10, 10, 40, data).unwrap();
        let (index, _) = segment(&buffer, 4, 4).unwrap();
        assert!(query_fill(&buffer, None, 5, 5).is_none());
        assert!(query_fill(&buffer, Some(&index), 5, 5).is_none());

        let fill = query_fill(&buffer, Some(&index), 0, 0).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(0, 0, 10, 10));
        assert_eq!(fill.member_count(), 99);
    }

    #[test]
    fn membership_beats_the_origin_heuristic() {
        let buffer = blank(10, 10);
        let mut index = SpatialIndex::new(buffer.bounds(), 1, 1);
        // Far origin, but owns the point
        index.register(mask_with(PixelRect::new(0, 0, 10, 10), &[(5, 5)]));
        // Near origin, bounds contain the point, but it is not a member
        index.register(mask_with(PixelRect::new(4, 4, 6, 6), &[(4, 4)]));

        let fill = query_fill(&buffer, Some(&index), 5, 5).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(0, 0, 10, 10));
    }

    #[test]
    fn nearer_origin_is_tried_first_when_both_match() {
        let buffer = blank(10, 10);
        let mut index = SpatialIndex::new(buffer.bounds(), 1, 1);
        index.register(mask_with(PixelRect::new(0, 0, 10, 10), &[(6, 6)]));
        index.register(mask_with(PixelRect::new(5, 5, 3, 3), &[(6, 6)]));
        let fill = query_fill(&buffer, Some(&index), 6, 6).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(5, 5, 3, 3));
    }

    #[test]
    fn undecodable_candidate_is_skipped() {
        let buffer = blank(10, 10);
        let mut index = SpatialIndex::new(buffer.bounds(), 1, 1);
        index.register(mask_with(PixelRect::new(0, 0, 10, 10), &[(3, 3)]));
        index.register(RegionMask::from_encoded(PixelRect::new(3, 3, 2, 2), vec![0xde, 0xad]));
        let fill = query_fill(&buffer, Some(&index), 3, 3).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(0, 0, 10, 10));
    }

    #[test]
    fn no_candidate_means_no_region() {
        let buffer = blank(10, 10);
        let index = SpatialIndex::new(buffer.bounds(), 2, 2);
        assert!(query_fill(&buffer, Some(&index), 1, 1).is_none());
        assert!(query_fill(&buffer, Some(&index), 10, 1).is_none());
    }

    #[test]
    fn repeated_queries_return_identical_masks() {
        let mut data = vec![0u8; 12 * 8 * 4];
        for y in 0..8 {
            data[(y * 12 + 6) * 4 + 3] = 255;
        }
        let buffer = PixelBuffer::new(12, 8, 48, data).unwrap();
        let (index, _) = segment(&buffer, 4, 4).unwrap();
        let a = query_fill(&buffer, Some(&index), 9, 3).unwrap();
        let b = query_fill(&buffer, Some(&index), 9, 3).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.bounds(), PixelRect::new(7, 0, 5, 8));
    }
}
