// ============================================================================
// FLOOD FILL – span (scanline) fill bounded by outline pixels
// ============================================================================

use crate::canvas::{BitPlane, PixelBuffer};
use crate::components::mask::RegionFill;
use crate::geometry::PixelRect;

/// One filled run: `x_start..x_end` on row `y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Span {
    y: u32,
    x_start: u32,
    x_end: u32,
}

/// Raw result of a span fill: the runs in discovery order plus their tight
/// bounding rectangle.
struct SpanFill {
    bounds: PixelRect,
    spans: Vec<Span>,
}

impl SpanFill {
    /// Bitmap sized to `bounds`, in bounds-local coordinates.
    fn crop(&self) -> BitPlane {
        let mut bits = BitPlane::new(self.bounds.width, self.bounds.height);
        for span in &self.spans {
            bits.set_span(
                span.y - self.bounds.y,
                span.x_start - self.bounds.x,
                span.x_end - self.bounds.x,
            );
        }
        bits
    }
}

#[inline(always)]
fn is_open(buffer: &PixelBuffer, filled: &BitPlane, x: u32, y: u32) -> bool {
    !buffer.is_outline(x, y) && !filled.get(x, y)
}

/// Fill the connected fillable area around `(seed_x, seed_y)`, marking every
/// reached pixel in `filled` (full-image sized).  Pixels already set in
/// `filled` count as boundaries.  `None` when the seed is out of range, on
/// an outline pixel, or already filled.
fn span_fill(
    buffer: &PixelBuffer,
    seed_x: u32,
    seed_y: u32,
    filled: &mut BitPlane,
) -> Option<SpanFill> {
    if !buffer.in_bounds(seed_x, seed_y) || !is_open(buffer, filled, seed_x, seed_y) {
        return None;
    }
    let width = buffer.width();
    let height = buffer.height();

    let mut min_x = seed_x;
    let mut min_y = seed_y;
    let mut max_x = seed_x;
    let mut max_y = seed_y;

    let mut spans = Vec::new();
    // Explicit stack of seed pixels; a seed may already be filled by the
    // time it is popped, in which case it is skipped.
    let mut stack: Vec<(u32, u32)> = Vec::with_capacity(256);
    stack.push((seed_x, seed_y));

    while let Some((x, y)) = stack.pop() {
        if !is_open(buffer, filled, x, y) {
            continue;
        }

        let mut x_start = x;
        while x_start > 0 && is_open(buffer, filled, x_start - 1, y) {
            x_start -= 1;
        }
        let mut x_end = x + 1;
        while x_end < width && is_open(buffer, filled, x_end, y) {
            x_end += 1;
        }

        filled.set_span(y, x_start, x_end);
        spans.push(Span { y, x_start, x_end });

        min_x = min_x.min(x_start);
        max_x = max_x.max(x_end - 1);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        if y > 0 {
            push_open_runs(buffer, filled, &mut stack, y - 1, x_start, x_end);
        }
        if y + 1 < height {
            push_open_runs(buffer, filled, &mut stack, y + 1, x_start, x_end);
        }
    }

    Some(SpanFill {
        bounds: PixelRect::from_inclusive(min_x, min_y, max_x, max_y),
        spans,
    })
}

/// Push one seed per open run of `row` within `x_start..x_end`: only on a
/// blocked → open transition.
fn push_open_runs(
    buffer: &PixelBuffer,
    filled: &BitPlane,
    stack: &mut Vec<(u32, u32)>,
    row: u32,
    x_start: u32,
    x_end: u32,
) {
    let mut in_run = false;
    for x in x_start..x_end {
        let open = is_open(buffer, filled, x, row);
        if open && !in_run {
            stack.push((x, row));
        }
        in_run = open;
    }
}

/// On-demand fill against the live buffer.  The result covers the whole
/// image (its bounds are the image bounds).
pub fn fill_region(buffer: &PixelBuffer, x: u32, y: u32) -> Option<RegionFill> {
    let mut filled = BitPlane::new(buffer.width(), buffer.height());
    span_fill(buffer, x, y, &mut filled)?;
    Some(RegionFill::new(buffer.bounds(), filled))
}

/// Segmentation-mode fill: reached pixels are claimed in `claimed` and the
/// result is cropped to the region's tight bounding rectangle.
pub fn fill_claimed(
    buffer: &PixelBuffer,
    x: u32,
    y: u32,
    claimed: &mut BitPlane,
) -> Option<RegionFill> {
    if (claimed.width(), claimed.height()) != (buffer.width(), buffer.height()) {
        crate::log_warn!(
            "claim plane {}x{} does not match image {}x{}",
            claimed.width(),
            claimed.height(),
            buffer.width(),
            buffer.height()
        );
        return None;
    }
    let fill = span_fill(buffer, x, y, claimed)?;
    Some(RegionFill::new(fill.bounds, fill.crop()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a buffer from ASCII art: `#` is outline, anything else fillable.
    fn art(rows: &[&str]) -> PixelBuffer {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut data = vec![0u8; (width * height * 4) as usize];
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    data[(y * width as usize + x) * 4 + 3] = 255;
                }
            }
        }
        PixelBuffer::new(width, height, width as usize * 4, data).unwrap()
    }

    fn single_outline_at_five() -> PixelBuffer {
        let mut data = vec![0u8; 10 * 10 * 4];
        data[(5 * 10 + 5) * 4 + 3] = 255;
        PixelBuffer::new(10, 10, 40, data).unwrap()
    }

    #[test]
    fn open_image_with_one_outline_pixel() {
        let buffer = single_outline_at_five();
        let fill = fill_region(&buffer, 0, 0).unwrap();
        assert_eq!(fill.bounds(), PixelRect::new(0, 0, 10, 10));
        assert_eq!(fill.member_count(), 99);
        assert!(!fill.contains(5, 5));
    }

    #[test]
    fn seed_on_outline_or_outside_yields_nothing() {
        let buffer = single_outline_at_five();
        assert!(fill_region(&buffer, 5, 5).is_none());
        assert!(fill_region(&buffer, 10, 0).is_none());
        assert!(fill_region(&buffer, 0, 10).is_none());
    }

    #[test]
    fn fill_stops_at_outlines_and_tracks_bounds() {
        let buffer = art(&[
            "..........",
            ".#####....",
            ".#...#....",
            ".#...#....",
            ".#####....",
            "..........",
        ]);
        let mut claimed = BitPlane::new(10, 6);
        let inner = fill_claimed(&buffer, 3, 2, &mut claimed).unwrap();
        assert_eq!(inner.bounds(), PixelRect::new(2, 2, 3, 2));
        assert_eq!(inner.member_count(), 6);

        let outer = fill_claimed(&buffer, 0, 0, &mut claimed).unwrap();
        assert_eq!(outer.bounds(), PixelRect::new(0, 0, 10, 6));
        assert_eq!(outer.member_count(), 60 - 14 - 6);
        assert!(!outer.contains(3, 2));
    }

    #[test]
    fn already_claimed_seed_is_skipped() {
        let buffer = art(&["....", "...."]);
        let mut claimed = BitPlane::new(4, 2);
        assert!(fill_claimed(&buffer, 0, 0, &mut claimed).is_some());
        assert!(fill_claimed(&buffer, 3, 1, &mut claimed).is_none());
        assert_eq!(claimed.count_ones(), 8);
    }

    #[test]
    fn serpentine_region_is_followed_up_and_down() {
        let buffer = art(&[
            ".#...#...",
            ".#.#.#.#.",
            ".#.#.#.#.",
            "...#...#.",
        ]);
        let fill = fill_region(&buffer, 0, 0).unwrap();
        assert_eq!(fill.member_count(), buffer.fillable_count());
        assert!(fill.contains(8, 0));
    }

    #[test]
    fn diagonal_neighbours_are_not_connected() {
        let buffer = art(&[".#", "#."]);
        let fill = fill_region(&buffer, 0, 0).unwrap();
        assert_eq!(fill.member_count(), 1);
        assert!(!fill.contains(1, 1));
    }

    #[test]
    fn mismatched_claim_plane_is_refused() {
        let buffer = art(&["...", "..."]);
        let mut claimed = BitPlane::new(2, 2);
        assert!(fill_claimed(&buffer, 0, 0, &mut claimed).is_none());
    }

    #[test]
    fn large_open_area_does_not_recurse() {
        let size = 1024u32;
        let buffer =
            PixelBuffer::new(size, size, size as usize * 4, vec![0; (size * size * 4) as usize])
                .unwrap();
        let fill = fill_region(&buffer, size / 2, size / 2).unwrap();
        assert_eq!(fill.member_count(), (size * size) as usize);
    }
}
