use std::sync::atomic::{AtomicU64, Ordering};

use image::Rgba;

use crate::canvas::{BitPlane, Raster};
use crate::geometry::{PixelRect, Point, Rect};
use crate::settings::ColoringSettings;

/// Points closer than this (view units) to the previous point are dropped.
pub const MIN_POINT_SPACING: f32 = 1.0;
/// Extra size added to the line width when computing a point's dab rect.
pub const DAB_PADDING: f32 = 4.0;

static NEXT_STROKE_ID: AtomicU64 = AtomicU64::new(0);

/// Paint attributes captured when a gesture begins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub color: Rgba<u8>,
    /// Line width in view units.
    pub width: f32,
}

impl StrokeStyle {
    pub fn new(color: Rgba<u8>, width: f32) -> Self {
        Self { color, width }
    }

    pub fn from_settings(settings: &ColoringSettings) -> Self {
        Self::new(Rgba(settings.stroke_color), settings.stroke_width)
    }
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self::new(Rgba([0, 0, 0, 255]), 5.0)
    }
}

/// One freehand stroke: input-ordered points, paint attributes, the union of
/// its dab rects, and a cursor marking what has already been drawn.
#[derive(Clone, Debug)]
pub struct Stroke {
    id: u64,
    points: Vec<Point>,
    style: StrokeStyle,
    bounds: Option<Rect>,
    last_drawn: Option<usize>,
    /// Raster-sized coverage already composited by `draw_since_last`, so
    /// batch joints are never blended twice.
    painted: Option<BitPlane>,
}

impl Stroke {
    /// Ids are unique for the lifetime of the process and strictly increasing.
    pub fn new(style: StrokeStyle) -> Self {
        Self {
            id: NEXT_STROKE_ID.fetch_add(1, Ordering::Relaxed),
            points: Vec::new(),
            style,
            bounds: None,
            last_drawn: None,
            painted: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn style(&self) -> StrokeStyle {
        self.style
    }

    /// Union of the dab rects of every recorded point.
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Record `point` unless it lies within [`MIN_POINT_SPACING`] of the last
    /// recorded point.  Returns whether it was kept.
    pub fn add_point(&mut self, point: Point) -> bool {
        if let Some(last) = self.points.last() {
            if last.distance(point) < MIN_POINT_SPACING {
                return false;
            }
        }
        let dab = self.dab_rect(point);
        self.bounds = Some(match self.bounds {
            Some(existing) => existing.union(dab),
            None => dab,
        });
        self.points.push(point);
        true
    }

    /// Square centred on `point`, sized to line width plus padding.
    pub fn dab_rect(&self, point: Point) -> Rect {
        Rect::from_center_size(point, self.style.width + DAB_PADDING)
    }

    /// Draw the whole stroke onto `raster` (honouring its clip).
    pub fn render(&self, raster: &mut Raster, scale: f32) {
        self.render_points(&self.points, raster, scale);
    }

    /// Draw only the points added since the previous call, starting from the
    /// last drawn point so consecutive segments join up.  Returns the
    /// view-space rect touched, or `None` when there was nothing new.
    pub fn draw_since_last(&mut self, raster: &mut Raster, scale: f32) -> Option<Rect> {
        let end = self.points.len().checked_sub(1)?;
        if self.last_drawn == Some(end) {
            return None;
        }
        let start = self.last_drawn.unwrap_or(0);
        self.last_drawn = Some(end);

        let segment = &self.points[start..=end];
        let mut update: Option<Rect> = None;
        for &point in segment {
            let dab = self.dab_rect(point);
            update = Some(match update {
                Some(r) => r.union(dab),
                None => dab,
            });
        }
        let Some((origin, mut coverage)) =
            rasterize(segment, self.style.width, scale, raster.width(), raster.height())
        else {
            return update;
        };

        let stale = self.painted.as_ref().is_none_or(|p| {
            p.width() != raster.width() || p.height() != raster.height()
        });
        if stale {
            self.painted = Some(BitPlane::new(raster.width(), raster.height()));
        }
        let Some(painted) = self.painted.as_mut() else {
            return update;
        };
        for y in 0..origin.height {
            for x in 0..origin.width {
                if !coverage.get(x, y) {
                    continue;
                }
                let (gx, gy) = (origin.x + x, origin.y + y);
                if painted.get(gx, gy) {
                    coverage.unset(x, y);
                } else {
                    painted.set(gx, gy);
                }
            }
        }
        raster.composite_coverage(origin, &coverage, self.style.color);
        update
    }

    /// Forget the draw cursor and the painted coverage so the next
    /// [`Stroke::draw_since_last`] redraws every point.  Finished strokes
    /// call this to release the coverage plane.
    pub fn reset_drawn(&mut self) {
        self.last_drawn = None;
        self.painted = None;
    }

    fn render_points(&self, points: &[Point], raster: &mut Raster, scale: f32) {
        if let Some((origin, coverage)) =
            rasterize(points, self.style.width, scale, raster.width(), raster.height())
        {
            raster.composite_coverage(origin, &coverage, self.style.color);
        }
    }
}

/// Hard-edged coverage of a round-capped polyline, in image pixels.
/// The coverage is accumulated first and composited once so a translucent
/// stroke does not darken where its own dabs overlap.
fn rasterize(
    points: &[Point],
    width: f32,
    scale: f32,
    raster_w: u32,
    raster_h: u32,
) -> Option<(PixelRect, BitPlane)> {
    let first = points.first()?.scaled(scale);
    let radius = (width * scale / 2.0).max(0.5);

    let mut extent = Rect::from_center_size(first, 2.0 * radius + 2.0);
    for p in &points[1..] {
        extent = extent.union(Rect::from_center_size(p.scaled(scale), 2.0 * radius + 2.0));
    }
    let origin = extent.to_pixel_rect(1.0, raster_w, raster_h)?;
    let mut coverage = BitPlane::new(origin.width, origin.height);

    if points.len() == 1 {
        stamp_circle(&mut coverage, origin, first, radius);
        return Some((origin, coverage));
    }

    for pair in points.windows(2) {
        let start = pair[0].scaled(scale);
        let end = pair[1].scaled(scale);
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 0.1 {
            stamp_circle(&mut coverage, origin, start, radius);
            continue;
        }
        // Dense one-pixel stepping for a continuous line
        let steps = distance.ceil() as usize;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            stamp_circle(
                &mut coverage,
                origin,
                Point::new(start.x + dx * t, start.y + dy * t),
                radius,
            );
        }
    }
    Some((origin, coverage))
}

fn stamp_circle(coverage: &mut BitPlane, origin: PixelRect, center: Point, radius: f32) {
    let radius_sq = radius * radius;
    let min_x = (center.x - radius).floor().max(origin.x as f32) as u32;
    let min_y = (center.y - radius).floor().max(origin.y as f32) as u32;
    let max_x = ((center.x + radius).ceil()).min(origin.right() as f32);
    let max_y = ((center.y + radius).ceil()).min(origin.bottom() as f32);
    if max_x <= min_x as f32 || max_y <= min_y as f32 {
        return;
    }
    for py in min_y..max_y as u32 {
        let fy = py as f32 + 0.5 - center.y;
        for px in min_x..max_x as u32 {
            let fx = px as f32 + 0.5 - center.x;
            if fx * fx + fy * fy <= radius_sq {
                coverage.set(px - origin.x, py - origin.y);
            }
        }
    }
}
