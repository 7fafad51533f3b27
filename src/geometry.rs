//! View-space (`Point`, `Rect`) and image-space (`PixelRect`) geometry.

/// A 2D position in view units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        self.distance_squared(other).sqrt()
    }

    pub fn distance_squared(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn scaled(self, scale: f32) -> Point {
        Point::new(self.x * scale, self.y * scale)
    }

    /// Image pixel containing this point after scaling, or `None` when it
    /// falls outside `width × height`.
    pub fn to_pixel(self, scale: f32, width: u32, height: u32) -> Option<(u32, u32)> {
        let px = (self.x * scale).floor();
        let py = (self.y * scale).floor();
        if px < 0.0 || py < 0.0 || px >= width as f32 || py >= height as f32 {
            return None;
        }
        Some((px as u32, py as u32))
    }
}

/// Axis-aligned float rectangle in view units (`min` inclusive, `max` exclusive).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn from_min_max(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Square of side `size` centred on `center`.
    pub fn from_center_size(center: Point, size: f32) -> Self {
        let half = size / 2.0;
        Self {
            min: Point::new(center.x - half, center.y - half),
            max: Point::new(center.x + half, center.y + half),
        }
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    pub fn union(self, other: Rect) -> Rect {
        Rect {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x < self.max.x && p.y >= self.min.y && p.y < self.max.y
    }

    /// Covering pixel rectangle after scaling, clamped to `width × height`.
    /// `None` when nothing of the rect lies inside the image.
    pub fn to_pixel_rect(&self, scale: f32, width: u32, height: u32) -> Option<PixelRect> {
        let x0 = (self.min.x * scale).floor().max(0.0);
        let y0 = (self.min.y * scale).floor().max(0.0);
        let x1 = (self.max.x * scale).ceil().min(width as f32);
        let y1 = (self.max.y * scale).ceil().min(height as f32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

/// Integer rectangle in full-image pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build from inclusive corner coordinates.
    pub fn from_inclusive(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn intersects(&self, other: &PixelRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    pub fn intersection(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect::new(x0, y0, x1 - x0, y1 - y0))
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        PixelRect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// View-space rect covering these pixels.
    pub fn to_view_rect(&self, scale: f32) -> Rect {
        Rect::from_min_max(
            Point::new(self.x as f32 / scale, self.y as f32 / scale),
            Point::new(self.right() as f32 / scale, self.bottom() as f32 / scale),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_rect_contains_is_half_open() {
        let rect = PixelRect::new(0, 0, 4, 4);
        assert!(rect.contains(0, 0));
        assert!(rect.contains(3, 0));
        assert!(!rect.contains(4, 0));
        assert!(!rect.contains(0, 4));
    }

    #[test]
    fn pixel_rect_intersection_and_union() {
        let a = PixelRect::new(0, 0, 5, 5);
        let b = PixelRect::new(3, 3, 5, 5);
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b), Some(PixelRect::new(3, 3, 2, 2)));
        assert_eq!(a.union(&b), PixelRect::new(0, 0, 8, 8));

        let c = PixelRect::new(5, 0, 2, 2);
        assert!(!a.intersects(&c));
        assert_eq!(a.intersection(&c), None);
    }

    #[test]
    fn rect_to_pixel_rect_clamps_to_image() {
        let r = Rect::from_center_size(Point::new(1.0, 1.0), 6.0);
        assert_eq!(r.to_pixel_rect(1.0, 10, 10), Some(PixelRect::new(0, 0, 4, 4)));
        let outside = Rect::from_center_size(Point::new(-20.0, -20.0), 4.0);
        assert_eq!(outside.to_pixel_rect(1.0, 10, 10), None);
    }

    #[test]
    fn point_to_pixel_respects_scale_and_bounds() {
        assert_eq!(Point::new(2.6, 3.2).to_pixel(2.0, 10, 10), Some((5, 6)));
        assert_eq!(Point::new(5.0, 1.0).to_pixel(2.0, 10, 10), None);
        assert_eq!(Point::new(-0.5, 1.0).to_pixel(1.0, 10, 10), None);
    }
}
