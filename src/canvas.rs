use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::components::mask::RegionFill;
use crate::error::ConfigError;
use crate::geometry::PixelRect;

/// Alpha value that marks an outline pixel.
pub const OUTLINE_ALPHA: u8 = 255;

// ============================================================================
// PIXEL BUFFER – read-only view over the line-art raster
// ============================================================================

/// Immutable RGBA line-art raster.  Rows may be padded (`bytes_per_row`
/// larger than `width * 4`).  Cloning only bumps a reference count, so a
/// buffer can be handed to background workers freely.
#[derive(Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    pub fn new(
        width: u32,
        height: u32,
        bytes_per_row: usize,
        data: Vec<u8>,
    ) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyImage { width, height });
        }
        if bytes_per_row < width as usize * 4 {
            return Err(ConfigError::StrideTooSmall {
                width,
                bytes_per_row,
            });
        }
        // The last row only needs its pixels, not its padding.
        let expected = bytes_per_row * (height as usize - 1) + width as usize * 4;
        if data.len() < expected {
            return Err(ConfigError::BufferTooShort {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            bytes_per_row,
            data: data.into(),
        })
    }

    /// Wrap a tightly packed `RgbaImage`.
    pub fn from_rgba_image(image: &RgbaImage) -> Result<Self, ConfigError> {
        Self::new(
            image.width(),
            image.height(),
            image.width() as usize * 4,
            image.as_raw().clone(),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Full-image rectangle.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    pub fn in_bounds(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    #[inline(always)]
    pub fn alpha(&self, x: u32, y: u32) -> u8 {
        self.data[self.bytes_per_row * y as usize + x as usize * 4 + 3]
    }

    /// Outline pixels are fully opaque; everything else is fillable.
    #[inline(always)]
    pub fn is_outline(&self, x: u32, y: u32) -> bool {
        self.alpha(x, y) == OUTLINE_ALPHA
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        let o = self.bytes_per_row * y as usize + x as usize * 4;
        Rgba([
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ])
    }

    /// Number of fillable pixels in the whole buffer.
    pub fn fillable_count(&self) -> usize {
        let mut count = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                if !self.is_outline(x, y) {
                    count += 1;
                }
            }
        }
        count
    }
}

// ============================================================================
// BIT PLANE – packed bi-level bitmap (claim plane and mask bits)
// ============================================================================

/// Packed 1-bit-per-pixel bitmap, rows padded to whole bytes, most
/// significant bit first.  This is the same layout as a 1-bit grayscale PNG
/// scanline, so masks encode and decode without repacking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitPlane {
    width: u32,
    height: u32,
    stride: usize,
    bytes: Vec<u8>,
}

impl BitPlane {
    pub fn new(width: u32, height: u32) -> Self {
        let stride = (width as usize).div_ceil(8);
        Self {
            width,
            height,
            stride,
            bytes: vec![0; stride * height as usize],
        }
    }

    /// Adopt already packed rows.  `None` when `bytes` has the wrong length.
    pub fn from_packed(width: u32, height: u32, bytes: Vec<u8>) -> Option<Self> {
        let stride = (width as usize).div_ceil(8);
        if bytes.len() != stride * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            stride,
            bytes,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per packed row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn packed(&self) -> &[u8] {
        &self.bytes
    }

    #[inline(always)]
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.bytes[y as usize * self.stride + (x / 8) as usize];
        byte & (0x80 >> (x % 8)) != 0
    }

    #[inline(always)]
    pub fn set(&mut self, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.bytes[y as usize * self.stride + (x / 8) as usize] |= 0x80 >> (x % 8);
    }

    #[inline(always)]
    pub fn unset(&mut self, x: u32, y: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.bytes[y as usize * self.stride + (x / 8) as usize] &= !(0x80 >> (x % 8));
    }

    /// Set `x_start..x_end` on row `y`.
    pub fn set_span(&mut self, y: u32, x_start: u32, x_end: u32) {
        for x in x_start..x_end.min(self.width) {
            self.set(x, y);
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> usize {
        let mut count = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    count += 1;
                }
            }
        }
        count
    }
}

// ============================================================================
// RASTER – the persistent colouring surface
// ============================================================================

/// The persistent RGBA surface strokes are composited onto, plus the active
/// clip.  While a clip is installed nothing outside its region is touched.
pub struct Raster {
    pixels: RgbaImage,
    clip: Option<Arc<RegionFill>>,
}

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            clip: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width(), self.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Make every pixel transparent.  The clip is left alone.
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Replace the whole surface with `image` (used to lay down a baseline).
    /// Returns `false` when the dimensions disagree.
    pub fn replace_with(&mut self, image: RgbaImage) -> bool {
        if image.dimensions() != self.pixels.dimensions() {
            return false;
        }
        self.pixels = image;
        true
    }

    pub fn set_clip(&mut self, clip: Arc<RegionFill>) {
        self.clip = Some(clip);
    }

    pub fn reset_clip(&mut self) {
        self.clip = None;
    }

    pub fn clip(&self) -> Option<&Arc<RegionFill>> {
        self.clip.as_ref()
    }

    /// Composite `color` wherever `coverage` is set.  `coverage` is positioned
    /// at `origin` in raster coordinates; the active clip gates every pixel.
    pub fn composite_coverage(&mut self, origin: PixelRect, coverage: &BitPlane, color: Rgba<u8>) {
        let Some(area) = origin.intersection(&self.bounds()) else {
            return;
        };
        let area = match &self.clip {
            Some(clip) => match area.intersection(&clip.bounds()) {
                Some(a) => a,
                None => return,
            },
            None => area,
        };
        for gy in area.y..area.bottom() {
            for gx in area.x..area.right() {
                if !coverage.get(gx - origin.x, gy - origin.y) {
                    continue;
                }
                if let Some(clip) = &self.clip {
                    if !clip.contains(gx, gy) {
                        continue;
                    }
                }
                let dst = self.pixels.get_pixel_mut(gx, gy);
                *dst = blend_normal(*dst, color);
            }
        }
    }
}

/// Source-over blend of straight-alpha colours.
pub fn blend_normal(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    // Fast paths: transparent top leaves base, opaque top overwrites
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 {
        return top;
    }

    let top_a = top[3] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let c = (t * top_a + b * base_a * (1.0 - top_a)) / out_a;
        (c * 255.0).round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}
