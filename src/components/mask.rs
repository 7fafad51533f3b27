use std::io::Cursor;

use crate::canvas::BitPlane;
use crate::error::CodecError;
use crate::geometry::PixelRect;

// ============================================================================
// REGION FILL – decoded, ready-to-clip mask
// ============================================================================

/// A decoded fill mask: `bits` is sized to `bounds` and addressed in
/// bounds-local coordinates.  This is what the raster clips against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionFill {
    bounds: PixelRect,
    bits: BitPlane,
}

impl RegionFill {
    pub fn new(bounds: PixelRect, bits: BitPlane) -> Self {
        debug_assert_eq!((bits.width(), bits.height()), (bounds.width, bounds.height));
        Self { bounds, bits }
    }

    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn bits(&self) -> &BitPlane {
        &self.bits
    }

    /// Membership test in full-image coordinates.  Points outside the
    /// bounding rectangle are never members.
    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.bounds.contains(x, y) && self.bits.get(x - self.bounds.x, y - self.bounds.y)
    }

    /// Number of member pixels.
    pub fn member_count(&self) -> usize {
        self.bits.count_ones()
    }
}

// ============================================================================
// REGION MASK – compressed, immutable, shared by the spatial index
// ============================================================================

/// One enclosed region: its bounding rectangle plus the cropped bitmap,
/// stored as a 1-bit grayscale PNG.
#[derive(Clone, Debug)]
pub struct RegionMask {
    bounds: PixelRect,
    encoded: Vec<u8>,
}

impl RegionMask {
    /// Compress `bits` (sized to `bounds`).
    pub fn encode(bounds: PixelRect, bits: &BitPlane) -> Result<Self, CodecError> {
        if (bits.width(), bits.height()) != (bounds.width, bounds.height) {
            return Err(CodecError::Dimensions {
                expected_w: bounds.width,
                expected_h: bounds.height,
                actual_w: bits.width(),
                actual_h: bits.height(),
            });
        }
        Ok(Self {
            bounds,
            encoded: encode_bits(bits)?,
        })
    }

    /// Wrap bytes that are already encoded.  Nothing is validated until
    /// [`RegionMask::decode`].
    pub fn from_encoded(bounds: PixelRect, encoded: Vec<u8>) -> Self {
        Self { bounds, encoded }
    }

    pub fn bounds(&self) -> PixelRect {
        self.bounds
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn compressed_len(&self) -> usize {
        self.encoded.len()
    }

    /// Uncompressed size of this mask: its bounding rectangle at one byte
    /// per pixel.  Not the full image size; masks are stored cropped.
    pub fn raw_len(&self) -> usize {
        self.bounds.area()
    }

    /// Bounding-rectangle containment only; necessary but not sufficient for
    /// membership.
    pub fn bounds_contain(&self, x: u32, y: u32) -> bool {
        self.bounds.contains(x, y)
    }

    /// Squared distance from the bounding rectangle's origin to `(x, y)`.
    pub fn squared_distance_from_origin(&self, x: u32, y: u32) -> f32 {
        let dx = x as f32 - self.bounds.x as f32;
        let dy = y as f32 - self.bounds.y as f32;
        dx * dx + dy * dy
    }

    pub fn decode(&self) -> Result<RegionFill, CodecError> {
        let bits = decode_bits(&self.encoded, self.bounds.width, self.bounds.height)?;
        Ok(RegionFill::new(self.bounds, bits))
    }
}

fn encode_bits(bits: &BitPlane) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, bits.width(), bits.height());
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::One);
        encoder.set_compression(png::Compression::Best);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(bits.packed())?;
        writer.finish()?;
    }
    Ok(out)
}

fn decode_bits(bytes: &[u8], width: u32, height: u32) -> Result<BitPlane, CodecError> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut buf)?;

    if info.width != width || info.height != height {
        return Err(CodecError::Dimensions {
            expected_w: width,
            expected_h: height,
            actual_w: info.width,
            actual_h: info.height,
        });
    }
    if info.color_type != png::ColorType::Grayscale || info.bit_depth != png::BitDepth::One {
        return Err(CodecError::Layout(format!(
            "{:?} at {:?}",
            info.color_type, info.bit_depth
        )));
    }

    let stride = (width as usize).div_ceil(8);
    if info.line_size != stride {
        return Err(CodecError::Layout(format!(
            "line size {} for width {}",
            info.line_size, width
        )));
    }
    buf.truncate(stride * height as usize);
    BitPlane::from_packed(width, height, buf)
        .ok_or_else(|| CodecError::Layout("truncated mask data".to_string()))
}
