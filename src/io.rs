use image::codecs::png::PngEncoder;
use image::{GrayImage, ImageError, ImageFormat, Luma, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canvas::PixelBuffer;
use crate::components::mask::RegionFill;
use crate::error::{CodecError, LoadError, StateError};

// ============================================================================
// RASTER PNG CODEC
// ============================================================================

/// Encode an RGBA raster as PNG bytes (baseline snapshots, exports).
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new(&mut out);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out)
}

/// Decode PNG bytes into an RGBA raster.
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8())
}

/// Decode PNG bytes and require the given dimensions.
pub fn decode_png_sized(bytes: &[u8], width: u32, height: u32) -> Result<RgbaImage, CodecError> {
    let image = decode_png(bytes)?;
    if image.dimensions() != (width, height) {
        return Err(CodecError::Dimensions {
            expected_w: width,
            expected_h: height,
            actual_w: image.width(),
            actual_h: image.height(),
        });
    }
    Ok(image)
}

// ============================================================================
// LINE ART / MASK FILES (CLI / headless mode)
// ============================================================================

/// Load already-thresholded line art.  The alpha channel is the outline
/// channel; no filtering is applied.
pub fn load_line_art(path: &Path) -> Result<PixelBuffer, LoadError> {
    let image = image::open(path)?.into_rgba8();
    Ok(PixelBuffer::from_rgba_image(&image)?)
}

/// 8-bit grayscale picture of a fill, cropped to its bounding rectangle:
/// members are white, everything else black.
pub fn fill_to_gray(fill: &RegionFill) -> GrayImage {
    let bounds = fill.bounds();
    GrayImage::from_fn(bounds.width, bounds.height, |x, y| {
        if fill.bits().get(x, y) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Write [`fill_to_gray`] as a PNG file.
pub fn write_fill_png(fill: &RegionFill, path: &Path) -> Result<(), CodecError> {
    let gray = fill_to_gray(fill);
    let file = File::create(path).map_err(ImageError::from)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(gray.as_raw(), gray.width(), gray.height(), image::ColorType::L8)?;
    Ok(())
}

// ============================================================================
// SAVED DRAWING
// ============================================================================

/// Magic tag written at the head of every saved drawing.
const SAVE_MAGIC: &str = "TPF1";

/// Everything needed to reopen a drawing: the fill mode and the current
/// raster as PNG.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedDrawing {
    magic: String,
    pub precomputed: bool,
    pub snapshot_png: Vec<u8>,
}

impl SavedDrawing {
    pub fn new(precomputed: bool, snapshot_png: Vec<u8>) -> Self {
        Self {
            magic: SAVE_MAGIC.to_string(),
            precomputed,
            snapshot_png,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        let saved: SavedDrawing = bincode::deserialize(bytes)?;
        if saved.magic != SAVE_MAGIC {
            return Err(StateError::InvalidFormat(format!(
                "Unknown magic '{}'",
                saved.magic
            )));
        }
        Ok(saved)
    }

    pub fn save(&self, path: &Path) -> Result<(), StateError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StateError> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(&raw)
    }
}
