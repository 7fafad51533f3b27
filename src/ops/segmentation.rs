// ============================================================================
// SEGMENTATION – one-time precomputation of every enclosed region
// ============================================================================

use std::sync::{Arc, mpsc};
use std::time::Instant;

use rayon::prelude::*;

use crate::canvas::{BitPlane, PixelBuffer};
use crate::components::mask::{RegionFill, RegionMask};
use crate::components::spatial_index::SpatialIndex;
use crate::error::CodecError;
use crate::ops::flood_fill::fill_claimed;
use crate::{log_info, log_warn};

/// Diagnostics from one segmentation run.  Not needed for correctness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentationReport {
    pub mask_count: usize,
    /// Cropped mask sizes at one byte per pixel.
    pub raw_bytes: usize,
    pub compressed_bytes: usize,
    pub elapsed_ms: u128,
}

/// What a background segmentation job delivers.
pub type SegmentationOutcome = Result<(Arc<SpatialIndex>, SegmentationReport), CodecError>;

/// Walk `buffer` in raster order and turn every unclaimed fillable pixel
/// into a new region, so each fillable pixel ends up in exactly one mask.
/// Region discovery is sequential (the claim plane is shared); compression
/// runs in parallel.  Masks are registered in discovery order.
pub fn segment(
    buffer: &PixelBuffer,
    x_divisions: u32,
    y_divisions: u32,
) -> Result<(SpatialIndex, SegmentationReport), CodecError> {
    let start = Instant::now();
    let mut claimed = BitPlane::new(buffer.width(), buffer.height());
    let mut regions: Vec<RegionFill> = Vec::new();

    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            if claimed.get(x, y) || buffer.is_outline(x, y) {
                continue;
            }
            if let Some(region) = fill_claimed(buffer, x, y, &mut claimed) {
                regions.push(region);
            }
        }
    }

    let masks = regions
        .par_iter()
        .map(|region| RegionMask::encode(region.bounds(), region.bits()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut index = SpatialIndex::new(buffer.bounds(), x_divisions, y_divisions);
    let mut report = SegmentationReport::default();
    for mask in masks {
        report.raw_bytes += mask.raw_len();
        report.compressed_bytes += mask.compressed_len();
        index.register(mask);
    }
    report.mask_count = index.mask_count();
    report.elapsed_ms = start.elapsed().as_millis();

    log_info!(
        "Segmented {}x{} into {} masks: {} raw bytes, {} compressed, {} ms",
        buffer.width(),
        buffer.height(),
        report.mask_count,
        report.raw_bytes,
        report.compressed_bytes,
        report.elapsed_ms
    );
    Ok((index, report))
}

/// Run [`segment`] on the rayon pool.  Exactly one outcome is sent unless
/// the job panics, in which case the receiver sees a disconnect.
pub fn spawn_segmentation(
    buffer: PixelBuffer,
    x_divisions: u32,
    y_divisions: u32,
) -> mpsc::Receiver<SegmentationOutcome> {
    let (sender, receiver) = mpsc::channel();
    rayon::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            segment(&buffer, x_divisions, y_divisions)
        }));
        match result {
            Ok(outcome) => {
                let _ = sender.send(outcome.map(|(index, report)| (Arc::new(index), report)));
            }
            Err(panic_info) => {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic payload".to_string()
                };
                log_warn!("Segmentation job panicked: {}", msg);
            }
        }
    });
    receiver
}
