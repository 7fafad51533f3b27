use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use image::RgbaImage;

use crate::canvas::Raster;
use crate::components::mask::RegionFill;
use crate::components::stroke::Stroke;
use crate::error::CodecError;
use crate::geometry::Point;
use crate::{log_err, log_info, log_warn};

// ============================================================================
// HISTORY ENTRY – a committed stroke plus the region it was clipped to
// ============================================================================

/// A committed stroke together with the fill that clipped it, so replay
/// never has to query the region again.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub stroke: Stroke,
    pub clip: Arc<RegionFill>,
}

impl HistoryEntry {
    pub fn new(stroke: Stroke, clip: Arc<RegionFill>) -> Self {
        Self { stroke, clip }
    }

    /// Draw the stroke clipped to its region, then drop the clip again.
    pub fn render(&self, raster: &mut Raster, scale: f32) {
        raster.set_clip(Arc::clone(&self.clip));
        self.stroke.render(raster, scale);
        raster.reset_clip();
    }

    pub fn memory_size(&self) -> usize {
        self.stroke.points().len() * std::mem::size_of::<Point>()
    }
}

// ============================================================================
// BASELINE – compressed raster holding every compacted stroke
// ============================================================================

/// Turns a compacted raster into baseline bytes.
pub type SnapshotEncoder = fn(&RgbaImage) -> Result<Vec<u8>, CodecError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Baseline {
    png: Vec<u8>,
}

impl Baseline {
    pub fn capture(image: &RgbaImage, encode: SnapshotEncoder) -> Result<Self, CodecError> {
        Ok(Self { png: encode(image)? })
    }

    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    pub fn png(&self) -> &[u8] {
        &self.png
    }

    pub fn decode(&self, width: u32, height: u32) -> Result<RgbaImage, CodecError> {
        crate::io::decode_png_sized(&self.png, width, height)
    }
}

// ============================================================================
// STROKE HISTORY
// ============================================================================

/// When to compact and how many of the newest strokes stay undoable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactionPolicy {
    /// Compact once the log holds more than this many strokes
    pub threshold: usize,
    /// Newest strokes left in the log after compacting
    pub retain: usize,
}

impl CompactionPolicy {
    pub const fn new(threshold: usize, retain: usize) -> Self {
        Self { threshold, retain }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryState {
    /// No open stroke
    Idle,
    /// A gesture is extending an open stroke
    Recording,
    /// Baseline rebuild in progress
    Compacting,
}

/// Chronological stroke log, redo log and optional baseline snapshot.
pub struct StrokeHistory {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: VecDeque<HistoryEntry>,
    baseline: Option<Baseline>,
    state: HistoryState,
    policy: CompactionPolicy,
    /// Running point memory across both stacks.
    total_memory: usize,
    encoder: SnapshotEncoder,
}

impl StrokeHistory {
    pub fn new(policy: CompactionPolicy) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            baseline: None,
            state: HistoryState::Idle,
            policy,
            total_memory: 0,
            encoder: crate::io::encode_png,
        }
    }

    /// Replace the PNG encoder used for compaction snapshots.
    pub fn set_encoder(&mut self, encoder: SnapshotEncoder) {
        self.encoder = encoder;
    }

    pub fn state(&self) -> HistoryState {
        self.state
    }

    pub fn policy(&self) -> CompactionPolicy {
        self.policy
    }

    /// A gesture opened a new stroke: the redo log is no longer reachable.
    pub fn begin_recording(&mut self) {
        if self.state == HistoryState::Compacting {
            return;
        }
        self.clear_redo();
        self.state = HistoryState::Recording;
    }

    /// The open stroke was abandoned without being committed.
    pub fn cancel_recording(&mut self) {
        if self.state == HistoryState::Recording {
            self.state = HistoryState::Idle;
        }
    }

    /// Append a finished stroke.  Always clears the redo log.
    pub fn commit(&mut self, entry: HistoryEntry) {
        self.clear_redo();
        self.total_memory += entry.memory_size();
        self.undo_stack.push_back(entry);
        self.state = HistoryState::Idle;
    }

    /// Move the newest stroke to the redo log and rebuild `raster`.
    /// Only allowed while idle.
    pub fn undo(&mut self, raster: &mut Raster, scale: f32) -> bool {
        if self.state != HistoryState::Idle {
            return false;
        }
        let Some(entry) = self.undo_stack.pop_back() else {
            return false;
        };
        self.redo_stack.push_back(entry);
        self.replay(raster, scale);
        true
    }

    /// Move the newest redo stroke back into the log and rebuild `raster`.
    /// Only allowed while idle.
    pub fn redo(&mut self, raster: &mut Raster, scale: f32) -> bool {
        if self.state != HistoryState::Idle {
            return false;
        }
        let Some(entry) = self.redo_stack.pop_back() else {
            return false;
        };
        self.undo_stack.push_back(entry);
        self.replay(raster, scale);
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Committed strokes, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.undo_stack.iter()
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    /// Install a restored snapshot as the starting point of the log.
    pub fn set_baseline(&mut self, baseline: Baseline) {
        self.baseline = Some(baseline);
    }

    /// Point memory of both logs plus the compressed baseline.
    pub fn memory_usage(&self) -> usize {
        self.total_memory + self.baseline.as_ref().map_or(0, |b| b.png.len())
    }

    /// Drop every stroke, the redo log and the baseline.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.baseline = None;
        self.total_memory = 0;
        self.state = HistoryState::Idle;
    }

    /// Rebuild `raster` from scratch: baseline first, then every committed
    /// stroke under its own clip.
    pub fn replay(&self, raster: &mut Raster, scale: f32) {
        let start = Instant::now();
        self.render_into(raster, scale, self.undo_stack.len());
        log_info!(
            "Replayed {} strokes{} in {} ms",
            self.undo_stack.len(),
            if self.baseline.is_some() { " over baseline" } else { "" },
            start.elapsed().as_millis()
        );
    }

    /// Fold all but the newest `retain` strokes into a new baseline once the
    /// log exceeds the threshold.  The folded strokes can no longer be undone.
    /// Returns whether compaction happened; on encode failure the history is
    /// left exactly as it was and compaction is retried at the next commit.
    pub fn maybe_compact(&mut self, width: u32, height: u32, scale: f32) -> bool {
        if self.state != HistoryState::Idle || self.undo_stack.len() <= self.policy.threshold {
            return false;
        }
        self.state = HistoryState::Compacting;
        let start = Instant::now();

        let fold = self.undo_stack.len() - self.policy.retain.min(self.undo_stack.len());
        let mut scratch = Raster::new(width, height);
        self.render_into(&mut scratch, scale, fold);

        let compacted = match Baseline::capture(scratch.image(), self.encoder) {
            Ok(baseline) => {
                for entry in self.undo_stack.drain(..fold) {
                    self.total_memory = self.total_memory.saturating_sub(entry.memory_size());
                }
                self.baseline = Some(baseline);
                log_info!(
                    "Compacted {} strokes into baseline ({} kept, {} bytes) in {} ms",
                    fold,
                    self.undo_stack.len(),
                    self.baseline.as_ref().map_or(0, |b| b.png.len()),
                    start.elapsed().as_millis()
                );
                true
            }
            Err(e) => {
                log_warn!("Compaction skipped, baseline encode failed: {}", e);
                false
            }
        };
        self.state = HistoryState::Idle;
        compacted
    }

    /// Baseline plus the oldest `count` strokes onto a cleared `raster`.
    fn render_into(&self, raster: &mut Raster, scale: f32, count: usize) {
        raster.reset_clip();
        raster.clear();
        if let Some(baseline) = &self.baseline {
            match baseline.decode(raster.width(), raster.height()) {
                Ok(image) => {
                    raster.replace_with(image);
                }
                Err(e) => {
                    log_err!("Baseline snapshot could not be decoded: {}", e);
                }
            }
        }
        for entry in self.undo_stack.iter().take(count) {
            entry.render(raster, scale);
        }
    }

    fn clear_redo(&mut self) {
        for entry in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(entry.memory_size());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BitPlane;
    use crate::components::stroke::StrokeStyle;
    use crate::geometry::PixelRect;
    use image::Rgba;

    const SIZE: u32 = 32;

    /// Clip covering the left or right half of the raster.
    fn half(left: bool) -> Arc<RegionFill> {
        let x = if left { 0 } else { SIZE / 2 };
        let bounds = PixelRect::new(x, 0, SIZE / 2, SIZE);
        let mut bits = BitPlane::new(bounds.width, bounds.height);
        for y in 0..bounds.height {
            bits.set_span(y, 0, bounds.width);
        }
        Arc::new(RegionFill::new(bounds, bits))
    }

    fn entry(i: u32) -> HistoryEntry {
        // Every third stroke is translucent so overlaps blend
        let alpha = if i % 3 == 1 { 140 } else { 255 };
        let color = Rgba([(i * 37 % 256) as u8, (i * 11 % 256) as u8, 200, alpha]);
        let mut stroke = Stroke::new(StrokeStyle::new(color, 3.0));
        let y = (i * 3 % SIZE) as f32;
        stroke.add_point(Point::new(2.0, y));
        stroke.add_point(Point::new(30.0, (y + 7.0) % SIZE as f32));
        HistoryEntry::new(stroke, half(i % 2 == 0))
    }

    fn replayed(history: &StrokeHistory) -> RgbaImage {
        let mut raster = Raster::new(SIZE, SIZE);
        history.replay(&mut raster, 1.0);
        raster.image().clone()
    }

    #[test]
    fn clip_keeps_paint_inside_the_region() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(100, 0));
        history.commit(entry(0));
        let image = replayed(&history);
        assert!(image.get_pixel(8, 2)[3] > 0);
        for y in 0..SIZE {
            for x in SIZE / 2..SIZE {
                assert_eq!(image.get_pixel(x, y)[3], 0);
            }
        }
    }

    #[test]
    fn undo_then_redo_restores_the_raster() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(100, 0));
        let mut raster = Raster::new(SIZE, SIZE);
        for i in 0..5 {
            history.commit(entry(i));
        }
        let before = replayed(&history);
        for _ in 0..5 {
            assert!(history.undo(&mut raster, 1.0));
        }
        assert!(!history.can_undo());
        assert!(raster.image().pixels().all(|p| p[3] == 0));
        for _ in 0..5 {
            assert!(history.redo(&mut raster, 1.0));
        }
        assert!(!history.can_redo());
        assert_eq!(raster.image(), &before);
    }

    #[test]
    fn new_strokes_clear_the_redo_log() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(100, 0));
        let mut raster = Raster::new(SIZE, SIZE);
        history.commit(entry(0));
        history.commit(entry(1));
        history.undo(&mut raster, 1.0);
        assert!(history.can_redo());
        history.begin_recording();
        assert!(!history.can_redo());
        assert_eq!(history.state(), HistoryState::Recording);
        // Undo is refused while recording
        assert!(!history.undo(&mut raster, 1.0));
        history.commit(entry(2));
        assert_eq!(history.state(), HistoryState::Idle);
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn compaction_preserves_the_rendered_result() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(6, 2));
        for i in 0..6 {
            history.commit(entry(i));
            assert!(!history.maybe_compact(SIZE, SIZE, 1.0));
        }
        history.commit(entry(6));
        let before = replayed(&history);

        assert!(history.maybe_compact(SIZE, SIZE, 1.0));
        assert_eq!(history.undo_count(), 2);
        assert!(history.baseline().is_some());
        assert_eq!(replayed(&history), before);
    }

    #[test]
    fn compaction_without_retained_strokes() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(3, 0));
        for i in 0..4 {
            history.commit(entry(i));
        }
        let before = replayed(&history);
        assert!(history.maybe_compact(SIZE, SIZE, 1.0));
        assert!(!history.can_undo());
        assert_eq!(replayed(&history), before);

        // A second round folds over the existing baseline
        for i in 4..8 {
            history.commit(entry(i));
        }
        let before = replayed(&history);
        assert!(history.maybe_compact(SIZE, SIZE, 1.0));
        assert_eq!(replayed(&history), before);
    }

    fn failing_encoder(_: &RgbaImage) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::Layout("encoder unavailable".into()))
    }

    #[test]
    fn failed_compaction_leaves_history_untouched() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(3, 1));
        history.set_encoder(failing_encoder);
        for i in 0..5 {
            history.commit(entry(i));
        }
        let before = replayed(&history);
        let memory = history.memory_usage();

        assert!(!history.maybe_compact(SIZE, SIZE, 1.0));
        assert_eq!(history.undo_count(), 5);
        assert!(history.baseline().is_none());
        assert_eq!(history.state(), HistoryState::Idle);
        assert_eq!(history.memory_usage(), memory);
        assert_eq!(replayed(&history), before);

        // Retried on the next commit once encoding works again
        history.set_encoder(crate::io::encode_png);
        history.commit(entry(5));
        let before = replayed(&history);
        assert!(history.maybe_compact(SIZE, SIZE, 1.0));
        assert_eq!(history.undo_count(), 1);
        assert_eq!(replayed(&history), before);
    }

    #[test]
    fn compaction_waits_while_recording() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(1, 0));
        history.commit(entry(0));
        history.commit(entry(1));
        history.begin_recording();
        assert!(!history.maybe_compact(SIZE, SIZE, 1.0));
        history.cancel_recording();
        assert!(history.maybe_compact(SIZE, SIZE, 1.0));
    }

    #[test]
    fn clear_drops_everything() {
        let mut history = StrokeHistory::new(CompactionPolicy::new(1, 0));
        let mut raster = Raster::new(SIZE, SIZE);
        history.commit(entry(0));
        history.commit(entry(1));
        history.maybe_compact(SIZE, SIZE, 1.0);
        history.commit(entry(2));
        history.undo(&mut raster, 1.0);
        history.clear();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.baseline().is_none());
        assert_eq!(history.memory_usage(), 0);
    }
}
