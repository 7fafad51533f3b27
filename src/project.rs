use std::sync::{Arc, mpsc};

use crate::canvas::{PixelBuffer, Raster};
use crate::components::history::{Baseline, HistoryEntry, StrokeHistory};
use crate::components::mask::RegionFill;
use crate::components::spatial_index::SpatialIndex;
use crate::components::stroke::{Stroke, StrokeStyle};
use crate::error::{CodecError, ConfigError, LoadError};
use crate::geometry::{Point, Rect};
use crate::io::SavedDrawing;
use crate::ops::region_query::query_fill;
use crate::ops::segmentation::{SegmentationOutcome, spawn_segmentation};
use crate::settings::ColoringSettings;
use crate::{log_info, log_warn};

// ============================================================================
// INPUT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputDevice {
    Touch,
    Pencil,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GesturePhase {
    Begin,
    Move,
    Cancel,
    End,
}

/// One batch of raw input from the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSample {
    /// View-space points in input order
    pub points: Vec<Point>,
    pub device: InputDevice,
    pub phase: GesturePhase,
    /// Monotonic seconds
    pub timestamp: f64,
}

impl InputSample {
    pub fn new(points: Vec<Point>, device: InputDevice, phase: GesturePhase, timestamp: f64) -> Self {
        Self {
            points,
            device,
            phase,
            timestamp,
        }
    }
}

/// Area the presentation layer should redraw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Invalidation {
    Region(Rect),
    Full,
}

// ============================================================================
// BACKGROUND FILL RESULTS
// ============================================================================

/// A finished fill query, tagged with the id of the stroke that asked.
struct FillResult {
    token: u64,
    fill: Option<RegionFill>,
}

enum ClipState {
    /// Query outstanding: ink is held back and shown as an overlay
    Pending,
    Ready(Arc<RegionFill>),
}

struct ActiveGesture {
    stroke: Stroke,
    device: InputDevice,
    began_at: f64,
    /// Points received but not yet added to the stroke
    held: Vec<Point>,
    clip: ClipState,
}

// ============================================================================
// SESSION LOADER
// ============================================================================

/// Prepares a [`ColoringSession`]: in precomputed mode segmentation runs on
/// the worker pool and the session only becomes available once the index is
/// complete.
pub struct SessionLoader {
    buffer: PixelBuffer,
    settings: ColoringSettings,
    receiver: Option<mpsc::Receiver<SegmentationOutcome>>,
    delivered: bool,
}

impl SessionLoader {
    /// Validates the settings up front so configuration problems fail fast,
    /// before any background work starts.
    pub fn start(buffer: PixelBuffer, settings: ColoringSettings) -> Result<Self, ConfigError> {
        if let Err(e) = settings.validate() {
            crate::log_err!("Invalid configuration: {}", e);
            return Err(e);
        }
        let receiver = if settings.precomputed {
            Some(spawn_segmentation(
                buffer.clone(),
                settings.grid_x,
                settings.grid_y,
            ))
        } else {
            None
        };
        Ok(Self {
            buffer,
            settings,
            receiver,
            delivered: false,
        })
    }

    /// Non-blocking.  Returns the outcome exactly once; `None` while the
    /// index is still being built (and after the outcome was taken).
    pub fn poll(&mut self) -> Option<Result<ColoringSession, LoadError>> {
        if self.delivered {
            return None;
        }
        let outcome = match &self.receiver {
            None => Ok(None),
            Some(receiver) => match receiver.try_recv() {
                Ok(Ok((index, _))) => Ok(Some(index)),
                Ok(Err(e)) => Err(LoadError::Segmentation(e)),
                Err(mpsc::TryRecvError::Empty) => return None,
                Err(mpsc::TryRecvError::Disconnected) => Err(LoadError::WorkerDisconnected),
            },
        };
        self.delivered = true;
        Some(outcome.and_then(|index| self.build(index)))
    }

    /// Block until the session is ready.
    pub fn wait(self) -> Result<ColoringSession, LoadError> {
        let index = match &self.receiver {
            None => None,
            Some(receiver) => match receiver.recv() {
                Ok(outcome) => Some(outcome?.0),
                Err(_) => return Err(LoadError::WorkerDisconnected),
            },
        };
        self.build(index)
    }

    fn build(&self, index: Option<Arc<SpatialIndex>>) -> Result<ColoringSession, LoadError> {
        Ok(ColoringSession::new(
            self.buffer.clone(),
            self.settings.clone(),
            index,
        )?)
    }
}

// ============================================================================
// COLOURING SESSION – the foreground context
// ============================================================================

/// Owns the persistent raster and stroke history and is the only place
/// either is mutated.  Fill queries run on the worker pool; their results
/// come back through a channel and are applied in [`Self::poll_background`].
pub struct ColoringSession {
    settings: ColoringSettings,
    buffer: PixelBuffer,
    index: Option<Arc<SpatialIndex>>,
    raster: Raster,
    history: StrokeHistory,
    active: Option<ActiveGesture>,
    /// A gesture that ended before its fill arrived
    parked: Option<ActiveGesture>,
    fill_sender: mpsc::Sender<FillResult>,
    fill_receiver: mpsc::Receiver<FillResult>,
    pending_fill_jobs: usize,
    dirty: Option<Invalidation>,
    reference_visible: bool,
}

impl ColoringSession {
    /// `index` selects precomputed mode; `None` fills on demand.  The
    /// `precomputed` flag of `settings` is overridden to match.
    pub fn new(
        buffer: PixelBuffer,
        mut settings: ColoringSettings,
        index: Option<Arc<SpatialIndex>>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        settings.precomputed = index.is_some();
        let (fill_sender, fill_receiver) = mpsc::channel();
        let history = StrokeHistory::new(settings.compaction());
        log_info!(
            "Session ready: {}x{} line art, {} mode",
            buffer.width(),
            buffer.height(),
            if index.is_some() { "precomputed" } else { "on-demand" }
        );
        Ok(Self {
            raster: Raster::new(buffer.width(), buffer.height()),
            settings,
            buffer,
            index,
            history,
            active: None,
            parked: None,
            fill_sender,
            fill_receiver,
            pending_fill_jobs: 0,
            dirty: None,
            reference_visible: true,
        })
    }

    /// Convenience for headless callers: start a loader and wait for it.
    pub fn open(buffer: PixelBuffer, settings: ColoringSettings) -> Result<Self, LoadError> {
        SessionLoader::start(buffer, settings)?.wait()
    }

    pub fn settings(&self) -> &ColoringSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn index(&self) -> Option<&SpatialIndex> {
        self.index.as_deref()
    }

    pub fn is_precomputed(&self) -> bool {
        self.index.is_some()
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn history(&self) -> &StrokeHistory {
        &self.history
    }

    fn scale(&self) -> f32 {
        self.settings.display_scale
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Accumulate an area to redraw; `None` means the whole view.
    fn mark_dirty(&mut self, rect: Option<Rect>) {
        self.dirty = match (self.dirty, rect) {
            (Some(Invalidation::Full), _) | (_, None) => Some(Invalidation::Full),
            (Some(Invalidation::Region(existing)), Some(r)) => {
                Some(Invalidation::Region(existing.union(r)))
            }
            (None, Some(r)) => Some(Invalidation::Region(r)),
        };
    }

    /// Drain the accumulated invalidation.
    pub fn take_dirty(&mut self) -> Option<Invalidation> {
        self.dirty.take()
    }

    // ------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------

    /// Feed one input batch.  `style` is only read on `Begin`.
    pub fn handle_input(&mut self, sample: &InputSample, style: StrokeStyle) {
        match sample.phase {
            GesturePhase::Begin => self.begin_gesture(sample, style),
            GesturePhase::Move => {
                if let Some(gesture) = self.active.as_mut() {
                    gesture.held.extend_from_slice(&sample.points);
                }
                self.flush_held(sample.timestamp, false);
            }
            GesturePhase::Cancel => self.cancel_gesture(),
            GesturePhase::End => {
                if let Some(gesture) = self.active.as_mut() {
                    gesture.held.extend_from_slice(&sample.points);
                }
                self.flush_held(sample.timestamp, true);
                self.end_gesture();
            }
        }
    }

    fn begin_gesture(&mut self, sample: &InputSample, style: StrokeStyle) {
        if self.active.is_some() {
            self.cancel_gesture();
        }
        if let Some(parked) = self.parked.take() {
            log_info!("Dropping stroke {} still waiting for its fill", parked.stroke.id());
        }
        let Some(&seed) = sample.points.first() else {
            return;
        };
        let Some((x, y)) = seed.to_pixel(self.scale(), self.buffer.width(), self.buffer.height())
        else {
            return;
        };

        let stroke = Stroke::new(style);
        self.history.begin_recording();
        self.dispatch_fill(stroke.id(), x, y);
        self.active = Some(ActiveGesture {
            stroke,
            device: sample.device,
            began_at: sample.timestamp,
            held: sample.points.clone(),
            clip: ClipState::Pending,
        });
        self.flush_held(sample.timestamp, false);
    }

    fn hold_off_secs(&self, device: InputDevice) -> f64 {
        let ms = match device {
            InputDevice::Touch => self.settings.touch_hold_off_ms,
            InputDevice::Pencil => self.settings.pencil_hold_off_ms,
        };
        ms as f64 / 1000.0
    }

    /// Move held points into the stroke once the hold-off has passed (or
    /// unconditionally when `force`), then draw what became drawable.
    fn flush_held(&mut self, now: f64, force: bool) {
        let Some(gesture) = self.active.as_ref() else {
            return;
        };
        let hold_off = self.hold_off_secs(gesture.device);
        if !force && now - gesture.began_at < hold_off {
            return;
        }
        let Some(gesture) = self.active.as_mut() else {
            return;
        };
        for point in gesture.held.drain(..) {
            gesture.stroke.add_point(point);
        }
        self.draw_active();
    }

    /// Draw the active stroke's new points clipped to its region, or, while
    /// the region is still pending, invalidate its overlay.
    fn draw_active(&mut self) {
        let scale = self.scale();
        let Some(gesture) = self.active.as_mut() else {
            return;
        };
        let touched = match &gesture.clip {
            ClipState::Ready(clip) => {
                self.raster.set_clip(Arc::clone(clip));
                let rect = gesture.stroke.draw_since_last(&mut self.raster, scale);
                self.raster.reset_clip();
                rect
            }
            ClipState::Pending => gesture.stroke.bounds(),
        };
        if let Some(rect) = touched {
            self.mark_dirty(Some(rect));
        }
    }

    fn cancel_gesture(&mut self) {
        let Some(gesture) = self.active.take() else {
            return;
        };
        self.history.cancel_recording();
        match gesture.clip {
            // Ink already landed: rebuild without it
            ClipState::Ready(_) if !gesture.stroke.is_empty() => {
                self.history.replay(&mut self.raster, self.settings.display_scale);
                self.mark_dirty(None);
            }
            _ => {
                if let Some(bounds) = gesture.stroke.bounds() {
                    self.mark_dirty(Some(bounds));
                }
            }
        }
    }

    fn end_gesture(&mut self) {
        let Some(gesture) = self.active.take() else {
            return;
        };
        match gesture.clip {
            ClipState::Ready(clip) => self.commit_stroke(gesture.stroke, clip),
            ClipState::Pending => self.parked = Some(gesture),
        }
    }

    /// Append a finished stroke (if it recorded anything) and compact when
    /// the log has grown past its threshold.
    fn commit_stroke(&mut self, mut stroke: Stroke, clip: Arc<RegionFill>) {
        if stroke.is_empty() {
            self.history.cancel_recording();
            return;
        }
        stroke.reset_drawn();
        let (width, height, scale) = (self.raster.width(), self.raster.height(), self.scale());
        self.history.commit(HistoryEntry::new(stroke, clip));
        self.history.maybe_compact(width, height, scale);
    }

    /// The stroke currently being drawn, for overlay rendering while its
    /// fill is pending.
    pub fn active_stroke(&self) -> Option<&Stroke> {
        self.active.as_ref().map(|g| &g.stroke)
    }

    pub fn is_fill_pending(&self) -> bool {
        matches!(
            self.active.as_ref().map(|g| &g.clip),
            Some(ClipState::Pending)
        ) || self.parked.is_some()
    }

    // ------------------------------------------------------------------
    // Background fills
    // ------------------------------------------------------------------

    fn dispatch_fill(&mut self, token: u64, x: u32, y: u32) {
        let sender = self.fill_sender.clone();
        let buffer = self.buffer.clone();
        let index = self.index.clone();
        self.pending_fill_jobs += 1;
        rayon::spawn(move || {
            let fill = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                query_fill(&buffer, index.as_deref(), x, y)
            }))
            .unwrap_or_else(|_| {
                log_warn!("Fill query at ({}, {}) panicked", x, y);
                None
            });
            let _ = sender.send(FillResult { token, fill });
        });
    }

    pub fn pending_fill_jobs(&self) -> usize {
        self.pending_fill_jobs
    }

    /// Apply every finished fill query without blocking.  Returns how many
    /// results were received (stale ones included).
    pub fn poll_background(&mut self) -> usize {
        let mut received = 0;
        while let Ok(result) = self.fill_receiver.try_recv() {
            self.pending_fill_jobs = self.pending_fill_jobs.saturating_sub(1);
            self.apply_fill(result);
            received += 1;
        }
        received
    }

    /// Block until every dispatched fill query has been applied.
    pub fn finish_pending_fills(&mut self) {
        while self.pending_fill_jobs > 0 {
            match self.fill_receiver.recv() {
                Ok(result) => {
                    self.pending_fill_jobs -= 1;
                    self.apply_fill(result);
                }
                Err(_) => break,
            }
        }
    }

    fn apply_fill(&mut self, result: FillResult) {
        let active_matches = self
            .active
            .as_ref()
            .is_some_and(|g| g.stroke.id() == result.token);
        let parked_matches = self
            .parked
            .as_ref()
            .is_some_and(|g| g.stroke.id() == result.token);

        if active_matches {
            match result.fill {
                Some(fill) => {
                    if let Some(gesture) = self.active.as_mut() {
                        gesture.clip = ClipState::Ready(Arc::new(fill));
                    }
                    // Points drawn as an overlay so far now land clipped
                    self.mark_dirty(None);
                    self.draw_active();
                }
                None => {
                    log_info!("No region under stroke {}, dropping it", result.token);
                    self.cancel_gesture();
                }
            }
        } else if parked_matches {
            let Some(gesture) = self.parked.take() else {
                return;
            };
            match result.fill {
                Some(fill) => {
                    let clip = Arc::new(fill);
                    self.raster.set_clip(Arc::clone(&clip));
                    let mut stroke = gesture.stroke;
                    stroke.draw_since_last(&mut self.raster, self.settings.display_scale);
                    self.raster.reset_clip();
                    self.mark_dirty(None);
                    self.commit_stroke(stroke, clip);
                }
                None => {
                    log_info!("No region under stroke {}, dropping it", result.token);
                    self.history.cancel_recording();
                    if let Some(bounds) = gesture.stroke.bounds() {
                        self.mark_dirty(Some(bounds));
                    }
                }
            }
        } else {
            log_info!("Discarding stale fill result for stroke {}", result.token);
        }
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Only while no gesture is open.
    pub fn undo(&mut self) -> bool {
        let scale = self.scale();
        let undone = self.history.undo(&mut self.raster, scale);
        if undone {
            self.mark_dirty(None);
        }
        undone
    }

    /// Only while no gesture is open.
    pub fn redo(&mut self) -> bool {
        let scale = self.scale();
        let redone = self.history.redo(&mut self.raster, scale);
        if redone {
            self.mark_dirty(None);
        }
        redone
    }

    /// Abandon any open gesture, empty both logs, drop the baseline and
    /// blank the raster.
    pub fn clear(&mut self) {
        self.active = None;
        self.parked = None;
        self.history.clear();
        self.raster.reset_clip();
        self.raster.clear();
        self.mark_dirty(None);
    }

    // ------------------------------------------------------------------
    // Presentation helpers
    // ------------------------------------------------------------------

    /// Flip visibility of the line-art layer.  Rendering only.
    pub fn toggle_reference_layer(&mut self) -> bool {
        self.reference_visible = !self.reference_visible;
        self.mark_dirty(None);
        self.reference_visible
    }

    pub fn reference_visible(&self) -> bool {
        self.reference_visible
    }

    // ------------------------------------------------------------------
    // Saved state
    // ------------------------------------------------------------------

    /// PNG of the current raster.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, CodecError> {
        crate::io::encode_png(self.raster.image())
    }

    pub fn saved_drawing(&self) -> Result<SavedDrawing, CodecError> {
        Ok(SavedDrawing::new(self.is_precomputed(), self.export_snapshot()?))
    }

    /// Start over from a previously exported snapshot.  History is cleared
    /// and the snapshot becomes its baseline.
    pub fn restore_snapshot(&mut self, png: Vec<u8>) -> Result<(), CodecError> {
        let image = crate::io::decode_png_sized(&png, self.raster.width(), self.raster.height())?;
        self.clear();
        self.history.set_baseline(Baseline::from_png(png));
        self.raster.replace_with(image);
        Ok(())
    }
}
