//! Tap-to-fill colouring core: outline-bounded region fills, precomputed
//! region masks behind a spatial index, and clipped stroke history with
//! compaction.

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod geometry;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;

pub use canvas::{BitPlane, PixelBuffer, Raster};
pub use components::mask::{RegionFill, RegionMask};
pub use components::spatial_index::SpatialIndex;
pub use components::stroke::{Stroke, StrokeStyle};
pub use error::{CodecError, ConfigError, LoadError, StateError};
pub use geometry::{PixelRect, Point, Rect};
pub use project::{
    ColoringSession, GesturePhase, InputDevice, InputSample, Invalidation, SessionLoader,
};
pub use settings::ColoringSettings;
