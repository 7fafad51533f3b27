use thiserror::Error;

/// Configuration problems discovered at startup.  These are the only fatal
/// conditions: they are reported before any interactive state exists.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("image has zero area ({width}×{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("row stride {bytes_per_row} is smaller than {width} RGBA pixels")]
    StrideTooSmall { width: u32, bytes_per_row: usize },
    #[error("pixel buffer holds {actual} bytes, expected at least {expected}")]
    BufferTooShort { expected: usize, actual: usize },
    #[error("spatial index needs at least one division per axis (got {x}×{y})")]
    ZeroGrid { x: u32, y: u32 },
    #[error("display scale must be positive (got {0})")]
    InvalidScale(f32),
    #[error("stroke width must be positive (got {0})")]
    InvalidStrokeWidth(f32),
}

/// Failures of the PNG codecs used for masks and raster snapshots.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("PNG encode failed: {0}")]
    Encode(#[from] png::EncodingError),
    #[error("PNG decode failed: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("image codec failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("decoded image is {actual_w}×{actual_h}, expected {expected_w}×{expected_h}")]
    Dimensions {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },
    #[error("unsupported PNG layout: {0}")]
    Layout(String),
}

/// Errors raised while preparing a [`crate::project::ColoringSession`].
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not read line art: {0}")]
    Read(#[from] image::ImageError),
    #[error("segmentation failed: {0}")]
    Segmentation(#[from] CodecError),
    #[error("segmentation worker exited without a result")]
    WorkerDisconnected,
}

/// Errors from the saved-state blob.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] Box<bincode::ErrorKind>),
    #[error("invalid saved state: {0}")]
    InvalidFormat(String),
}
