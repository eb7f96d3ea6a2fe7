use thiserror::Error;

use crate::Envelope;

/// Errors raised while decoding, cropping or encoding rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported raster layout: {0}")]
    Unsupported(String),

    #[error("missing georeferencing: no {0} tag")]
    MissingGeoreference(&'static str),

    #[error("invalid coverage: {0}")]
    InvalidCoverage(String),

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(Envelope),

    #[error("envelope {envelope} does not intersect raster extent {extent}")]
    NoOverlap { envelope: Envelope, extent: Envelope },
}
