//! Raster model, crop engine, and GeoTIFF codec.
//!
//! Everything in this crate is synchronous and may block on file I/O or
//! spend a while on CPU; async callers should run it on a blocking thread.

pub mod coverage;
pub mod crop;
pub mod error;
pub mod geotiff;

pub use coverage::{Coverage, Envelope, GeoKeys, GeoTransform, RasterData};
pub use crop::{CropEngine, GridCropEngine, PixelWindow};
pub use error::RasterError;
pub use geotiff::{GeoTiffCodec, GeoTiffSource, RasterCodec, RasterSource};
