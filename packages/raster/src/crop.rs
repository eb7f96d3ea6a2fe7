//! Clipping coverages to an envelope.

use crate::{Coverage, Envelope, RasterData, RasterError};

/// Offsets closer than this to a pixel edge snap onto it.
const EDGE_TOLERANCE: f64 = 1e-9;

/// Clips a coverage to an envelope in the coverage's own CRS.
pub trait CropEngine: Send + Sync + 'static {
    fn crop(&self, coverage: &Coverage, envelope: &Envelope) -> Result<Coverage, RasterError>;
}

/// Half-open pixel range `[col0, col1) x [row0, row1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col0: u32,
    pub row0: u32,
    pub col1: u32,
    pub row1: u32,
}

impl PixelWindow {
    pub fn width(&self) -> u32 {
        self.col1 - self.col0
    }

    pub fn height(&self) -> u32 {
        self.row1 - self.row0
    }

    /// Smallest window of whole pixels covering `envelope`, clipped to the raster.
    /// `None` when the envelope misses the raster.
    pub fn covering(coverage: &Coverage, envelope: &Envelope) -> Option<Self> {
        let t = &coverage.transform;
        let clamp = |v: f64, max: u32| v.clamp(0.0, f64::from(max)) as u32;

        let col0 = snap((envelope.minx - t.origin_x) / t.pixel_width).floor();
        let col1 = snap((envelope.maxx - t.origin_x) / t.pixel_width).ceil();
        let row0 = snap((t.origin_y - envelope.maxy) / t.pixel_height).floor();
        let row1 = snap((t.origin_y - envelope.miny) / t.pixel_height).ceil();

        let window = Self {
            col0: clamp(col0, coverage.width),
            row0: clamp(row0, coverage.height),
            col1: clamp(col1, coverage.width),
            row1: clamp(row1, coverage.height),
        };

        (window.col0 < window.col1 && window.row0 < window.row1).then_some(window)
    }
}

fn snap(v: f64) -> f64 {
    let nearest = v.round();
    if (v - nearest).abs() < EDGE_TOLERANCE {
        nearest
    } else {
        v
    }
}

/// Crops on the pixel grid: keeps every pixel the envelope touches and
/// nothing else. No resampling or reprojection.
#[derive(Debug, Default, Clone, Copy)]
pub struct GridCropEngine;

impl CropEngine for GridCropEngine {
    fn crop(&self, coverage: &Coverage, envelope: &Envelope) -> Result<Coverage, RasterError> {
        if !envelope.is_valid() {
            return Err(RasterError::InvalidEnvelope(*envelope));
        }

        let extent = coverage.envelope();
        if !extent.intersects(envelope) {
            return Err(RasterError::NoOverlap {
                envelope: *envelope,
                extent,
            });
        }

        let window = PixelWindow::covering(coverage, envelope).ok_or(RasterError::NoOverlap {
            envelope: *envelope,
            extent,
        })?;

        let data = match &coverage.data {
            RasterData::U8(v) => RasterData::U8(copy_window(v, coverage, &window)),
            RasterData::U16(v) => RasterData::U16(copy_window(v, coverage, &window)),
            RasterData::F32(v) => RasterData::F32(copy_window(v, coverage, &window)),
        };

        tracing::debug!(
            ?window,
            src_width = coverage.width,
            src_height = coverage.height,
            "Cropped coverage"
        );

        let cropped = Coverage::new(
            window.width(),
            window.height(),
            coverage.bands,
            data,
            coverage.transform.shifted(window.col0, window.row0),
        )?;

        Ok(match &coverage.geo_keys {
            Some(keys) => cropped.with_geo_keys(keys.clone()),
            None => cropped,
        })
    }
}

fn copy_window<T: Copy>(samples: &[T], coverage: &Coverage, window: &PixelWindow) -> Vec<T> {
    let bands = coverage.bands as usize;
    let stride = coverage.width as usize * bands;
    let mut out = Vec::with_capacity(window.width() as usize * window.height() as usize * bands);

    for row in window.row0 as usize..window.row1 as usize {
        let start = row * stride + window.col0 as usize * bands;
        let end = row * stride + window.col1 as usize * bands;
        out.extend_from_slice(&samples[start..end]);
    }
    out
}
