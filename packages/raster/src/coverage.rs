//! In-memory raster coverages and their georeferencing.

use crop_core::BoundingBox;

use crate::RasterError;

/// Axis-aligned rectangle in the coverage's coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Envelope {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    /// Finite with a positive extent on both axes.
    pub fn is_valid(&self) -> bool {
        [self.minx, self.miny, self.maxx, self.maxy]
            .iter()
            .all(|c| c.is_finite())
            && self.minx < self.maxx
            && self.miny < self.maxy
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.minx < other.maxx
            && other.minx < self.maxx
            && self.miny < other.maxy
            && other.miny < self.maxy
    }
}

impl From<&BoundingBox> for Envelope {
    fn from(b: &BoundingBox) -> Self {
        Self::new(b.minx, b.miny, b.maxx, b.maxy)
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}, {}]",
            self.minx, self.miny, self.maxx, self.maxy
        )
    }
}

/// North-up affine transform: pixel (col, row) has its top-left corner at
/// `(origin_x + col * pixel_width, origin_y - row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel size along x, positive.
    pub pixel_width: f64,
    /// Pixel size along y, positive; rows run southwards.
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Transform whose cells exactly tile `extent` with a `width` x `height` grid.
    pub fn covering(extent: &Envelope, width: u32, height: u32) -> Self {
        Self::new(
            extent.minx,
            extent.maxy,
            (extent.maxx - extent.minx) / f64::from(width),
            (extent.maxy - extent.miny) / f64::from(height),
        )
    }

    /// Transform of a sub-grid whose top-left pixel is (col, row) of this one.
    pub fn shifted(&self, col: u32, row: u32) -> Self {
        Self::new(
            self.origin_x + f64::from(col) * self.pixel_width,
            self.origin_y - f64::from(row) * self.pixel_height,
            self.pixel_width,
            self.pixel_height,
        )
    }

    fn is_valid(&self) -> bool {
        self.origin_x.is_finite()
            && self.origin_y.is_finite()
            && self.pixel_width.is_finite()
            && self.pixel_height.is_finite()
            && self.pixel_width > 0.0
            && self.pixel_height > 0.0
    }
}

/// GeoTIFF key directory and parameter tags, carried through untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoKeys {
    pub directory: Vec<u16>,
    pub doubles: Option<Vec<f64>>,
    pub ascii: Option<String>,
}

/// Pixel-interleaved samples, row-major.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
}

impl RasterData {
    pub fn len(&self) -> usize {
        match self {
            RasterData::U8(v) => v.len(),
            RasterData::U16(v) => v.len(),
            RasterData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_type(&self) -> &'static str {
        match self {
            RasterData::U8(_) => "u8",
            RasterData::U16(_) => "u16",
            RasterData::F32(_) => "f32",
        }
    }
}

/// A raster held in memory together with where it sits on the ground.
#[derive(Debug, Clone, PartialEq)]
pub struct Coverage {
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub data: RasterData,
    pub transform: GeoTransform,
    pub geo_keys: Option<GeoKeys>,
}

impl Coverage {
    pub fn new(
        width: u32,
        height: u32,
        bands: u16,
        data: RasterData,
        transform: GeoTransform,
    ) -> Result<Self, RasterError> {
        if width == 0 || height == 0 || bands == 0 {
            return Err(RasterError::InvalidCoverage(format!(
                "empty raster {width}x{height}x{bands}"
            )));
        }
        let expected = width as usize * height as usize * bands as usize;
        if data.len() != expected {
            return Err(RasterError::InvalidCoverage(format!(
                "{} samples for a {width}x{height}x{bands} raster (expected {expected})",
                data.len()
            )));
        }
        if !transform.is_valid() {
            return Err(RasterError::InvalidCoverage(format!(
                "degenerate transform {transform:?}"
            )));
        }

        Ok(Self {
            width,
            height,
            bands,
            data,
            transform,
            geo_keys: None,
        })
    }

    pub fn with_geo_keys(mut self, geo_keys: GeoKeys) -> Self {
        self.geo_keys = Some(geo_keys);
        self
    }

    /// Ground extent covered by the whole raster.
    pub fn envelope(&self) -> Envelope {
        let t = &self.transform;
        Envelope::new(
            t.origin_x,
            t.origin_y - f64::from(self.height) * t.pixel_height,
            t.origin_x + f64::from(self.width) * t.pixel_width,
            t.origin_y,
        )
    }

    /// Release the sample buffer.
    pub fn dispose(self) {
        tracing::trace!(
            width = self.width,
            height = self.height,
            samples = self.data.len(),
            "Coverage disposed"
        );
    }
}
