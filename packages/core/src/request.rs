//! Crop request types as submitted by clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an object lives in remote storage.
///
/// Used both for the source raster of a request and for the published result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLocation {
    /// Storage endpoint domain, e.g. `s3.amazonaws.com`.
    pub domain: String,
    /// Bucket holding the object.
    pub bucket_name: String,
    /// Object key inside the bucket.
    pub file_name: String,
}

impl ObjectLocation {
    pub fn new(
        domain: impl Into<String>,
        bucket_name: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            bucket_name: bucket_name.into(),
            file_name: file_name.into(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.domain, self.bucket_name, self.file_name)
    }
}

/// Axis-aligned bounding box in the source raster's coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self {
            minx,
            miny,
            maxx,
            maxy,
        }
    }

    /// Check the box is finite and has a positive extent on both axes.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let coords = [self.minx, self.miny, self.maxx, self.maxy];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(ValidationError::NonFiniteBounds);
        }
        if self.minx >= self.maxx {
            return Err(ValidationError::InvertedBounds {
                axis: 'x',
                min: self.minx,
                max: self.maxx,
            });
        }
        if self.miny >= self.maxy {
            return Err(ValidationError::InvertedBounds {
                axis: 'y',
                min: self.miny,
                max: self.maxy,
            });
        }
        Ok(())
    }
}

/// A request to crop a remote raster to a bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRequest {
    /// The raster to crop.
    pub source: ObjectLocation,
    /// Requested operation name, e.g. `crop`.
    pub function: String,
    /// Crop envelope in source coordinates.
    pub bounds: BoundingBox,
}

impl CropRequest {
    pub fn new(source: ObjectLocation, function: impl Into<String>, bounds: BoundingBox) -> Self {
        Self {
            source,
            function: function.into(),
            bounds,
        }
    }

    /// Parse a submission payload.
    pub fn from_json(payload: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(payload).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// Structural validation: required fields present and bounds ordered.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("source.domain", &self.source.domain),
            ("source.bucketName", &self.source.bucket_name),
            ("source.fileName", &self.source.file_name),
            ("function", &self.function),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        self.bounds.validate()
    }
}

/// Reasons a request is rejected before any job is created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("bounds must be finite numbers")]
    NonFiniteBounds,

    #[error("bounds are empty or inverted on {axis} axis (min {min} >= max {max})")]
    InvertedBounds { axis: char, min: f64, max: f64 },
}
