//! GeoTIFF decoding and encoding on top of the `tiff` crate.
//!
//! Georeferencing is read from and written to `ModelPixelScale` plus a single
//! `ModelTiepoint`, i.e. north-up rasters without rotation. The GeoKey
//! directory and its parameter tags are passed through unchanged.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{
    self, Gray8, Gray16, Gray32Float, RGB8, RGB16, RGB32Float, RGBA8, RGBA16, RGBA32Float,
};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

use crate::{Coverage, GeoKeys, GeoTransform, RasterData, RasterError};

/// An open raster file. Holds its file handle until disposed.
pub trait RasterSource: Send {
    /// Decode the first image into memory.
    fn read(&mut self) -> Result<Coverage, RasterError>;

    /// Close the underlying file.
    fn dispose(self: Box<Self>);
}

/// Reads and writes one raster file format.
pub trait RasterCodec: Send + Sync + 'static {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>, RasterError>;

    fn write(&self, coverage: &Coverage, path: &Path) -> Result<(), RasterError>;

    /// File extension for written files, without the dot.
    fn extension(&self) -> &'static str;

    fn mime_type(&self) -> &'static str;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeoTiffCodec;

impl GeoTiffCodec {
    /// Open, decode and close in one go.
    pub fn read_file(&self, path: &Path) -> Result<Coverage, RasterError> {
        let mut source = self.open(path)?;
        let coverage = source.read();
        source.dispose();
        coverage
    }
}

impl RasterCodec for GeoTiffCodec {
    fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>, RasterError> {
        let file = File::open(path)?;
        let decoder = Decoder::new(BufReader::new(file))?;
        Ok(Box::new(GeoTiffSource {
            path: path.to_path_buf(),
            decoder,
        }))
    }

    fn write(&self, coverage: &Coverage, path: &Path) -> Result<(), RasterError> {
        let mut writer = BufWriter::new(File::create(path)?);
        {
            let mut encoder = TiffEncoder::new(&mut writer)?;
            let enc = &mut encoder;
            match (&coverage.data, coverage.bands) {
                (RasterData::U8(d), 1) => encode_image::<_, Gray8>(enc, coverage, d),
                (RasterData::U8(d), 3) => encode_image::<_, RGB8>(enc, coverage, d),
                (RasterData::U8(d), 4) => encode_image::<_, RGBA8>(enc, coverage, d),
                (RasterData::U16(d), 1) => encode_image::<_, Gray16>(enc, coverage, d),
                (RasterData::U16(d), 3) => encode_image::<_, RGB16>(enc, coverage, d),
                (RasterData::U16(d), 4) => encode_image::<_, RGBA16>(enc, coverage, d),
                (RasterData::F32(d), 1) => encode_image::<_, Gray32Float>(enc, coverage, d),
                (RasterData::F32(d), 3) => encode_image::<_, RGB32Float>(enc, coverage, d),
                (RasterData::F32(d), 4) => encode_image::<_, RGBA32Float>(enc, coverage, d),
                (data, bands) => Err(RasterError::Unsupported(format!(
                    "cannot encode {bands} band(s) of {}",
                    data.sample_type()
                ))),
            }?;
        }
        writer.flush()?;

        tracing::debug!(
            path = ?path,
            width = coverage.width,
            height = coverage.height,
            "Wrote GeoTIFF"
        );
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "tif"
    }

    fn mime_type(&self) -> &'static str {
        crop_core::GEOTIFF_MIME_TYPE
    }
}

fn encode_image<W, C>(
    encoder: &mut TiffEncoder<W>,
    coverage: &Coverage,
    data: &[C::Inner],
) -> Result<(), RasterError>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let t = &coverage.transform;
    let mut image = encoder.new_image::<C>(coverage.width, coverage.height)?;

    let dir = image.encoder();
    dir.write_tag(Tag::ModelPixelScaleTag, &[t.pixel_width, t.pixel_height, 0.0][..])?;
    dir.write_tag(
        Tag::ModelTiepointTag,
        &[0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0][..],
    )?;
    if let Some(keys) = &coverage.geo_keys {
        dir.write_tag(Tag::GeoKeyDirectoryTag, &keys.directory[..])?;
        if let Some(doubles) = &keys.doubles {
            dir.write_tag(Tag::GeoDoubleParamsTag, &doubles[..])?;
        }
        if let Some(ascii) = &keys.ascii {
            dir.write_tag(Tag::GeoAsciiParamsTag, ascii.as_str())?;
        }
    }

    image.write_data(data)?;
    Ok(())
}

/// A GeoTIFF file opened for decoding.
pub struct GeoTiffSource {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
}

impl GeoTiffSource {
    fn f64_tag(&mut self, tag: Tag) -> Result<Option<Vec<f64>>, RasterError> {
        match self.decoder.find_tag(tag)? {
            Some(value) => Ok(Some(value.into_f64_vec()?)),
            None => Ok(None),
        }
    }

    fn transform(&mut self) -> Result<GeoTransform, RasterError> {
        let scale = self
            .f64_tag(Tag::ModelPixelScaleTag)?
            .ok_or(RasterError::MissingGeoreference("ModelPixelScale"))?;
        let tiepoint = self
            .f64_tag(Tag::ModelTiepointTag)?
            .ok_or(RasterError::MissingGeoreference("ModelTiepoint"))?;

        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(RasterError::Unsupported(format!(
                "malformed georeferencing: scale {scale:?}, tiepoint {tiepoint:?}"
            )));
        }

        // Tiepoint maps raster (i, j) to model (x, y).
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Ok(GeoTransform::new(
            x - i * scale[0],
            y + j * scale[1],
            scale[0],
            scale[1],
        ))
    }

    fn geo_keys(&mut self) -> Result<Option<GeoKeys>, RasterError> {
        let Some(directory) = self.decoder.find_tag(Tag::GeoKeyDirectoryTag)? else {
            return Ok(None);
        };
        let directory = directory.into_u16_vec()?;
        let doubles = self.f64_tag(Tag::GeoDoubleParamsTag)?;
        let ascii = match self.decoder.find_tag(Tag::GeoAsciiParamsTag)? {
            Some(value) => Some(value.into_string()?),
            None => None,
        };

        Ok(Some(GeoKeys {
            directory,
            doubles,
            ascii,
        }))
    }

    fn bands(&mut self) -> Result<u16, RasterError> {
        Ok(match self.decoder.colortype()? {
            ColorType::Gray(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) => 3,
            ColorType::RGBA(_) => 4,
            other => {
                return Err(RasterError::Unsupported(format!("color type {other:?}")));
            }
        })
    }
}

impl RasterSource for GeoTiffSource {
    fn read(&mut self) -> Result<Coverage, RasterError> {
        let (width, height) = self.decoder.dimensions()?;
        let bands = self.bands()?;
        let transform = self.transform()?;
        let geo_keys = self.geo_keys()?;

        let data = match self.decoder.read_image()? {
            DecodingResult::U8(v) => RasterData::U8(v),
            DecodingResult::U16(v) => RasterData::U16(v),
            DecodingResult::F32(v) => RasterData::F32(v),
            _ => {
                return Err(RasterError::Unsupported(format!(
                    "sample format of {}",
                    self.path.display()
                )));
            }
        };

        let coverage = Coverage::new(width, height, bands, data, transform)?;
        tracing::debug!(path = ?self.path, width, height, bands, "Decoded GeoTIFF");

        Ok(match geo_keys {
            Some(keys) => coverage.with_geo_keys(keys),
            None => coverage,
        })
    }

    fn dispose(self: Box<Self>) {
        let GeoTiffSource { path, decoder } = *self;
        drop(decoder);
        tracing::trace!(path = ?path, "Closed GeoTIFF");
    }
}
