//! Native GeoTIFF reading/writing built on the `tiff` crate.
//!
//! Understands the subset of GeoTIFF the pipeline relies on: the
//! pixel-scale/tiepoint georeferencing, the EPSG code from the GeoKey
//! directory and the GDAL no-data tag.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

// The decoder files these under their named variants, never `Tag::Unknown`
const TAG_MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const TAG_MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const TAG_GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const TAG_GDAL_NODATA: Tag = Tag::GdalNodata;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Write the GDAL no-data tag even when the marker is NaN
    pub always_write_nodata: bool,
}

/// Read the first band of a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
///
/// Used for rainfall payloads that arrive as bytes from the cache or an
/// upstream service.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: Read + Seek,
{
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);

    let data: Vec<T> = match decoder.read_image()? {
        DecodingResult::F32(buf) => cast_all(&buf),
        DecodingResult::F64(buf) => cast_all(&buf),
        DecodingResult::U8(buf) => cast_all(&buf),
        DecodingResult::U16(buf) => cast_all(&buf),
        DecodingResult::U32(buf) => cast_all(&buf),
        DecodingResult::I16(buf) => cast_all(&buf),
        DecodingResult::I32(buf) => cast_all(&buf),
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF pixel format".into())),
    };

    // Multi-band chunky images decode interleaved; keep the first band only
    let data = if data.len() == rows * cols {
        data
    } else if rows * cols > 0 && data.len() % (rows * cols) == 0 {
        let bands = data.len() / (rows * cols);
        data.into_iter().step_by(bands).collect()
    } else {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    };

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_crs(read_crs(&mut decoder));
    raster.set_nodata(read_nodata(&mut decoder));

    Ok(raster)
}

fn cast_all<S: Copy + num_traits::NumCast, T: RasterElement>(buf: &[S]) -> Vec<T> {
    buf.iter()
        .map(|&v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(TAG_MODEL_PIXEL_SCALE)
        .ok()?;
    let tiepoint = decoder
        .get_tag_f64_vec(TAG_MODEL_TIEPOINT)
        .ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<CRS> {
    let keys = decoder
        .get_tag_u16_vec(TAG_GEO_KEY_DIRECTORY)
        .ok()?;
    crs_from_geokeys(&keys)
}

/// Extract an EPSG code from a GeoKeyDirectory.
///
/// Layout: `[version, revision, minor, count, (key, location, count, value)*]`.
/// Only keys stored inline (location 0) are considered; the projected CS key
/// wins over the geographic one.
fn crs_from_geokeys(keys: &[u16]) -> Option<CRS> {
    let count = *keys.get(3)? as usize;
    let mut projected = None;
    let mut geographic = None;

    for entry in keys[4..].chunks_exact(4).take(count) {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == 32767 {
            continue;
        }
        match key {
            KEY_PROJECTED_CS_TYPE => projected = Some(value as u32),
            KEY_GEOGRAPHIC_TYPE => geographic = Some(value as u32),
            _ => {}
        }
    }

    projected.or(geographic).map(CRS::from_epsg)
}

fn read_nodata<T: RasterElement, R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<T> {
    let text = decoder
        .get_tag_ascii_string(TAG_GDAL_NODATA)
        .ok()?;
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    num_traits::cast(value)
}

/// Write a Raster to a GeoTIFF file as 32-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    encode_geotiff(raster, &mut writer, &options.unwrap_or_default())?;
    writer.flush()?;
    Ok(())
}

/// Write a Raster to an in-memory GeoTIFF buffer as 32-bit float
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: &GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: Write + Seek,
{
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = raster.shape();

    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| num_traits::cast(v).unwrap_or(f32::NAN))
        .collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;

    let gt = raster.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(TAG_MODEL_PIXEL_SCALE, &scale[..])?;

    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(TAG_MODEL_TIEPOINT, &tiepoint[..])?;

    let geokeys = geokeys_for(raster.crs());
    image
        .encoder()
        .write_tag(TAG_GEO_KEY_DIRECTORY, &geokeys[..])?;

    if let Some(nodata) = raster.nodata().and_then(|v| v.to_f64()) {
        if !nodata.is_nan() || options.always_write_nodata {
            let text = nodata.to_string();
            image
                .encoder()
                .write_tag(TAG_GDAL_NODATA, text.as_str())?;
        }
    }

    image.write_data(&data)?;
    Ok(())
}

fn geokeys_for(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs.and_then(CRS::epsg).and_then(|code| u16::try_from(code).ok());
    let geographic = crs.map_or(false, CRS::is_geographic);

    let model_type = if geographic {
        MODEL_TYPE_GEOGRAPHIC
    } else {
        MODEL_TYPE_PROJECTED
    };

    let mut keys = vec![
        KEY_MODEL_TYPE, 0, 1, model_type,
        KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
    ];
    if let Some(code) = epsg {
        let key = if geographic {
            KEY_GEOGRAPHIC_TYPE
        } else {
            KEY_PROJECTED_CS_TYPE
        };
        keys.extend_from_slice(&[key, 0, 1, code]);
    }

    let mut directory = vec![1, 1, 0, (keys.len() / 4) as u16];
    directory.extend(keys);
    directory
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut raster = Raster::from_vec(vec![0.5, 1.5, 2.5, 3.5, 4.5, 5.5], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(570_000.0, 6_280_000.0, 1000.0, -1000.0));
        raster.set_crs(Some(CRS::lambert93()));
        raster.set_nodata(Some(-9999.0));
        raster
    }

    #[test]
    fn buffer_preserves_georeferencing() {
        let bytes = write_geotiff_to_buffer(&sample(), None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.get(1, 2).unwrap(), 5.5);
        assert_eq!(back.transform(), sample().transform());
        assert_eq!(back.crs().and_then(CRS::epsg), Some(2154));
        assert_eq!(back.nodata(), Some(-9999.0));
    }

    #[test]
    fn geotiff_tags_are_found_by_a_fresh_decoder() {
        let bytes = write_geotiff_to_buffer(&sample(), None).unwrap();
        let mut decoder = Decoder::new(Cursor::new(&bytes[..])).unwrap();

        assert!(decoder.get_tag_f64_vec(TAG_MODEL_PIXEL_SCALE).is_ok());
        assert!(decoder.get_tag_f64_vec(TAG_MODEL_TIEPOINT).is_ok());
        assert_eq!(read_crs(&mut decoder).and_then(|c| c.epsg()), Some(2154));
        assert_eq!(read_nodata::<f64, _>(&mut decoder), Some(-9999.0));
    }

    #[test]
    fn nan_nodata_written_on_request() {
        let mut raster = sample();
        raster.set_nodata(Some(f64::NAN));

        let plain = write_geotiff_to_buffer(&raster, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&plain).unwrap();
        assert_eq!(back.nodata(), None);

        let options = GeoTiffOptions {
            always_write_nodata: true,
        };
        let tagged = write_geotiff_to_buffer(&raster, Some(options)).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&tagged).unwrap();
        assert!(back.nodata().is_some_and(f64::is_nan));
        assert_eq!(back.crs().and_then(CRS::epsg), Some(2154));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slowness.tif");
        write_geotiff(&sample(), &path, Some(GeoTiffOptions::default())).unwrap();

        let back: Raster<f32> = read_geotiff(&path).unwrap();
        assert_eq!(back.get(0, 0).unwrap(), 0.5);
    }

    #[test]
    fn geokeys_prefer_projected_code() {
        let keys = [1, 1, 0, 2, KEY_GEOGRAPHIC_TYPE, 0, 1, 4171, KEY_PROJECTED_CS_TYPE, 0, 1, 2154];
        assert_eq!(crs_from_geokeys(&keys).and_then(|c| c.epsg()), Some(2154));
        assert!(crs_from_geokeys(&[1, 1, 0, 0]).is_none());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(read_geotiff_from_buffer::<f64>(b"not a tiff").is_err());
    }
}
