//! Whole-image compression into per-tile records, and back.
//!
//! [`compress`] cuts an image into tiles, quantizes float tiles and runs each
//! tile through the configured codec. [`decompress`] reverses it. A tile that
//! cannot be coded (a float tile with no usable quantization, for instance)
//! is kept verbatim as [`TilePayload::Uncompressed`].

use alloc::vec::Vec;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::geometry::{TileGeometry, TileRegion};
use crate::params::{BlankMode, Compression, CompressionParameters, ScaleMode};
use crate::pixel::{ImageData, PixelType};
use crate::codec::plio::PLIO_MAX_VALUE;
use crate::quantize::{Quantized, Quantizer, NULL_VALUE, ZERO_VALUE};

/// The stored form of one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum TilePayload {
    /// Codec output (the `COMPRESSED_DATA` column).
    Compressed(Vec<u8>),
    /// Raw pixels (the `UNCOMPRESSED_DATA` column).
    Uncompressed(ImageData),
}

/// One row of the compressed-image table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileRecord {
    pub payload: Option<TilePayload>,
    /// `ZSCALE` of a quantized float tile.
    pub scale: Option<f64>,
    /// `ZZERO` of a quantized float tile.
    pub zero: Option<f64>,
    /// `ZBLANK` of a quantized float tile that contained NaNs.
    pub blank: Option<i32>,
}

impl TileRecord {
    pub fn compressed(bytes: Vec<u8>) -> Self {
        TileRecord {
            payload: Some(TilePayload::Compressed(bytes)),
            ..Default::default()
        }
    }

    pub fn uncompressed(data: ImageData) -> Self {
        TileRecord {
            payload: Some(TilePayload::Uncompressed(data)),
            ..Default::default()
        }
    }

    /// Number of payload bytes this record stores.
    pub fn stored_len(&self) -> usize {
        match &self.payload {
            Some(TilePayload::Compressed(bytes)) => bytes.len(),
            Some(TilePayload::Uncompressed(data)) => data.len() * data.pixel_type().byte_width(),
            None => 0,
        }
    }
}

/// Column-oriented form of a compressed image, one entry per tile.
///
/// An empty `compressed` entry means the tile has no compressed payload.
/// Optional columns are `None` when absent from the table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TileColumns {
    pub compressed: Vec<Vec<u8>>,
    pub uncompressed: Option<Vec<Option<ImageData>>>,
    pub scale: Option<Vec<f64>>,
    pub zero: Option<Vec<f64>>,
    pub blank: Option<Vec<i32>>,
}

/// A tile-compressed image: the geometry plus one record per tile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedImage {
    pub pixel_type: PixelType,
    pub geometry: TileGeometry,
    pub tiles: Vec<TileRecord>,
}

impl CompressedImage {
    pub fn ntiles(&self) -> usize {
        self.tiles.len()
    }

    /// Total payload bytes over all tiles.
    pub fn stored_len(&self) -> usize {
        self.tiles.iter().map(TileRecord::stored_len).sum()
    }

    /// Compressed payload of each tile.
    pub fn compressed_data(&self) -> Vec<Option<&[u8]>> {
        self.tiles
            .iter()
            .map(|r| match &r.payload {
                Some(TilePayload::Compressed(bytes)) => Some(bytes.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Uncompressed payload of each tile.
    pub fn uncompressed_data(&self) -> Vec<Option<&ImageData>> {
        self.tiles
            .iter()
            .map(|r| match &r.payload {
                Some(TilePayload::Uncompressed(data)) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn scales(&self) -> Vec<Option<f64>> {
        self.tiles.iter().map(|r| r.scale).collect()
    }

    pub fn zeros(&self) -> Vec<Option<f64>> {
        self.tiles.iter().map(|r| r.zero).collect()
    }

    pub fn blanks(&self) -> Vec<Option<i32>> {
        self.tiles.iter().map(|r| r.blank).collect()
    }

    /// Lay the records out as table columns.
    ///
    /// Optional columns are emitted only when at least one tile uses them.
    /// Tiles without a value get a scale and zero of 0 and a blank of
    /// [`NULL_VALUE`].
    pub fn to_columns(&self) -> TileColumns {
        fn column<T: Copy>(values: Vec<Option<T>>, fill: T) -> Option<Vec<T>> {
            values
                .iter()
                .any(Option::is_some)
                .then(|| values.iter().map(|v| v.unwrap_or(fill)).collect())
        }

        let uncompressed: Vec<Option<ImageData>> =
            self.uncompressed_data().into_iter().map(|d| d.cloned()).collect();
        TileColumns {
            compressed: self
                .compressed_data()
                .into_iter()
                .map(|b| b.map(<[u8]>::to_vec).unwrap_or_default())
                .collect(),
            uncompressed: uncompressed.iter().any(Option::is_some).then_some(uncompressed),
            scale: column(self.scales(), 0.0),
            zero: column(self.zeros(), 0.0),
            blank: column(self.blanks(), NULL_VALUE),
        }
    }

    /// Rebuild the records from table columns.
    pub fn from_columns(
        pixel_type: PixelType,
        geometry: TileGeometry,
        columns: TileColumns,
    ) -> Result<Self> {
        let ntiles = geometry.ntiles();
        let lengths_match = columns.compressed.len() == ntiles
            && columns.uncompressed.as_ref().map_or(true, |c| c.len() == ntiles)
            && columns.scale.as_ref().map_or(true, |c| c.len() == ntiles)
            && columns.zero.as_ref().map_or(true, |c| c.len() == ntiles)
            && columns.blank.as_ref().map_or(true, |c| c.len() == ntiles);
        if !lengths_match {
            return Err(Error::InvalidValue("column length does not match the tile count"));
        }

        let mut uncompressed = columns.uncompressed.map(Vec::into_iter);
        let tiles = columns
            .compressed
            .into_iter()
            .enumerate()
            .map(|(t, bytes)| {
                let raw = uncompressed.as_mut().and_then(|it| it.next()).flatten();
                let payload = if !bytes.is_empty() {
                    Some(TilePayload::Compressed(bytes))
                } else {
                    raw.map(TilePayload::Uncompressed)
                };
                TileRecord {
                    payload,
                    scale: columns.scale.as_ref().map(|c| c[t]),
                    zero: columns.zero.as_ref().map(|c| c[t]),
                    blank: columns.blank.as_ref().map(|c| c[t]),
                }
            })
            .collect();

        Ok(CompressedImage {
            pixel_type,
            geometry,
            tiles,
        })
    }
}

#[cfg(feature = "rayon")]
fn map_tiles<T, F>(ntiles: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> Result<T> + Sync + Send,
{
    use rayon::prelude::*;
    (0..ntiles).into_par_iter().map(f).collect()
}

#[cfg(not(feature = "rayon"))]
fn map_tiles<T, F>(ntiles: usize, f: F) -> Result<Vec<T>>
where
    F: Fn(usize) -> Result<T>,
{
    (0..ntiles).map(f).collect()
}

fn float_tile(pixel_type: PixelType, values: Vec<f64>) -> ImageData {
    match pixel_type {
        PixelType::F32 => ImageData::F32(values.into_iter().map(|v| v as f32).collect()),
        _ => ImageData::F64(values),
    }
}

/// Compress `image` tile by tile.
///
/// Codec failures abort the call and carry the failing tile's index. With
/// the `rayon` feature tiles are coded in parallel, and when several tiles
/// fail the reported one is not necessarily the first.
pub fn compress(
    image: &ImageData,
    geometry: &TileGeometry,
    params: &CompressionParameters,
) -> Result<CompressedImage> {
    let pixel_type = image.pixel_type();
    if image.len() != geometry.total_len() {
        return Err(Error::InvalidDimension("image length does not match the tile geometry"));
    }
    params.validate(pixel_type)?;

    debug!(
        codec = %params.compression,
        ntiles = geometry.ntiles(),
        ?pixel_type,
        "compressing tiled image"
    );

    let quantizer = Quantizer::new(params.quantize_method, params.dither_seed);
    let tiles = map_tiles(geometry.ntiles(), |t| {
        let region = geometry.tile(t)?;
        let tile = image.gather(geometry, &region)?;
        let record = if pixel_type.is_float() {
            compress_float_tile(&tile, &region, params, &quantizer)
        } else {
            compress_integer_tile(tile, &region, params.compression)
        }
        .map_err(|e| e.at_tile(t))?;
        trace!(tile = t, pixels = region.len(), stored = record.stored_len(), "tile compressed");
        Ok(record)
    })?;

    Ok(CompressedImage {
        pixel_type,
        geometry: geometry.clone(),
        tiles,
    })
}

fn compress_integer_tile(
    tile: ImageData,
    region: &TileRegion,
    compression: Compression,
) -> Result<TileRecord> {
    if compression == Compression::Uncompressed {
        return Ok(TileRecord::uncompressed(tile));
    }
    Ok(TileRecord::compressed(compression.compress_tile(&tile, &region.shape)?))
}

fn compress_float_tile(
    tile: &ImageData,
    region: &TileRegion,
    params: &CompressionParameters,
    quantizer: &Quantizer,
) -> Result<TileRecord> {
    let compression = params.compression;
    if !params.quantizes() {
        if matches!(compression, Compression::Gzip1 | Compression::Gzip2) {
            return Ok(TileRecord::compressed(compression.compress_tile(tile, &region.shape)?));
        }
        debug!(tile = region.index, "quantization disabled, storing tile uncompressed");
        return Ok(TileRecord::uncompressed(tile.clone()));
    }

    let values = tile.to_f64();
    if params.blank == BlankMode::None && values.iter().any(|v| v.is_nan()) {
        debug!(
            tile = region.index,
            "tile has undefined pixels and no blank value, storing uncompressed"
        );
        return Ok(TileRecord::uncompressed(tile.clone()));
    }

    let quantized = match params.scale_mode {
        ScaleMode::PerTile => {
            quantizer.quantize(region.index, &values, region.shape[0], params.quantize_level)
        }
        ScaleMode::Global { scale, zero } => {
            quantizer.quantize_with(region.index, &values, scale, zero)
        }
    };
    let Some(Quantized {
        mut values,
        scale,
        mut zero,
        has_blanks,
    }) = quantized
    else {
        debug!(tile = region.index, "tile cannot be quantized, storing uncompressed");
        return Ok(TileRecord::uncompressed(tile.clone()));
    };

    let plio = compression == Compression::Plio;
    if plio && !shift_into_plio_range(&mut values, scale, &mut zero) {
        debug!(tile = region.index, "quantized tile does not fit PLIO, storing uncompressed");
        return Ok(TileRecord::uncompressed(tile.clone()));
    }

    let blank = match (has_blanks, params.blank) {
        (false, _) => None,
        (true, _) if plio => Some(0),
        (true, BlankMode::Fixed(value)) => {
            if value != NULL_VALUE {
                values
                    .iter_mut()
                    .filter(|v| **v == NULL_VALUE)
                    .for_each(|v| *v = value);
            }
            None
        }
        (true, _) => Some(NULL_VALUE),
    };

    let bytes = compression.compress_tile(&ImageData::I32(values), &region.shape)?;
    Ok(TileRecord {
        payload: Some(TilePayload::Compressed(bytes)),
        scale: Some(scale),
        zero: Some(zero),
        blank,
    })
}

/// Move a quantized tile into the PLIO value range: defined pixels start at 1
/// and undefined pixels become 0. `zero` absorbs the offset. Returns `false`
/// when the tile spans too many levels or holds dither-2 exact zeros.
fn shift_into_plio_range(values: &mut [i32], scale: f64, zero: &mut f64) -> bool {
    if values.contains(&ZERO_VALUE) {
        return false;
    }
    let defined = values.iter().copied().filter(|&v| v != NULL_VALUE);
    let (min, max) = defined.fold((i64::MAX, i64::MIN), |(lo, hi), v| {
        (lo.min(i64::from(v)), hi.max(i64::from(v)))
    });
    if min > max {
        values.fill(0);
        return true;
    }
    let offset = min - 1;
    if max - offset >= PLIO_MAX_VALUE {
        return false;
    }
    for v in values.iter_mut() {
        *v = if *v == NULL_VALUE {
            0
        } else {
            (i64::from(*v) - offset) as i32
        };
    }
    *zero += offset as f64 * scale;
    true
}

/// Decompress a whole image.
///
/// Undefined float pixels come back as NaN, or as `blank_substitution` when
/// given. Integer pixels equal to the blank value are replaced only when
/// `blank_substitution` is given.
pub fn decompress(
    compressed: &CompressedImage,
    params: &CompressionParameters,
    blank_substitution: Option<f64>,
) -> Result<ImageData> {
    let geometry = &compressed.geometry;
    let pixel_type = compressed.pixel_type;
    if compressed.tiles.len() != geometry.ntiles() {
        return Err(Error::InvalidValue("tile count does not match the geometry"));
    }
    params.validate(pixel_type)?;

    debug!(
        codec = %params.compression,
        ntiles = geometry.ntiles(),
        ?pixel_type,
        "decompressing tiled image"
    );

    let quantizer = Quantizer::new(params.quantize_method, params.dither_seed);
    let tiles = map_tiles(geometry.ntiles(), |t| {
        let region = geometry.tile(t)?;
        let tile = restore_tile(compressed, &region, params, &quantizer, blank_substitution)
            .map_err(|e| e.at_tile(t))?;
        trace!(tile = t, pixels = tile.len(), "tile decompressed");
        Ok((region, tile))
    })?;

    let mut image = ImageData::zeroed(pixel_type, geometry.total_len())?;
    for (region, tile) in &tiles {
        image.scatter(geometry, region, tile)?;
    }
    Ok(image)
}

fn restore_tile(
    compressed: &CompressedImage,
    region: &TileRegion,
    params: &CompressionParameters,
    quantizer: &Quantizer,
    blank_substitution: Option<f64>,
) -> Result<ImageData> {
    let pixel_type = compressed.pixel_type;
    let record = &compressed.tiles[region.index];
    let fixed_blank = match params.blank {
        BlankMode::Fixed(value) => Some(value),
        _ => None,
    };

    let mut tile = match &record.payload {
        None => return Err(Error::NoCompressedTile(region.index)),
        Some(TilePayload::Compressed(bytes)) if bytes.is_empty() => {
            return Err(Error::NoCompressedTile(region.index))
        }
        Some(TilePayload::Uncompressed(data)) => {
            if data.pixel_type() != pixel_type || data.len() != region.len() {
                return Err(Error::corrupt(
                    Compression::Uncompressed.name(),
                    "uncompressed tile does not match the image",
                ));
            }
            data.clone()
        }
        Some(TilePayload::Compressed(bytes)) => {
            let global_scale = match params.scale_mode {
                ScaleMode::Global { scale, zero } => Some((scale, zero)),
                ScaleMode::PerTile => None,
            };
            let scaling = match record.scale {
                Some(scale) => Some((scale, record.zero.unwrap_or(0.0))),
                None => global_scale,
            };
            match scaling {
                Some((scale, zero)) if pixel_type.is_float() => {
                    let ImageData::I32(ints) =
                        params.compression.decompress_tile(bytes, PixelType::I32, &region.shape)?
                    else {
                        return Err(Error::corrupt(
                            params.compression.name(),
                            "expected 32-bit tile",
                        ));
                    };
                    let blank = record.blank.or(fixed_blank).unwrap_or(NULL_VALUE);
                    let null_value = blank_substitution.unwrap_or(f64::NAN);
                    let values = quantizer.dequantize(
                        region.index,
                        &ints,
                        scale,
                        zero,
                        Some(blank),
                        null_value,
                    );
                    return Ok(float_tile(pixel_type, values));
                }
                _ => params
                    .compression
                    .decompress_tile(bytes, pixel_type, &region.shape)?,
            }
        }
    };

    if let Some(value) = blank_substitution {
        match record.blank.or(fixed_blank) {
            _ if pixel_type.is_float() => substitute_nan(&mut tile, value),
            Some(blank) => substitute_blank(&mut tile, blank as i64, value),
            None => {}
        }
    }
    Ok(tile)
}

fn replace_matching<T: Copy + Into<i64>>(pixels: &mut [T], blank: i64, value: T) {
    pixels
        .iter_mut()
        .filter(|p| (**p).into() == blank)
        .for_each(|p| *p = value);
}

fn substitute_blank(tile: &mut ImageData, blank: i64, value: f64) {
    match tile {
        ImageData::U8(v) => replace_matching(v, blank, value as u8),
        ImageData::I16(v) => replace_matching(v, blank, value as i16),
        ImageData::I32(v) => replace_matching(v, blank, value as i32),
        ImageData::I64(v) => replace_matching(v, blank, value as i64),
        ImageData::F32(_) | ImageData::F64(_) => {}
    }
}

fn substitute_nan(tile: &mut ImageData, value: f64) {
    match tile {
        ImageData::F32(v) => v
            .iter_mut()
            .filter(|p| p.is_nan())
            .for_each(|p| *p = value as f32),
        ImageData::F64(v) => v.iter_mut().filter(|p| p.is_nan()).for_each(|p| *p = value),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_i16(n: usize) -> ImageData {
        ImageData::I16((0..n as i16).map(|i| i * 3 - 40).collect())
    }

    #[test]
    fn integer_image_round_trip() {
        let geometry = TileGeometry::new(&[10, 6], &[4, 4]).unwrap();
        let image = ramp_i16(60);
        let params = CompressionParameters::new(Compression::rice());
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert_eq!(compressed.ntiles(), 6);
        assert!(compressed.compressed_data().iter().all(Option::is_some));
        assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
    }

    #[test]
    fn nocompress_keeps_raw_tiles() {
        let geometry = TileGeometry::row_tiles(&[5, 2]).unwrap();
        let image = ramp_i16(10);
        let params = CompressionParameters::new(Compression::Uncompressed);
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert!(compressed.uncompressed_data().iter().all(Option::is_some));
        assert_eq!(compressed.stored_len(), 20);
        assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
    }

    #[test]
    fn image_length_must_match_geometry() {
        let geometry = TileGeometry::row_tiles(&[5, 2]).unwrap();
        let params = CompressionParameters::default();
        assert!(matches!(
            compress(&ramp_i16(9), &geometry, &params),
            Err(Error::InvalidDimension(_))
        ));
    }

    #[test]
    fn plio_shift_moves_quantized_values_above_zero() {
        let mut values = vec![-3, NULL_VALUE, 5, -1];
        let mut zero = 10.0;
        assert!(shift_into_plio_range(&mut values, 0.5, &mut zero));
        assert_eq!(values, vec![1, 0, 9, 3]);
        assert_eq!(zero, 8.0);

        let mut all_blank = vec![NULL_VALUE; 3];
        assert!(shift_into_plio_range(&mut all_blank, 1.0, &mut zero));
        assert_eq!(all_blank, vec![0; 3]);

        let mut too_wide = vec![0, PLIO_MAX_VALUE as i32];
        assert!(!shift_into_plio_range(&mut too_wide, 1.0, &mut zero));
        let mut exact_zero = vec![4, ZERO_VALUE];
        assert!(!shift_into_plio_range(&mut exact_zero, 1.0, &mut zero));
    }

    #[test]
    fn plio_float_tiles_with_blanks_use_zero_blank() {
        let mut values: Vec<f32> =
            (0..32).map(|i| ((i % 8) * (i % 8)) as f32 * 0.25 + 50.0).collect();
        values[2] = f32::NAN;
        let image = ImageData::F32(values.clone());
        let geometry = TileGeometry::row_tiles(&[8, 4]).unwrap();
        let params = CompressionParameters::new(Compression::Plio);
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert!(compressed.compressed_data().iter().all(Option::is_some));
        assert_eq!(compressed.blanks(), vec![Some(0), None, None, None]);

        let ImageData::F32(decoded) = decompress(&compressed, &params, None).unwrap() else {
            panic!("expected a float image");
        };
        assert!(decoded[2].is_nan());
        for (k, (x, y)) in values.iter().zip(&decoded).enumerate() {
            let scale = compressed.tiles[k / 8].scale.unwrap();
            if !x.is_nan() {
                assert!(((x - y).abs() as f64) <= scale, "pixel {k}: {x} vs {y}");
            }
        }
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn parallel_tiles_keep_order_and_report_failures() {
        let squares = map_tiles(200, |t| Ok(t * t)).unwrap();
        assert_eq!(squares, (0..200).map(|t| t * t).collect::<Vec<_>>());

        let failed = map_tiles(200, |t| {
            if t % 50 == 49 {
                Err(Error::bad_data("PLIO_1", "negative pixel").at_tile(t))
            } else {
                Ok(t)
            }
        });
        assert!(matches!(
            failed,
            Err(Error::BadDataType { tile: Some(t), .. }) if t % 50 == 49
        ));

        let geometry = TileGeometry::new(&[64, 64], &[8, 8]).unwrap();
        let image = ImageData::I32((0..64 * 64).map(|i| i % 1000).collect());
        let params = CompressionParameters::new(Compression::rice());
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
    }

    #[test]
    fn codec_errors_carry_the_tile_index() {
        let geometry = TileGeometry::row_tiles(&[4, 3]).unwrap();
        let image = ImageData::I32(vec![0, 1, 2, 3, 4, 5, 6, 7, 8, -9, 10, 11]);
        let params = CompressionParameters::new(Compression::Plio);
        let err = compress(&image, &geometry, &params).unwrap_err();
        assert!(matches!(err, Error::BadDataType { tile: Some(2), .. }));
    }

    #[test]
    fn corrupt_tile_reports_its_index() {
        let geometry = TileGeometry::row_tiles(&[8, 3]).unwrap();
        let image = ImageData::I32((0..24).collect());
        let params = CompressionParameters::new(Compression::Gzip1);
        let mut compressed = compress(&image, &geometry, &params).unwrap();
        compressed.tiles[1].payload = Some(TilePayload::Compressed(vec![0x1f, 0x8b, 0, 0]));
        let err = decompress(&compressed, &params, None).unwrap_err();
        assert!(matches!(err, Error::CorruptData { tile: Some(1), .. }));
    }

    #[test]
    fn missing_tile_is_reported() {
        let geometry = TileGeometry::row_tiles(&[8, 2]).unwrap();
        let image = ImageData::I32((0..16).collect());
        let params = CompressionParameters::new(Compression::Gzip2);
        let mut compressed = compress(&image, &geometry, &params).unwrap();
        compressed.tiles[1] = TileRecord::default();
        assert_eq!(
            decompress(&compressed, &params, None),
            Err(Error::NoCompressedTile(1))
        );
        compressed.tiles[1] = TileRecord::compressed(Vec::new());
        assert_eq!(
            decompress(&compressed, &params, None),
            Err(Error::NoCompressedTile(1))
        );
    }

    #[test]
    fn mismatched_uncompressed_tile_is_corrupt() {
        let geometry = TileGeometry::row_tiles(&[4, 2]).unwrap();
        let image = ImageData::I32((0..8).collect());
        let params = CompressionParameters::new(Compression::Uncompressed);
        let mut compressed = compress(&image, &geometry, &params).unwrap();
        compressed.tiles[0] = TileRecord::uncompressed(ImageData::I32(vec![1, 2, 3]));
        assert!(matches!(
            decompress(&compressed, &params, None),
            Err(Error::CorruptData { tile: Some(0), .. })
        ));
    }

    #[test]
    fn integer_blanks_substituted_on_request() {
        let geometry = TileGeometry::row_tiles(&[6]).unwrap();
        let image = ImageData::I16(vec![1, -999, 3, -999, 5, 6]);
        let params =
            CompressionParameters::new(Compression::rice()).with_blank(BlankMode::Fixed(-999));
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
        assert_eq!(
            decompress(&compressed, &params, Some(0.0)).unwrap(),
            ImageData::I16(vec![1, 0, 3, 0, 5, 6])
        );
    }

    #[test]
    fn lossless_gzip_float_tiles() {
        let geometry = TileGeometry::row_tiles(&[3, 2]).unwrap();
        let image = ImageData::F32(vec![0.1, f32::NAN, 2.5, -7.25, 1e30, 0.0]);
        let params = CompressionParameters::new(Compression::Gzip2).with_quantize_level(0.0);
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert_eq!(compressed.scales(), vec![None, None]);
        let back = decompress(&compressed, &params, None).unwrap();
        assert_eq!(back.to_be_bytes(), image.to_be_bytes());
        let filled = decompress(&compressed, &params, Some(-1.0)).unwrap();
        assert_eq!(filled, ImageData::F32(vec![0.1, -1.0, 2.5, -7.25, 1e30, 0.0]));
    }

    #[test]
    fn unquantized_rice_float_tiles_fall_back() {
        let geometry = TileGeometry::row_tiles(&[3]).unwrap();
        let image = ImageData::F64(vec![1.0, 2.0, 4.0]);
        let params = CompressionParameters::new(Compression::rice()).with_quantize_level(0.0);
        let compressed = compress(&image, &geometry, &params).unwrap();
        assert_eq!(compressed.uncompressed_data(), vec![Some(&image)]);
        assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
    }

    #[test]
    fn columns_round_trip() {
        let geometry = TileGeometry::row_tiles(&[16, 3]).unwrap();
        let mut values: Vec<f32> = (0..48).map(|i| (i as f32 * 0.37).sin() * 50.0).collect();
        // Constant last row cannot be quantized and stays uncompressed.
        values[32..].iter_mut().for_each(|v| *v = 3.0);
        values[5] = f32::NAN;
        let image = ImageData::F32(values);
        let params = CompressionParameters::new(Compression::rice());
        let compressed = compress(&image, &geometry, &params).unwrap();

        let columns = compressed.to_columns();
        assert_eq!(columns.compressed[2], Vec::<u8>::new());
        assert_eq!(columns.blank.as_deref(), Some(&[NULL_VALUE; 3][..]));

        let rebuilt = CompressedImage::from_columns(PixelType::F32, geometry, columns).unwrap();
        let a = decompress(&compressed, &params, Some(-5.0)).unwrap();
        let b = decompress(&rebuilt, &params, Some(-5.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn column_lengths_are_checked() {
        let geometry = TileGeometry::row_tiles(&[4, 2]).unwrap();
        let columns = TileColumns {
            compressed: vec![vec![1]],
            ..Default::default()
        };
        assert!(matches!(
            CompressedImage::from_columns(PixelType::I32, geometry, columns),
            Err(Error::InvalidValue(_))
        ));
    }
}
