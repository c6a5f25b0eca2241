//! Pixel element types and typed element buffers.
//!
//! Images and tiles are carried as an [`ImageData`] enum tagged by the FITS
//! BITPIX code, so every codec can match on the element type it receives.

use alloc::vec::Vec;

use bytemuck::pod_collect_to_vec;

use crate::endian::swap_to_be;
use crate::error::{Error, Result};
use crate::geometry::{TileGeometry, TileRegion};

/// Element type of an image, keyed by the FITS BITPIX code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl PixelType {
    /// Map a BITPIX / ZBITPIX value to its element type.
    pub fn from_bitpix(bitpix: i64) -> Result<Self> {
        match bitpix {
            8 => Ok(PixelType::U8),
            16 => Ok(PixelType::I16),
            32 => Ok(PixelType::I32),
            64 => Ok(PixelType::I64),
            -32 => Ok(PixelType::F32),
            -64 => Ok(PixelType::F64),
            other => Err(Error::InvalidBitpix(other)),
        }
    }

    pub fn bitpix(self) -> i64 {
        match self {
            PixelType::U8 => 8,
            PixelType::I16 => 16,
            PixelType::I32 => 32,
            PixelType::I64 => 64,
            PixelType::F32 => -32,
            PixelType::F64 => -64,
        }
    }

    /// Number of bytes per element.
    pub fn byte_width(self) -> usize {
        (self.bitpix().unsigned_abs() / 8) as usize
    }

    pub fn is_float(self) -> bool {
        matches!(self, PixelType::F32 | PixelType::F64)
    }

    /// Narrow an integer to this element type the way an `as` cast would,
    /// returning the widened result.
    ///
    /// A value survives a trip through this type exactly when
    /// `narrow(v) == v`.
    pub fn narrow(self, value: i64) -> i64 {
        match self {
            PixelType::U8 => value as u8 as i64,
            PixelType::I16 => value as i16 as i64,
            PixelType::I32 => value as i32 as i64,
            _ => value,
        }
    }
}

/// Image or tile pixel data, typed by BITPIX.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

fn zeroed_vec<T: Copy + Default>(len: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)?;
    v.resize(len, T::default());
    Ok(v)
}

fn decode_be<T: bytemuck::Pod>(raw: &[u8], from_be: impl Fn(T) -> T) -> Vec<T> {
    let mut values: Vec<T> = pod_collect_to_vec(raw);
    for v in &mut values {
        *v = from_be(*v);
    }
    values
}

impl ImageData {
    /// A zero-filled buffer of `len` elements.
    pub fn zeroed(pixel_type: PixelType, len: usize) -> Result<Self> {
        Ok(match pixel_type {
            PixelType::U8 => ImageData::U8(zeroed_vec(len)?),
            PixelType::I16 => ImageData::I16(zeroed_vec(len)?),
            PixelType::I32 => ImageData::I32(zeroed_vec(len)?),
            PixelType::I64 => ImageData::I64(zeroed_vec(len)?),
            PixelType::F32 => ImageData::F32(zeroed_vec(len)?),
            PixelType::F64 => ImageData::F64(zeroed_vec(len)?),
        })
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            ImageData::U8(_) => PixelType::U8,
            ImageData::I16(_) => PixelType::I16,
            ImageData::I32(_) => PixelType::I32,
            ImageData::I64(_) => PixelType::I64,
            ImageData::F32(_) => PixelType::F32,
            ImageData::F64(_) => PixelType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImageData::U8(v) => v.len(),
            ImageData::I16(v) => v.len(),
            ImageData::I32(v) => v.len(),
            ImageData::I64(v) => v.len(),
            ImageData::F32(v) => v.len(),
            ImageData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the elements as big-endian bytes.
    pub fn to_be_bytes(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = match self {
            ImageData::U8(v) => v.clone(),
            ImageData::I16(v) => pod_collect_to_vec(v.as_slice()),
            ImageData::I32(v) => pod_collect_to_vec(v.as_slice()),
            ImageData::I64(v) => pod_collect_to_vec(v.as_slice()),
            ImageData::F32(v) => pod_collect_to_vec(v.as_slice()),
            ImageData::F64(v) => pod_collect_to_vec(v.as_slice()),
        };
        swap_to_be(&mut buf, self.pixel_type().byte_width());
        buf
    }

    /// Decode big-endian element bytes into a typed buffer.
    ///
    /// Trailing bytes that do not form a whole element are an error.
    pub fn from_be_bytes(pixel_type: PixelType, raw: &[u8]) -> Result<Self> {
        if raw.len() % pixel_type.byte_width() != 0 {
            return Err(Error::InvalidValue("byte length is not a whole number of elements"));
        }
        Ok(match pixel_type {
            PixelType::U8 => ImageData::U8(raw.to_vec()),
            PixelType::I16 => ImageData::I16(decode_be(raw, i16::from_be)),
            PixelType::I32 => ImageData::I32(decode_be(raw, i32::from_be)),
            PixelType::I64 => ImageData::I64(decode_be(raw, i64::from_be)),
            PixelType::F32 => ImageData::F32(decode_be(raw, |v: f32| {
                f32::from_bits(u32::from_be(v.to_bits()))
            })),
            PixelType::F64 => ImageData::F64(decode_be(raw, |v: f64| {
                f64::from_bits(u64::from_be(v.to_bits()))
            })),
        })
    }

    /// Widen integer elements to `i64`. Returns `None` for float data.
    pub fn to_integers(&self) -> Option<Vec<i64>> {
        match self {
            ImageData::U8(v) => Some(v.iter().map(|&p| p as i64).collect()),
            ImageData::I16(v) => Some(v.iter().map(|&p| p as i64).collect()),
            ImageData::I32(v) => Some(v.iter().map(|&p| p as i64).collect()),
            ImageData::I64(v) => Some(v.clone()),
            ImageData::F32(_) | ImageData::F64(_) => None,
        }
    }

    /// Build a buffer of an integer type from `i64` values, narrowing with
    /// `as` casts. Float targets are rejected.
    pub fn from_integers(pixel_type: PixelType, values: &[i64]) -> Result<Self> {
        match pixel_type {
            PixelType::U8 => Ok(ImageData::U8(values.iter().map(|&v| v as u8).collect())),
            PixelType::I16 => Ok(ImageData::I16(values.iter().map(|&v| v as i16).collect())),
            PixelType::I32 => Ok(ImageData::I32(values.iter().map(|&v| v as i32).collect())),
            PixelType::I64 => Ok(ImageData::I64(values.to_vec())),
            PixelType::F32 | PixelType::F64 => {
                Err(Error::InvalidValue("integer buffer requested for a float type"))
            }
        }
    }

    /// Convert every element to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ImageData::U8(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I16(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I32(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::I64(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::F32(v) => v.iter().map(|&p| p as f64).collect(),
            ImageData::F64(v) => v.clone(),
        }
    }

    /// Copy the elements of one tile out of a full image buffer.
    pub fn gather(&self, geometry: &TileGeometry, region: &TileRegion) -> Result<Self> {
        Ok(match self {
            ImageData::U8(v) => ImageData::U8(geometry.gather(region, v)?),
            ImageData::I16(v) => ImageData::I16(geometry.gather(region, v)?),
            ImageData::I32(v) => ImageData::I32(geometry.gather(region, v)?),
            ImageData::I64(v) => ImageData::I64(geometry.gather(region, v)?),
            ImageData::F32(v) => ImageData::F32(geometry.gather(region, v)?),
            ImageData::F64(v) => ImageData::F64(geometry.gather(region, v)?),
        })
    }

    /// Write one tile's elements back into a full image buffer.
    ///
    /// Both buffers must hold the same element type.
    pub fn scatter(
        &mut self,
        geometry: &TileGeometry,
        region: &TileRegion,
        tile: &ImageData,
    ) -> Result<()> {
        match (self, tile) {
            (ImageData::U8(dst), ImageData::U8(src)) => geometry.scatter(region, src, dst),
            (ImageData::I16(dst), ImageData::I16(src)) => geometry.scatter(region, src, dst),
            (ImageData::I32(dst), ImageData::I32(src)) => geometry.scatter(region, src, dst),
            (ImageData::I64(dst), ImageData::I64(src)) => geometry.scatter(region, src, dst),
            (ImageData::F32(dst), ImageData::F32(src)) => geometry.scatter(region, src, dst),
            (ImageData::F64(dst), ImageData::F64(src)) => geometry.scatter(region, src, dst),
            _ => Err(Error::InvalidValue("tile element type does not match the image")),
        }
    }
}
