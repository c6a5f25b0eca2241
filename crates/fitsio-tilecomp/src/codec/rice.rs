//! Rice (RICE_1) tile coding.
//!
//! The first pixel is stored verbatim. The remaining pixels are coded in
//! blocks of `blocksize` differences: each block picks the Golomb-Rice split
//! `fs` that best fits its mean zig-zagged difference, with two escape codes
//! for all-zero blocks and for blocks stored as raw differences.

use alloc::vec::Vec;

use crate::bits::{BitReader, BitWriter};
use crate::error::{Error, Result};
use crate::pixel::{ImageData, PixelType};

const NAME: &str = "RICE_1";

/// Default number of pixels per coding block.
pub const DEFAULT_BLOCKSIZE: usize = 32;

struct RiceParams {
    fsbits: u32,
    fsmax: u32,
    bbits: u32,
}

impl RiceParams {
    fn for_bytepix(rice_bytepix: usize) -> Result<Self> {
        match rice_bytepix {
            1 => Ok(RiceParams {
                fsbits: 3,
                fsmax: 6,
                bbits: 8,
            }),
            2 => Ok(RiceParams {
                fsbits: 4,
                fsmax: 14,
                bbits: 16,
            }),
            4 => Ok(RiceParams {
                fsbits: 5,
                fsmax: 25,
                bbits: 32,
            }),
            _ => Err(Error::InvalidValue("Rice BYTEPIX must be 1, 2 or 4")),
        }
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bbits) - 1
    }

    /// Sign-extend the low `bbits` bits of `v`.
    fn wrap(&self, v: i64) -> i64 {
        let shift = 64 - self.bbits;
        (v << shift) >> shift
    }
}

fn zigzag(diff: i64) -> u64 {
    if diff >= 0 {
        (diff as u64) << 1
    } else {
        (diff.unsigned_abs() << 1) - 1
    }
}

fn unzigzag(z: u64) -> i64 {
    if z & 1 == 0 {
        (z >> 1) as i64
    } else {
        -((z >> 1) as i64) - 1
    }
}

fn truncated() -> Error {
    Error::corrupt(NAME, "truncated Rice stream")
}

/// Rice-code integer pixel values in `bytepix`-wide arithmetic.
///
/// Values are reduced modulo `2^(8 * bytepix)`; callers check beforehand
/// that nothing is lost.
pub fn rice_compress(values: &[i64], blocksize: usize, bytepix: usize) -> Result<Vec<u8>> {
    let params = RiceParams::for_bytepix(bytepix)?;
    if blocksize == 0 {
        return Err(Error::InvalidValue("Rice block size must be positive"));
    }
    let capacity = values.len() * bytepix + values.len() / blocksize + 6;
    let mut writer = BitWriter::with_capacity(capacity);
    let Some(&first) = values.first() else {
        return Ok(writer.finish());
    };

    writer.write_bits((first as u64 & params.mask()) as u32, params.bbits);
    let mut lastpix = params.wrap(first);
    let mut diffs = Vec::with_capacity(blocksize);

    for block in values.chunks(blocksize) {
        diffs.clear();
        let mut pixelsum = 0u64;
        for &v in block {
            let v = params.wrap(v);
            let z = zigzag(params.wrap(v - lastpix));
            lastpix = v;
            pixelsum += z;
            diffs.push(z);
        }

        let n = block.len();
        let dpsum = ((pixelsum as f64) - (n / 2) as f64 - 1.0) / n as f64;
        let psum = (dpsum.max(0.0) as u64) >> 1;
        let fs = 64 - psum.leading_zeros();

        if fs >= params.fsmax {
            writer.write_bits(params.fsmax + 1, params.fsbits);
            for &z in &diffs {
                writer.write_bits(z as u32, params.bbits);
            }
        } else if fs == 0 && pixelsum == 0 {
            writer.write_bits(0, params.fsbits);
        } else {
            writer.write_bits(fs + 1, params.fsbits);
            let low_mask = (1u64 << fs) - 1;
            for &z in &diffs {
                writer.write_zeros(z >> fs);
                writer.write_bits(1, 1);
                writer.write_bits((z & low_mask) as u32, fs);
            }
        }
    }

    Ok(writer.finish())
}

/// Decode `num_pixels` Rice-coded values, sign-extended from `bytepix` bytes.
pub fn rice_decompress(
    compressed: &[u8],
    num_pixels: usize,
    blocksize: usize,
    bytepix: usize,
) -> Result<Vec<i64>> {
    let params = RiceParams::for_bytepix(bytepix)?;
    if blocksize == 0 {
        return Err(Error::InvalidValue("Rice block size must be positive"));
    }
    let mut output = Vec::new();
    output.try_reserve_exact(num_pixels)?;
    if num_pixels == 0 {
        return Ok(output);
    }

    let mut reader = BitReader::new(compressed);
    let first = reader.read_bits(params.bbits).ok_or_else(truncated)?;
    let mut lastpix = params.wrap(first as i64);

    while output.len() < num_pixels {
        let imax = (output.len() + blocksize).min(num_pixels);
        let code = reader.read_bits(params.fsbits).ok_or_else(truncated)?;

        if code == 0 {
            // Low entropy: every difference in the block is zero.
            output.resize(imax, lastpix);
            continue;
        }

        let fs = code - 1;
        if fs == params.fsmax {
            while output.len() < imax {
                let z = reader.read_bits(params.bbits).ok_or_else(truncated)?;
                lastpix = params.wrap(lastpix + unzigzag(z as u64));
                output.push(lastpix);
            }
        } else if fs < params.fsmax {
            while output.len() < imax {
                let nzero = reader.read_unary().ok_or_else(truncated)?;
                if nzero > params.mask() >> fs {
                    return Err(Error::corrupt(NAME, "Rice difference out of range"));
                }
                let low = reader.read_bits(fs).ok_or_else(truncated)?;
                let z = (nzero << fs) | low as u64;
                lastpix = params.wrap(lastpix + unzigzag(z));
                output.push(lastpix);
            }
        } else {
            return Err(Error::corrupt(NAME, "invalid Rice split parameter"));
        }
    }

    Ok(output)
}

fn effective_bytepix(pixel_type: PixelType, bytepix: Option<usize>) -> Result<usize> {
    if pixel_type.is_float() {
        return Err(Error::bad_data(NAME, "Rice coding requires integer pixels"));
    }
    match bytepix.unwrap_or(pixel_type.byte_width()) {
        8 => Err(Error::bad_data(NAME, "64-bit integers cannot be Rice coded")),
        b => Ok(b),
    }
}

/// Rice-code one integer tile.
pub(crate) fn compress(
    tile: &ImageData,
    blocksize: usize,
    bytepix: Option<usize>,
) -> Result<Vec<u8>> {
    let pixel_type = tile.pixel_type();
    let bytepix = effective_bytepix(pixel_type, bytepix)?;
    let params = RiceParams::for_bytepix(bytepix)?;
    let values = tile
        .to_integers()
        .ok_or_else(|| Error::bad_data(NAME, "Rice coding requires integer pixels"))?;
    if values
        .iter()
        .any(|&v| pixel_type.narrow(params.wrap(v)) != v)
    {
        return Err(Error::bad_data(NAME, "pixel value does not fit in BYTEPIX bytes"));
    }
    rice_compress(&values, blocksize, bytepix)
}

/// Decode one Rice-coded tile of `count` pixels.
pub(crate) fn decompress(
    compressed: &[u8],
    pixel_type: PixelType,
    count: usize,
    blocksize: usize,
    bytepix: Option<usize>,
) -> Result<ImageData> {
    let bytepix = effective_bytepix(pixel_type, bytepix)?;
    let values = rice_decompress(compressed, count, blocksize, bytepix)?;
    ImageData::from_integers(pixel_type, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rice_params() {
        let p8 = RiceParams::for_bytepix(1).unwrap();
        assert_eq!(p8.fsbits, 3);
        assert_eq!(p8.fsmax, 6);

        let p16 = RiceParams::for_bytepix(2).unwrap();
        assert_eq!(p16.fsbits, 4);
        assert_eq!(p16.fsmax, 14);

        let p32 = RiceParams::for_bytepix(4).unwrap();
        assert_eq!(p32.fsbits, 5);
        assert_eq!(p32.fsmax, 25);

        assert!(RiceParams::for_bytepix(3).is_err());
    }

    #[test]
    fn test_wrap_sign_extends() {
        let p = RiceParams::for_bytepix(1).unwrap();
        assert_eq!(p.wrap(200), -56);
        assert_eq!(p.wrap(-1), -1);
        let p = RiceParams::for_bytepix(4).unwrap();
        assert_eq!(p.wrap(i32::MAX as i64 + 1), i32::MIN as i64);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(i32::MIN as i64), u32::MAX as u64);
        for d in [-5i64, 0, 7, -100_000] {
            assert_eq!(unzigzag(zigzag(d)), d);
        }
    }

    #[test]
    fn test_rice_low_entropy() {
        // First pixel 42 as a big-endian i16, then FS code 0000 for each block.
        let data = vec![0u8, 42, 0x00];
        let result = rice_decompress(&data, 5, 4, 2).unwrap();
        assert_eq!(result, vec![42, 42, 42, 42, 42]);
    }

    #[test]
    fn test_constant_block_uses_low_entropy_code() {
        let values = vec![7i64; 64];
        let compressed = rice_compress(&values, 32, 2).unwrap();
        // 16-bit first pixel plus two 4-bit zero codes.
        assert_eq!(compressed, vec![0x00, 0x07, 0x00]);
    }

    #[test]
    fn test_round_trip_smooth_ramp() {
        let values: Vec<i64> = (0..100).map(|i| 1000 + i * 3 + (i % 5)).collect();
        let compressed = rice_compress(&values, 32, 4).unwrap();
        assert!(compressed.len() < values.len() * 4);
        assert_eq!(rice_decompress(&compressed, 100, 32, 4).unwrap(), values);
    }

    #[test]
    fn test_round_trip_high_entropy() {
        let values: Vec<i64> = (0..70)
            .map(|i: i64| if i % 2 == 0 { i32::MAX as i64 } else { i32::MIN as i64 + i })
            .collect();
        let compressed = rice_compress(&values, 16, 4).unwrap();
        assert_eq!(rice_decompress(&compressed, 70, 16, 4).unwrap(), values);
    }

    #[test]
    fn test_round_trip_bytes() {
        let values: Vec<i64> = (0..40).map(|i| ((i * 37) % 256) as i8 as i64).collect();
        let compressed = rice_compress(&values, 32, 1).unwrap();
        assert_eq!(rice_decompress(&compressed, 40, 32, 1).unwrap(), values);
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let values: Vec<i64> = (0..64).map(|i| i * i).collect();
        let compressed = rice_compress(&values, 32, 4).unwrap();
        let cut = &compressed[..compressed.len() / 2];
        assert!(matches!(
            rice_decompress(cut, 64, 32, 4),
            Err(Error::CorruptData { .. })
        ));
        assert!(matches!(
            rice_decompress(&[], 1, 32, 4),
            Err(Error::CorruptData { .. })
        ));
    }

    #[test]
    fn test_u8_tile_round_trip() {
        let tile = ImageData::U8((0..=255).collect());
        let compressed = compress(&tile, 32, None).unwrap();
        let back = decompress(&compressed, PixelType::U8, 256, 32, None).unwrap();
        assert_eq!(back, tile);
    }

    #[test]
    fn test_narrow_bytepix_rejects_large_values() {
        let tile = ImageData::I32(vec![1, 2, 70_000]);
        assert!(matches!(
            compress(&tile, 32, Some(2)),
            Err(Error::BadDataType { .. })
        ));
        let small = ImageData::I32(vec![1, -2, 3000]);
        let compressed = compress(&small, 32, Some(2)).unwrap();
        assert_eq!(
            decompress(&compressed, PixelType::I32, 3, 32, Some(2)).unwrap(),
            small
        );
    }

    #[test]
    fn test_rejects_float_and_i64() {
        assert!(matches!(
            compress(&ImageData::F32(vec![1.0]), 32, None),
            Err(Error::BadDataType { .. })
        ));
        assert!(matches!(
            compress(&ImageData::I64(vec![1]), 32, None),
            Err(Error::BadDataType { .. })
        ));
    }
}
