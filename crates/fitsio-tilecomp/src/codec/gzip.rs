//! GZIP_1 and GZIP_2 tile coding.
//!
//! Tiles are serialized as big-endian element bytes and wrapped in a single
//! gzip member. GZIP_2 additionally shuffles the bytes into planes before
//! deflating.

use alloc::vec::Vec;

use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::{decompress_to_vec_with_limit, decompress_to_vec_zlib_with_limit};

use crate::endian::{shuffle_bytes, unshuffle_bytes};
use crate::error::{Error, Result};
use crate::pixel::{ImageData, PixelType};

const DEFLATE_LEVEL: u8 = 6;

const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

fn codec_name(shuffle: bool) -> &'static str {
    if shuffle {
        "GZIP_2"
    } else {
        "GZIP_1"
    }
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB88320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFFFFFF_u32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    !crc
}

/// Wrap `data` in a gzip member.
pub fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let deflated = compress_to_vec(data, DEFLATE_LEVEL);
    let mut out = Vec::with_capacity(deflated.len() + 18);
    // No flags, zero mtime, default compression, Unix.
    out.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0x03]);
    out.extend_from_slice(&deflated);
    out.extend_from_slice(&crc32(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

/// Strip the gzip header and trailer, returning the raw deflate payload.
fn strip_gzip_header<'a>(data: &'a [u8], codec: &'static str) -> Result<&'a [u8]> {
    let bad_header = || Error::corrupt(codec, "malformed gzip header");
    if data.len() < 18 || data[0] != 0x1f || data[1] != 0x8b || data[2] != 0x08 {
        return Err(bad_header());
    }
    let flg = data[3];
    let mut pos = 10usize;
    if flg & FEXTRA != 0 {
        if pos + 2 > data.len() {
            return Err(bad_header());
        }
        let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2 + xlen;
    }
    if flg & FNAME != 0 {
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & FCOMMENT != 0 {
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & FHCRC != 0 {
        pos += 2;
    }
    if data.len() < pos + 8 {
        return Err(bad_header());
    }
    Ok(&data[pos..data.len() - 8])
}

/// Inflate a tile payload of at most `max_len` bytes. Errors name `codec`.
///
/// A gzip member has its CRC-32 and length checked; zlib and raw deflate
/// streams are accepted as well.
pub fn gzip_decompress(compressed: &[u8], max_len: usize, codec: &'static str) -> Result<Vec<u8>> {
    let inflate_failed = |_| Error::corrupt(codec, "deflate stream is invalid or too long");

    if compressed.len() >= 2 && compressed[0] == 0x1f && compressed[1] == 0x8b {
        let payload = strip_gzip_header(compressed, codec)?;
        let out = decompress_to_vec_with_limit(payload, max_len).map_err(inflate_failed)?;
        let trailer = &compressed[compressed.len() - 8..];
        let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let stored_len = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
        if stored_crc != crc32(&out) {
            return Err(Error::corrupt(codec, "gzip CRC mismatch"));
        }
        if stored_len != out.len() as u32 {
            return Err(Error::corrupt(codec, "gzip length mismatch"));
        }
        return Ok(out);
    }

    decompress_to_vec_zlib_with_limit(compressed, max_len)
        .or_else(|_| decompress_to_vec_with_limit(compressed, max_len))
        .map_err(inflate_failed)
}

/// Deflate one tile.
pub(crate) fn compress(tile: &ImageData, shuffle: bool) -> Result<Vec<u8>> {
    let bytes = tile.to_be_bytes();
    let bytes = if shuffle {
        shuffle_bytes(&bytes, tile.pixel_type().byte_width())
    } else {
        bytes
    };
    Ok(gzip_compress(&bytes))
}

/// Inflate one tile of `count` elements.
pub(crate) fn decompress(
    compressed: &[u8],
    pixel_type: PixelType,
    count: usize,
    shuffle: bool,
) -> Result<ImageData> {
    let name = codec_name(shuffle);
    let width = pixel_type.byte_width();
    let raw = gzip_decompress(compressed, count * width.max(4), name)?;

    if raw.len() == count * width {
        let raw = if shuffle {
            unshuffle_bytes(&raw, width)
        } else {
            raw
        };
        return ImageData::from_be_bytes(pixel_type, &raw)
            .map_err(|_| Error::corrupt(name, "partial element in tile"));
    }

    // Some writers store 8- and 16-bit tiles as 32-bit words.
    if !pixel_type.is_float() && width < 4 && raw.len() == count * 4 {
        let raw = if shuffle { unshuffle_bytes(&raw, 4) } else { raw };
        let wide = ImageData::from_be_bytes(PixelType::I32, &raw)
            .map_err(|_| Error::corrupt(name, "partial element in tile"))?;
        let values = wide
            .to_integers()
            .ok_or_else(|| Error::corrupt(name, "partial element in tile"))?;
        return ImageData::from_integers(pixel_type, &values);
    }

    Err(Error::corrupt(name, "decompressed length does not match the tile"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32() {
        assert_eq!(crc32(b""), 0);
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_member_layout() {
        let member = gzip_compress(b"tile bytes");
        assert_eq!(&member[..4], &[0x1f, 0x8b, 0x08, 0x00]);
        let n = member.len();
        assert_eq!(&member[n - 4..], &10u32.to_le_bytes());
        assert_eq!(&member[n - 8..n - 4], &crc32(b"tile bytes").to_le_bytes());
        assert_eq!(gzip_decompress(&member, 10, "GZIP_1").unwrap(), b"tile bytes");
    }

    #[test]
    fn test_zlib_and_raw_streams_accepted() {
        let data: Vec<u8> = (0..200u8).collect();
        let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&data, 6);
        assert_eq!(gzip_decompress(&zlib, 200, "GZIP_1").unwrap(), data);
        let raw = compress_to_vec(&data, 6);
        assert_eq!(gzip_decompress(&raw, 200, "GZIP_1").unwrap(), data);
    }

    #[test]
    fn test_crc_mismatch_is_corrupt() {
        let mut member = gzip_compress(b"some data to protect");
        let n = member.len();
        member[n - 8] ^= 0xFF;
        assert!(matches!(
            gzip_decompress(&member, 100, "GZIP_1"),
            Err(Error::CorruptData { codec: "GZIP_1", .. })
        ));
        assert!(matches!(
            gzip_decompress(&member, 100, "GZIP_2"),
            Err(Error::CorruptData { codec: "GZIP_2", .. })
        ));
    }

    #[test]
    fn test_i16_round_trip() {
        let tile = ImageData::I16((-500..500).collect());
        for shuffle in [false, true] {
            let compressed = compress(&tile, shuffle).unwrap();
            assert_eq!(
                decompress(&compressed, PixelType::I16, 1000, shuffle).unwrap(),
                tile
            );
        }
    }

    #[test]
    fn test_float_round_trip_is_bit_exact() {
        let tile = ImageData::F64(vec![1.5, f64::NAN, -0.0, 1e300, f64::MIN_POSITIVE]);
        let compressed = compress(&tile, true).unwrap();
        let back = decompress(&compressed, PixelType::F64, 5, true).unwrap();
        assert_eq!(back.to_be_bytes(), tile.to_be_bytes());
    }

    #[test]
    fn test_shuffle_helps_smooth_data() {
        let tile = ImageData::I32((0..4096).map(|i| 100_000 + i).collect());
        let plain = compress(&tile, false).unwrap();
        let shuffled = compress(&tile, true).unwrap();
        assert!(shuffled.len() < plain.len());
    }

    #[test]
    fn test_wide_words_for_narrow_type() {
        let words = ImageData::I32(vec![1, -2, 300]);
        let compressed = compress(&words, false).unwrap();
        let back = decompress(&compressed, PixelType::I16, 3, false).unwrap();
        assert_eq!(back, ImageData::I16(vec![1, -2, 300]));
    }

    #[test]
    fn test_length_mismatch_is_corrupt() {
        let tile = ImageData::I32(vec![1, 2, 3]);
        let compressed = compress(&tile, false).unwrap();
        assert!(matches!(
            decompress(&compressed, PixelType::I32, 4, false),
            Err(Error::CorruptData { codec: "GZIP_1", .. })
        ));
        assert!(matches!(
            decompress(&compressed, PixelType::I32, 2, true),
            Err(Error::CorruptData { codec: "GZIP_2", .. })
        ));
        let mut damaged = compress(&tile, true).unwrap();
        damaged[4..].iter_mut().for_each(|b| *b ^= 0x5A);
        assert!(matches!(
            decompress(&damaged, PixelType::I32, 3, true),
            Err(Error::CorruptData { codec: "GZIP_2", .. })
        ));
    }
}
