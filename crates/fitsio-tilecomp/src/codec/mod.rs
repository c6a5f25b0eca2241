//! Per-tile codecs.
//!
//! Each codec module exposes a public slice-level API (`rice_compress`,
//! `gzip_decompress`, ...) and crate-private `compress`/`decompress` entry
//! points working on [`ImageData`] tiles. [`Compression`] dispatches to them.

pub mod gzip;
pub mod hcompress;
pub mod plio;
pub mod rice;

use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::params::Compression;
use crate::pixel::{ImageData, PixelType};

impl Compression {
    /// Compress one tile of shape `shape`.
    ///
    /// Float tiles are accepted only by the GZIP codecs and `NOCOMPRESS`;
    /// the other codecs expect quantized `I32` tiles.
    pub fn compress_tile(&self, tile: &ImageData, shape: &[usize]) -> Result<Vec<u8>> {
        match *self {
            Compression::Rice { blocksize, bytepix } => rice::compress(tile, blocksize, bytepix),
            Compression::Gzip1 => gzip::compress(tile, false),
            Compression::Gzip2 => gzip::compress(tile, true),
            Compression::Plio => plio::compress(tile),
            Compression::Hcompress { scale, .. } => hcompress::compress(tile, shape, scale),
            Compression::Uncompressed => Ok(tile.to_be_bytes()),
        }
    }

    /// Decompress one tile of shape `shape` into `pixel_type` elements.
    pub fn decompress_tile(
        &self,
        compressed: &[u8],
        pixel_type: PixelType,
        shape: &[usize],
    ) -> Result<ImageData> {
        let count = shape.iter().product();
        let tile = match *self {
            Compression::Rice { blocksize, bytepix } => {
                rice::decompress(compressed, pixel_type, count, blocksize, bytepix)?
            }
            Compression::Gzip1 => gzip::decompress(compressed, pixel_type, count, false)?,
            Compression::Gzip2 => gzip::decompress(compressed, pixel_type, count, true)?,
            Compression::Plio => plio::decompress(compressed, pixel_type, count)?,
            Compression::Hcompress { smooth, .. } => {
                hcompress::decompress(compressed, pixel_type, shape, smooth)?
            }
            Compression::Uncompressed => ImageData::from_be_bytes(pixel_type, compressed)?,
        };
        if tile.len() != count {
            return Err(Error::corrupt(
                self.name(),
                "decoded pixel count does not match the tile",
            ));
        }
        Ok(tile)
    }
}
