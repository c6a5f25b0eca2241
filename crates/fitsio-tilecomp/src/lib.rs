//! Pure Rust FITS tiled image compression.
//!
//! An image is cut into a grid of tiles ([`TileGeometry`]); every tile is
//! coded independently with one of the standard FITS tile codecs (`RICE_1`,
//! `GZIP_1`, `GZIP_2`, `PLIO_1`, `HCOMPRESS_1`). Float images are quantized
//! to integers first, with optional subtractive dithering.
//!
//! ```
//! use fitsio_tilecomp::{
//!     compress, decompress, Compression, CompressionParameters, ImageData, TileGeometry,
//! };
//!
//! let geometry = TileGeometry::new(&[64, 64], &[32, 32]).unwrap();
//! let image = ImageData::I16((0..64 * 64).map(|i| (i % 97) as i16).collect());
//! let params = CompressionParameters::new(Compression::rice());
//!
//! let compressed = compress(&image, &geometry, &params).unwrap();
//! assert_eq!(compressed.ntiles(), 4);
//! assert_eq!(decompress(&compressed, &params, None).unwrap(), image);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bits;
pub mod codec;
pub mod endian;
pub mod error;
pub mod geometry;
pub mod keywords;
pub mod params;
pub mod pixel;
pub mod quantize;
pub mod store;

pub use error::{Error, Result};
pub use geometry::{TileGeometry, TileRegion, MAX_COMPRESS_DIM};
pub use keywords::{Keyword, Value};
pub use params::{
    BlankMode, Compression, CompressionParameters, QuantizeMethod, ScaleMode, TiledImageHeader,
};
pub use pixel::{ImageData, PixelType};
pub use quantize::Quantizer;
pub use store::{compress, decompress, CompressedImage, TileColumns, TilePayload, TileRecord};
