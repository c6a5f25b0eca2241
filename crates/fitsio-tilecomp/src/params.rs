//! Compression parameters and their header-keyword form.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use crate::codec::rice::DEFAULT_BLOCKSIZE;
use crate::error::{Error, Result};
use crate::geometry::{TileGeometry, MAX_COMPRESS_DIM};
use crate::keywords::{find_float_keyword, find_integer_keyword, find_string_keyword, Keyword};
use crate::pixel::PixelType;
use crate::quantize::{N_RANDOM, N_RESERVED_VALUES, NULL_VALUE, ZERO_VALUE};

pub use crate::quantize::QuantizeMethod;

/// Default noise-to-step ratio for float quantization.
pub const DEFAULT_QUANTIZE_LEVEL: f32 = 4.0;

const ZNAXIS: [&str; MAX_COMPRESS_DIM] =
    ["ZNAXIS1", "ZNAXIS2", "ZNAXIS3", "ZNAXIS4", "ZNAXIS5", "ZNAXIS6"];
const ZTILE: [&str; MAX_COMPRESS_DIM] =
    ["ZTILE1", "ZTILE2", "ZTILE3", "ZTILE4", "ZTILE5", "ZTILE6"];
const ZNAME: [&str; 4] = ["ZNAME1", "ZNAME2", "ZNAME3", "ZNAME4"];
const ZVAL: [&str; 4] = ["ZVAL1", "ZVAL2", "ZVAL3", "ZVAL4"];

/// Tile compression algorithm and its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    /// `RICE_1`. `bytepix` defaults to the pixel width (4 for quantized
    /// floats).
    Rice {
        blocksize: usize,
        bytepix: Option<usize>,
    },
    /// `GZIP_1`.
    Gzip1,
    /// `GZIP_2`: GZIP over byte-shuffled pixels.
    Gzip2,
    /// `PLIO_1`.
    Plio,
    /// `HCOMPRESS_1`. A negative `scale` is a multiple of the tile noise.
    Hcompress { scale: f32, smooth: bool },
    /// `NOCOMPRESS`: every tile is stored uncompressed.
    Uncompressed,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::rice()
    }
}

impl Compression {
    pub fn rice() -> Self {
        Compression::Rice {
            blocksize: DEFAULT_BLOCKSIZE,
            bytepix: None,
        }
    }

    pub fn hcompress() -> Self {
        Compression::Hcompress {
            scale: 0.0,
            smooth: false,
        }
    }

    /// The `ZCMPTYPE` value.
    pub fn name(&self) -> &'static str {
        match self {
            Compression::Rice { .. } => "RICE_1",
            Compression::Gzip1 => "GZIP_1",
            Compression::Gzip2 => "GZIP_2",
            Compression::Plio => "PLIO_1",
            Compression::Hcompress { .. } => "HCOMPRESS_1",
            Compression::Uncompressed => "NOCOMPRESS",
        }
    }

    /// Look up a `ZCMPTYPE` value, with default codec parameters.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim() {
            "RICE_1" | "RICE_ONE" => Ok(Compression::rice()),
            "GZIP_1" => Ok(Compression::Gzip1),
            "GZIP_2" => Ok(Compression::Gzip2),
            "PLIO_1" => Ok(Compression::Plio),
            "HCOMPRESS_1" => Ok(Compression::hcompress()),
            "NOCOMPRESS" => Ok(Compression::Uncompressed),
            other => Err(Error::UnsupportedCodec(other.to_string())),
        }
    }

    /// Upper bound on the compressed size of a tile of `maxtilelen` pixels.
    pub fn max_compressed_len(&self, maxtilelen: usize, pixel_type: PixelType) -> usize {
        let n = maxtilelen;
        // Quantized floats reach the integer codecs as 32-bit values.
        let int_width = if pixel_type.is_float() {
            4
        } else {
            pixel_type.byte_width()
        };
        match *self {
            Compression::Rice { blocksize, bytepix } => {
                bytepix.unwrap_or(int_width) * n + n / blocksize.max(1) + 6
            }
            Compression::Gzip1 | Compression::Gzip2 => {
                let raw = n * pixel_type.byte_width();
                raw + raw / 64 + 32
            }
            Compression::Plio => 2 * (7 + 3 * n),
            Compression::Hcompress { .. } => {
                if int_width <= 2 {
                    n * 22 / 10 + 26
                } else {
                    n * 44 / 10 + 26
                }
            }
            Compression::Uncompressed => n * pixel_type.byte_width(),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Compression::from_name(s)
    }
}

/// How float tiles get their scale and zero point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScaleMode {
    /// Each tile measures its own noise and picks its own scale and zero.
    #[default]
    PerTile,
    /// Every tile uses the same caller-provided scale and zero.
    Global { scale: f64, zero: f64 },
}

/// How undefined pixels are marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlankMode {
    /// No blank value. Float tiles containing NaN are stored uncompressed.
    None,
    /// One blank value for the whole image (`ZBLANK` keyword).
    Fixed(i32),
    /// Float tiles that contain NaN record their own blank value.
    #[default]
    PerTile,
}

/// Configuration for one compress or decompress call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionParameters {
    pub compression: Compression,
    /// Noise-to-step ratio for float quantization; `<= 0` disables it.
    pub quantize_level: f32,
    pub quantize_method: QuantizeMethod,
    /// `ZDITHER0`, in `1..=10000`.
    pub dither_seed: i64,
    pub scale_mode: ScaleMode,
    pub blank: BlankMode,
}

impl Default for CompressionParameters {
    fn default() -> Self {
        CompressionParameters {
            compression: Compression::default(),
            quantize_level: DEFAULT_QUANTIZE_LEVEL,
            quantize_method: QuantizeMethod::default(),
            dither_seed: 1,
            scale_mode: ScaleMode::default(),
            blank: BlankMode::default(),
        }
    }
}

impl CompressionParameters {
    pub fn new(compression: Compression) -> Self {
        CompressionParameters {
            compression,
            ..Default::default()
        }
    }

    pub fn with_quantize_level(mut self, level: f32) -> Self {
        self.quantize_level = level;
        self
    }

    pub fn with_quantize_method(mut self, method: QuantizeMethod) -> Self {
        self.quantize_method = method;
        self
    }

    pub fn with_dither_seed(mut self, seed: i64) -> Self {
        self.dither_seed = seed;
        self
    }

    pub fn with_global_scale(mut self, scale: f64, zero: f64) -> Self {
        self.scale_mode = ScaleMode::Global { scale, zero };
        self
    }

    pub fn with_blank(mut self, blank: BlankMode) -> Self {
        self.blank = blank;
        self
    }

    /// Whether float tiles of this configuration are quantized at all.
    pub fn quantizes(&self) -> bool {
        self.compression != Compression::Uncompressed
            && (self.quantize_level > 0.0 || matches!(self.scale_mode, ScaleMode::Global { .. }))
    }

    /// Check the parameters against the image pixel type.
    pub fn validate(&self, pixel_type: PixelType) -> Result<()> {
        if let Compression::Rice { blocksize, bytepix } = self.compression {
            if blocksize == 0 {
                return Err(Error::InvalidValue("Rice block size must be positive"));
            }
            if !matches!(bytepix, None | Some(1) | Some(2) | Some(4)) {
                return Err(Error::InvalidValue("Rice BYTEPIX must be 1, 2 or 4"));
            }
        }
        if let Compression::Hcompress { scale, .. } = self.compression {
            if !scale.is_finite() {
                return Err(Error::InvalidValue("HCOMPRESS scale must be finite"));
            }
        }
        if self.quantize_level.is_nan() {
            return Err(Error::InvalidValue("quantize level must be a number"));
        }
        if !(1..=N_RANDOM as i64).contains(&self.dither_seed) {
            return Err(Error::InvalidValue("ZDITHER0 must be in 1..=10000"));
        }
        if let ScaleMode::Global { scale, zero } = self.scale_mode {
            if !(scale > 0.0 && scale.is_finite() && zero.is_finite()) {
                return Err(Error::InvalidValue("global ZSCALE must be positive and ZZERO finite"));
            }
        }
        if let BlankMode::Fixed(blank) = self.blank {
            let reserved = blank < NULL_VALUE + N_RESERVED_VALUES && blank != ZERO_VALUE;
            if pixel_type.is_float() && !reserved {
                return Err(Error::InvalidValue(
                    "float ZBLANK must be a reserved value below -2147483637",
                ));
            }
        }
        Ok(())
    }
}

/// Everything the engine reads from the header of a tile-compressed image.
#[derive(Debug, Clone, PartialEq)]
pub struct TiledImageHeader {
    pub pixel_type: PixelType,
    pub geometry: TileGeometry,
    pub params: CompressionParameters,
    /// `BSCALE` of the original image. Reported only, never applied.
    pub bscale: f64,
    /// `BZERO` of the original image. Reported only, never applied.
    pub bzero: f64,
}

fn positive_axis(value: i64) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|&n| n > 0)
        .ok_or(Error::InvalidDimension("axis and tile lengths must be positive"))
}

/// `ZNAMEi`/`ZVALi` pairs, in order, up to the first missing `ZVALi`.
fn codec_values(keywords: &[Keyword]) -> Vec<(Option<String>, f64)> {
    ZVAL.iter()
        .zip(ZNAME.iter())
        .map_while(|(val, name)| {
            let value = find_float_keyword(keywords, val)?;
            let name = find_string_keyword(keywords, name).map(|s| s.to_ascii_uppercase());
            Some((name, value))
        })
        .collect()
}

/// Resolve a codec parameter by `ZNAMEi`, falling back to position when the
/// values are unnamed.
fn codec_value(values: &[(Option<String>, f64)], name: &str, position: usize) -> Option<f64> {
    if values.iter().any(|(n, _)| n.is_some()) {
        values
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|&(_, v)| v)
    } else {
        values.get(position).map(|&(_, v)| v)
    }
}

fn as_count(value: f64, what: &'static str) -> Result<usize> {
    if value >= 1.0 && libm::trunc(value) == value && value <= u32::MAX as f64 {
        Ok(value as usize)
    } else {
        Err(Error::InvalidValue(what))
    }
}

impl TiledImageHeader {
    pub fn new(
        pixel_type: PixelType,
        geometry: TileGeometry,
        params: CompressionParameters,
    ) -> Self {
        TiledImageHeader {
            pixel_type,
            geometry,
            params,
            bscale: 1.0,
            bzero: 0.0,
        }
    }

    /// Read the compression keywords of a tile-compressed image.
    pub fn from_keywords(keywords: &[Keyword]) -> Result<Self> {
        let zbitpix =
            find_integer_keyword(keywords, "ZBITPIX").ok_or(Error::MissingKeyword("ZBITPIX"))?;
        let pixel_type = PixelType::from_bitpix(zbitpix)?;

        let znaxis =
            find_integer_keyword(keywords, "ZNAXIS").ok_or(Error::MissingKeyword("ZNAXIS"))?;
        if znaxis < 1 || znaxis > MAX_COMPRESS_DIM as i64 {
            return Err(Error::InvalidDimension("ZNAXIS must be between 1 and 6"));
        }
        let ndim = znaxis as usize;

        let naxis = ZNAXIS[..ndim]
            .iter()
            .map(|&kw| {
                find_integer_keyword(keywords, kw)
                    .ok_or(Error::MissingKeyword(kw))
                    .and_then(positive_axis)
            })
            .collect::<Result<Vec<usize>>>()?;

        let geometry = if find_integer_keyword(keywords, ZTILE[0]).is_some() {
            let tiles = ZTILE[..ndim]
                .iter()
                .map(|&kw| find_integer_keyword(keywords, kw).map_or(Ok(1), positive_axis))
                .collect::<Result<Vec<usize>>>()?;
            TileGeometry::new(&naxis, &tiles)?
        } else {
            TileGeometry::row_tiles(&naxis)?
        };

        let cmptype =
            find_string_keyword(keywords, "ZCMPTYPE").ok_or(Error::MissingKeyword("ZCMPTYPE"))?;
        let mut params = CompressionParameters::new(Compression::from_name(cmptype)?);

        let values = codec_values(keywords);
        match &mut params.compression {
            Compression::Rice { blocksize, bytepix } => {
                if let Some(v) = codec_value(&values, "BLOCKSIZE", 0) {
                    *blocksize = as_count(v, "Rice BLOCKSIZE must be a positive integer")?;
                }
                if let Some(v) = codec_value(&values, "BYTEPIX", 1) {
                    *bytepix = Some(as_count(v, "Rice BYTEPIX must be a positive integer")?);
                }
            }
            Compression::Hcompress { scale, smooth } => {
                if let Some(v) = codec_value(&values, "SCALE", 0) {
                    *scale = v as f32;
                }
                if let Some(v) = codec_value(&values, "SMOOTH", 1) {
                    *smooth = v != 0.0;
                }
            }
            _ => {}
        }
        if let Some(noisebit) = codec_value(&values, "NOISEBIT", usize::MAX) {
            params.quantize_level = noisebit as f32;
        }

        match find_string_keyword(keywords, "ZQUANTIZ") {
            Some("NONE") => params.quantize_level = 0.0,
            Some(method) => params.quantize_method = method.parse()?,
            None => {}
        }
        if let Some(seed) = find_integer_keyword(keywords, "ZDITHER0") {
            params.dither_seed = seed;
        }

        let blank = find_integer_keyword(keywords, "ZBLANK").or_else(|| {
            (!pixel_type.is_float())
                .then(|| find_integer_keyword(keywords, "BLANK"))
                .flatten()
        });
        if let Some(blank) = blank {
            let blank =
                i32::try_from(blank).map_err(|_| Error::InvalidValue("ZBLANK out of range"))?;
            params.blank = BlankMode::Fixed(blank);
        }

        match (
            find_float_keyword(keywords, "ZSCALE"),
            find_float_keyword(keywords, "ZZERO"),
        ) {
            (Some(scale), Some(zero)) => params.scale_mode = ScaleMode::Global { scale, zero },
            (Some(_), None) => return Err(Error::MissingKeyword("ZZERO")),
            (None, Some(_)) => return Err(Error::MissingKeyword("ZSCALE")),
            (None, None) => {}
        }

        params.validate(pixel_type)?;

        Ok(TiledImageHeader {
            pixel_type,
            geometry,
            params,
            bscale: find_float_keyword(keywords, "BSCALE").unwrap_or(1.0),
            bzero: find_float_keyword(keywords, "BZERO").unwrap_or(0.0),
        })
    }

    /// The compression keywords describing this image.
    pub fn to_keywords(&self) -> Vec<Keyword> {
        let mut out = Vec::new();
        out.push(Keyword::integer("ZBITPIX", self.pixel_type.bitpix()));
        out.push(Keyword::integer("ZNAXIS", self.geometry.ndim() as i64));
        for (kw, &n) in ZNAXIS.iter().zip(self.geometry.naxis()) {
            out.push(Keyword::integer(*kw, n as i64));
        }
        for (kw, &n) in ZTILE.iter().zip(self.geometry.tilesize()) {
            out.push(Keyword::integer(*kw, n as i64));
        }
        out.push(Keyword::string("ZCMPTYPE", self.params.compression.name()));

        let mut codec_params: Vec<Keyword> = Vec::new();
        match self.params.compression {
            Compression::Rice { blocksize, bytepix } => {
                codec_params.push(Keyword::integer("BLOCKSIZE", blocksize as i64));
                if let Some(b) = bytepix {
                    codec_params.push(Keyword::integer("BYTEPIX", b as i64));
                }
            }
            Compression::Hcompress { scale, smooth } => {
                codec_params.push(Keyword::float("SCALE", scale as f64));
                codec_params.push(Keyword::integer("SMOOTH", smooth as i64));
            }
            _ => {}
        }
        for (i, param) in codec_params.into_iter().enumerate() {
            out.push(Keyword::string(ZNAME[i], param.name));
            out.push(Keyword::new(ZVAL[i], param.value));
        }

        if self.pixel_type.is_float() {
            if self.params.quantize_level <= 0.0 {
                out.push(Keyword::string("ZQUANTIZ", "NONE"));
            } else {
                out.push(Keyword::string("ZQUANTIZ", self.params.quantize_method.name()));
                if self.params.quantize_method != QuantizeMethod::NoDither {
                    out.push(Keyword::integer("ZDITHER0", self.params.dither_seed));
                }
            }
        }
        if let BlankMode::Fixed(blank) = self.params.blank {
            out.push(Keyword::integer("ZBLANK", blank as i64));
        }
        if let ScaleMode::Global { scale, zero } = self.params.scale_mode {
            out.push(Keyword::float("ZSCALE", scale));
            out.push(Keyword::float("ZZERO", zero));
        }
        if self.bscale != 1.0 {
            out.push(Keyword::float("BSCALE", self.bscale));
        }
        if self.bzero != 0.0 {
            out.push(Keyword::float("BZERO", self.bzero));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::Value;

    fn base_keywords(cmptype: &str) -> Vec<Keyword> {
        vec![
            Keyword::integer("ZBITPIX", 16),
            Keyword::integer("ZNAXIS", 2),
            Keyword::integer("ZNAXIS1", 100),
            Keyword::integer("ZNAXIS2", 50),
            Keyword::string("ZCMPTYPE", cmptype),
        ]
    }

    #[test]
    fn names_and_aliases() {
        assert_eq!(Compression::from_name("RICE_ONE").unwrap(), Compression::rice());
        assert_eq!("GZIP_2".parse::<Compression>().unwrap(), Compression::Gzip2);
        assert_eq!(
            Compression::from_name("NOCOMPRESS").unwrap(),
            Compression::Uncompressed
        );
        assert_eq!(Compression::Plio.to_string(), "PLIO_1");
        assert_eq!(
            Compression::from_name("LZW_1"),
            Err(Error::UnsupportedCodec("LZW_1".to_string()))
        );
    }

    #[test]
    fn max_compressed_len_bounds() {
        let rice = Compression::rice();
        assert_eq!(rice.max_compressed_len(320, PixelType::I16), 2 * 320 + 10 + 6);
        assert_eq!(rice.max_compressed_len(320, PixelType::F64), 4 * 320 + 10 + 6);
        assert_eq!(Compression::Plio.max_compressed_len(10, PixelType::I32), 74);
        assert_eq!(
            Compression::hcompress().max_compressed_len(100, PixelType::U8),
            246
        );
        assert_eq!(
            Compression::Uncompressed.max_compressed_len(10, PixelType::F64),
            80
        );
    }

    #[test]
    fn validate_checks_ranges() {
        let ok = CompressionParameters::default();
        assert!(ok.validate(PixelType::F32).is_ok());

        let bad_rice = CompressionParameters::new(Compression::Rice {
            blocksize: 32,
            bytepix: Some(3),
        });
        assert!(bad_rice.validate(PixelType::I32).is_err());

        assert!(ok.clone().with_dither_seed(0).validate(PixelType::F32).is_err());
        assert!(ok
            .clone()
            .with_global_scale(0.0, 1.0)
            .validate(PixelType::F32)
            .is_err());

        let blank = ok.clone().with_blank(BlankMode::Fixed(-1));
        assert!(blank.validate(PixelType::I16).is_ok());
        assert!(blank.validate(PixelType::F32).is_err());
        let reserved = ok.with_blank(BlankMode::Fixed(NULL_VALUE));
        assert!(reserved.validate(PixelType::F64).is_ok());
    }

    #[test]
    fn reads_defaults() {
        let header = TiledImageHeader::from_keywords(&base_keywords("RICE_1")).unwrap();
        assert_eq!(header.pixel_type, PixelType::I16);
        assert_eq!(header.geometry.tilesize(), &[100, 1]);
        assert_eq!(header.params.compression, Compression::rice());
        assert_eq!(header.params.blank, BlankMode::PerTile);
        assert_eq!(header.bscale, 1.0);
    }

    #[test]
    fn reads_positional_rice_values() {
        let mut kw = base_keywords("RICE_1");
        kw.push(Keyword::integer("ZVAL1", 16));
        kw.push(Keyword::integer("ZVAL2", 2));
        let header = TiledImageHeader::from_keywords(&kw).unwrap();
        assert_eq!(
            header.params.compression,
            Compression::Rice {
                blocksize: 16,
                bytepix: Some(2)
            }
        );
    }

    #[test]
    fn reads_named_values_in_any_order() {
        let mut kw = base_keywords("HCOMPRESS_1");
        kw.push(Keyword::string("ZNAME1", "SMOOTH"));
        kw.push(Keyword::integer("ZVAL1", 1));
        kw.push(Keyword::string("ZNAME2", "SCALE"));
        kw.push(Keyword::float("ZVAL2", 2.5));
        kw.push(Keyword::integer("ZTILE1", 10));
        kw.push(Keyword::integer("ZTILE2", 10));
        let header = TiledImageHeader::from_keywords(&kw).unwrap();
        assert_eq!(
            header.params.compression,
            Compression::Hcompress {
                scale: 2.5,
                smooth: true
            }
        );
        assert_eq!(header.geometry.ntiles(), 50);
    }

    #[test]
    fn reports_missing_and_bad_keywords() {
        let mut kw = base_keywords("RICE_1");
        kw.retain(|k| k.name != "ZNAXIS2");
        assert_eq!(
            TiledImageHeader::from_keywords(&kw),
            Err(Error::MissingKeyword("ZNAXIS2"))
        );

        let mut kw = base_keywords("SQUASH_9");
        assert!(matches!(
            TiledImageHeader::from_keywords(&kw),
            Err(Error::UnsupportedCodec(_))
        ));
        kw[0] = Keyword::integer("ZBITPIX", 24);
        assert_eq!(
            TiledImageHeader::from_keywords(&kw),
            Err(Error::InvalidBitpix(24))
        );

        let mut kw = base_keywords("GZIP_1");
        kw.push(Keyword::integer("ZTILE1", 0));
        assert!(matches!(
            TiledImageHeader::from_keywords(&kw),
            Err(Error::InvalidDimension(_))
        ));

        let mut kw = base_keywords("GZIP_1");
        kw.push(Keyword::float("ZSCALE", 0.5));
        assert_eq!(
            TiledImageHeader::from_keywords(&kw),
            Err(Error::MissingKeyword("ZZERO"))
        );
    }

    #[test]
    fn keyword_round_trip() {
        let geometry = TileGeometry::new(&[64, 32, 3], &[16, 16]).unwrap();
        let params = CompressionParameters::new(Compression::Rice {
            blocksize: 16,
            bytepix: Some(4),
        })
        .with_quantize_method(QuantizeMethod::SubtractiveDither2)
        .with_dither_seed(42)
        .with_blank(BlankMode::Fixed(NULL_VALUE))
        .with_global_scale(0.25, 100.0);
        let mut header = TiledImageHeader::new(PixelType::F32, geometry, params);
        header.bzero = 32768.0;

        let keywords = header.to_keywords();
        assert!(keywords.contains(&Keyword::string("ZQUANTIZ", "SUBTRACTIVE_DITHER_2")));
        assert!(keywords.contains(&Keyword::new("ZTILE3", Value::Integer(1))));
        assert_eq!(TiledImageHeader::from_keywords(&keywords).unwrap(), header);
    }

    #[test]
    fn lossless_float_round_trip() {
        let geometry = TileGeometry::row_tiles(&[10, 10]).unwrap();
        let params = CompressionParameters::new(Compression::Gzip2).with_quantize_level(0.0);
        let header = TiledImageHeader::new(PixelType::F64, geometry, params);
        let keywords = header.to_keywords();
        assert!(keywords.contains(&Keyword::string("ZQUANTIZ", "NONE")));
        assert_eq!(TiledImageHeader::from_keywords(&keywords).unwrap(), header);
    }
}
