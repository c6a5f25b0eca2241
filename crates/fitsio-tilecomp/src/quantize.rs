//! Floating-point tile quantization.
//!
//! A float tile is mapped to 32-bit integers with a step `scale` derived from
//! the tile's measured noise, so the integer codecs can compress it:
//!
//! ```text
//! int   = round((value - zero) / scale)           (no dithering)
//! value = int * scale + zero
//! ```
//!
//! With subtractive dithering a uniform random offset, reproducible from the
//! tile index and the dither seed, is added before rounding and removed
//! again on restore. Undefined (NaN) pixels become [`NULL_VALUE`], which no
//! quantized pixel can take.

use alloc::vec::Vec;
use core::str::FromStr;

use crate::error::{Error, Result};

/// Integer stored for undefined (NaN) pixels.
pub const NULL_VALUE: i32 = -2_147_483_647;
/// Integer stored for exact zeros under `SUBTRACTIVE_DITHER_2`.
pub const ZERO_VALUE: i32 = -2_147_483_646;
/// Size of the reserved band at the bottom of the `i32` range.
pub const N_RESERVED_VALUES: i32 = 10;
/// Length of the dither random sequence.
pub const N_RANDOM: usize = 10_000;

const MAX_INT: f64 = 2_147_483_647.0;

/// Quantization method, as named by the `ZQUANTIZ` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuantizeMethod {
    NoDither,
    #[default]
    SubtractiveDither1,
    /// Like `SubtractiveDither1`, but exact zeros stay exactly zero.
    SubtractiveDither2,
}

impl QuantizeMethod {
    pub fn name(self) -> &'static str {
        match self {
            QuantizeMethod::NoDither => "NO_DITHER",
            QuantizeMethod::SubtractiveDither1 => "SUBTRACTIVE_DITHER_1",
            QuantizeMethod::SubtractiveDither2 => "SUBTRACTIVE_DITHER_2",
        }
    }

    fn dithered(self) -> bool {
        !matches!(self, QuantizeMethod::NoDither)
    }
}

impl FromStr for QuantizeMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "NO_DITHER" => Ok(QuantizeMethod::NoDither),
            "SUBTRACTIVE_DITHER_1" => Ok(QuantizeMethod::SubtractiveDither1),
            "SUBTRACTIVE_DITHER_2" => Ok(QuantizeMethod::SubtractiveDither2),
            _ => Err(Error::InvalidValue("unknown ZQUANTIZ method")),
        }
    }
}

// ---------------------------------------------------------------------------
// Noise estimation
// ---------------------------------------------------------------------------

/// Background noise measured from differences between nearby pixels.
///
/// Each figure is the median, over rows, of the per-row median absolute
/// 2nd, 3rd and 5th order difference, scaled to a Gaussian sigma.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NoiseEstimate {
    pub noise2: f64,
    pub noise3: f64,
    pub noise5: f64,
}

impl NoiseEstimate {
    /// The smallest non-zero estimate, or 0 if all are zero.
    pub fn min_nonzero(&self) -> f64 {
        [self.noise2, self.noise3, self.noise5]
            .into_iter()
            .filter(|&n| n > 0.0)
            .fold(0.0, |acc, n| if acc == 0.0 || n < acc { n } else { acc })
    }
}

fn lower_median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    Some(values[(values.len() - 1) / 2])
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Estimate the noise of a tile laid out in rows of `row_len` pixels.
///
/// Non-finite pixels are ignored. Rows shorter than 9 pixels are merged
/// into one.
pub fn noise_estimate(values: &[f64], row_len: usize) -> NoiseEstimate {
    let row_len = if row_len < 9 { values.len().max(1) } else { row_len };

    let mut rows2 = Vec::new();
    let mut rows3 = Vec::new();
    let mut rows5 = Vec::new();
    let mut d2 = Vec::new();
    let mut d3 = Vec::new();
    let mut d5 = Vec::new();
    let mut row = Vec::with_capacity(row_len);

    for chunk in values.chunks(row_len) {
        row.clear();
        row.extend(chunk.iter().copied().filter(|v| v.is_finite()));
        d2.clear();
        d3.clear();
        d5.clear();

        if row.len() >= 9 {
            for w in row.windows(9) {
                if w.iter().all(|&v| v == w[0]) {
                    continue;
                }
                let (v1, v3, v5, v7, v9) = (w[0], w[2], w[4], w[6], w[8]);
                d2.push(libm::fabs(v5 - v7));
                d3.push(libm::fabs(2.0 * v5 - v3 - v7));
                d5.push(libm::fabs(6.0 * v5 - 4.0 * v3 - 4.0 * v7 + v1 + v9));
            }
        } else if row.len() >= 5 {
            for w in row.windows(5) {
                if w.iter().all(|&v| v == w[0]) {
                    continue;
                }
                d3.push(libm::fabs(2.0 * w[2] - w[0] - w[4]));
            }
        }

        if let Some(m) = lower_median(&mut d2) {
            rows2.push(m * 1.0483579);
        }
        if let Some(m) = lower_median(&mut d3) {
            rows3.push(m * 0.6052697);
        }
        if let Some(m) = lower_median(&mut d5) {
            rows5.push(m * 0.1772048);
        }
    }

    NoiseEstimate {
        noise2: median(&mut rows2),
        noise3: median(&mut rows3),
        noise5: median(&mut rows5),
    }
}

// ---------------------------------------------------------------------------
// Dither sequence
// ---------------------------------------------------------------------------

/// The fixed table of uniform deviates in `[0, 1)` used for dithering.
///
/// It is the Park-Miller minimal standard sequence from seed 1, so every
/// reader and writer sees the same values.
#[derive(Debug, Clone)]
pub struct RandomTable {
    values: Vec<f32>,
}

impl Default for RandomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomTable {
    pub fn new() -> Self {
        let a = 16807.0f64;
        let m = 2147483647.0f64;
        let mut seed = 1.0f64;
        let values = (0..N_RANDOM)
            .map(|_| {
                let temp = a * seed;
                seed = temp - m * libm::floor(temp / m);
                (seed / m) as f32
            })
            .collect();
        RandomTable { values }
    }

    pub fn get(&self, index: usize) -> f32 {
        self.values[index % N_RANDOM]
    }

    /// The dither offsets for tile `tile_index` (0-based) under `ZDITHER0`.
    pub fn sequence(&self, tile_index: usize, zdither0: i64) -> DitherSequence<'_> {
        let start = (tile_index as i64 + zdither0 - 1).rem_euclid(N_RANDOM as i64) as usize;
        DitherSequence {
            table: self,
            iseed: start,
            nextrand: self.start_offset(start),
        }
    }

    fn start_offset(&self, iseed: usize) -> usize {
        (self.values[iseed] * 500.0) as usize
    }
}

/// Per-pixel dither offsets of one tile.
#[derive(Debug, Clone)]
pub struct DitherSequence<'a> {
    table: &'a RandomTable,
    iseed: usize,
    nextrand: usize,
}

impl Iterator for DitherSequence<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        let r = self.table.values[self.nextrand] as f64;
        self.nextrand += 1;
        if self.nextrand == N_RANDOM {
            self.iseed = (self.iseed + 1) % N_RANDOM;
            self.nextrand = self.table.start_offset(self.iseed);
        }
        Some(r)
    }
}

// ---------------------------------------------------------------------------
// Quantize / dequantize
// ---------------------------------------------------------------------------

/// A quantized tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantized {
    pub values: Vec<i32>,
    pub scale: f64,
    pub zero: f64,
    /// Whether any pixel was stored as [`NULL_VALUE`].
    pub has_blanks: bool,
}

fn nint(x: f64) -> i32 {
    libm::round(x) as i32
}

/// Quantizes and restores float tiles for one image.
#[derive(Debug, Clone)]
pub struct Quantizer {
    method: QuantizeMethod,
    zdither0: i64,
    random: RandomTable,
}

impl Quantizer {
    pub fn new(method: QuantizeMethod, zdither0: i64) -> Self {
        Quantizer {
            method,
            zdither0,
            random: RandomTable::new(),
        }
    }

    pub fn method(&self) -> QuantizeMethod {
        self.method
    }

    /// Quantize a tile with a step of `noise / level`.
    ///
    /// Returns `None` when the tile should be stored unquantized: fewer than
    /// two pixels, `level <= 0`, zero measured noise (for example a constant
    /// tile), infinite pixels, or a value range the integers cannot span.
    pub fn quantize(
        &self,
        tile_index: usize,
        values: &[f64],
        row_len: usize,
        level: f32,
    ) -> Option<Quantized> {
        if values.len() < 2 || level <= 0.0 || values.iter().any(|v| v.is_infinite()) {
            return None;
        }

        let mut ngood = 0usize;
        let mut minval = f64::MAX;
        let mut maxval = f64::MIN;
        for &v in values.iter().filter(|v| !v.is_nan()) {
            ngood += 1;
            minval = minval.min(v);
            maxval = maxval.max(v);
        }

        let noise = if ngood == 0 {
            minval = 0.0;
            maxval = 1.0;
            1.0
        } else {
            noise_estimate(values, row_len).min_nonzero()
        };

        let delta = noise / level as f64;
        if delta == 0.0 || !delta.is_finite() {
            return None;
        }
        if (maxval - minval) / delta > 2.0 * MAX_INT - N_RESERVED_VALUES as f64 {
            return None;
        }

        let has_blanks = ngood < values.len();
        let zero = if has_blanks || self.method == QuantizeMethod::SubtractiveDither2 {
            // Shift the data to the bottom of the range, just above the
            // reserved values.
            minval - delta * (NULL_VALUE as f64 + N_RESERVED_VALUES as f64)
        } else if (maxval - minval) / delta < MAX_INT - N_RESERVED_VALUES as f64 {
            libm::round(minval / delta) * delta
        } else {
            (minval + maxval) / 2.0
        };

        Some(Quantized {
            values: self.to_integers(tile_index, values, delta, zero),
            scale: delta,
            zero,
            has_blanks,
        })
    }

    /// Quantize a tile with a caller-chosen step and offset.
    ///
    /// Returns `None` if `scale` is not positive, a pixel is infinite, or a
    /// pixel would fall outside the representable integers.
    pub fn quantize_with(
        &self,
        tile_index: usize,
        values: &[f64],
        scale: f64,
        zero: f64,
    ) -> Option<Quantized> {
        if scale <= 0.0 || !scale.is_finite() {
            return None;
        }
        let lowest = (NULL_VALUE + N_RESERVED_VALUES) as f64;
        let mut has_blanks = false;
        for &v in values {
            if v.is_nan() {
                has_blanks = true;
                continue;
            }
            let q = (v - zero) / scale;
            if !q.is_finite() || q - 1.0 < lowest || q + 1.0 > MAX_INT {
                return None;
            }
        }
        Some(Quantized {
            values: self.to_integers(tile_index, values, scale, zero),
            scale,
            zero,
            has_blanks,
        })
    }

    fn to_integers(&self, tile_index: usize, values: &[f64], delta: f64, zero: f64) -> Vec<i32> {
        if !self.method.dithered() {
            return values
                .iter()
                .map(|&v| {
                    if v.is_nan() {
                        NULL_VALUE
                    } else {
                        nint((v - zero) / delta)
                    }
                })
                .collect();
        }

        let keep_zero = self.method == QuantizeMethod::SubtractiveDither2;
        values
            .iter()
            .zip(self.random.sequence(tile_index, self.zdither0))
            .map(|(&v, r)| {
                if v.is_nan() {
                    NULL_VALUE
                } else if keep_zero && v == 0.0 {
                    ZERO_VALUE
                } else {
                    nint((v - zero) / delta + r - 0.5)
                }
            })
            .collect()
    }

    /// Restore a quantized tile. Pixels equal to `blank` become `null_value`.
    pub fn dequantize(
        &self,
        tile_index: usize,
        ints: &[i32],
        scale: f64,
        zero: f64,
        blank: Option<i32>,
        null_value: f64,
    ) -> Vec<f64> {
        if !self.method.dithered() {
            return ints
                .iter()
                .map(|&i| {
                    if Some(i) == blank {
                        null_value
                    } else {
                        i as f64 * scale + zero
                    }
                })
                .collect();
        }

        let keep_zero = self.method == QuantizeMethod::SubtractiveDither2;
        ints.iter()
            .zip(self.random.sequence(tile_index, self.zdither0))
            .map(|(&i, r)| {
                if Some(i) == blank {
                    null_value
                } else if keep_zero && i == ZERO_VALUE {
                    0.0
                } else {
                    (i as f64 - r + 0.5) * scale + zero
                }
            })
            .collect()
    }
}
