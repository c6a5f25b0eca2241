//! HCOMPRESS_1 tile coding.
//!
//! A two-dimensional tile is transformed with an integer Haar wavelet, the
//! coefficients are optionally divided by `scale`, and their magnitudes are
//! coded one bit plane at a time with a quadtree. Sign bits follow the coded
//! planes.
//!
//! Stream layout:
//!
//! | bytes | content |
//! |---|---|
//! | 2 | magic `DD 99` |
//! | 4, 4, 4 | `nx`, `ny`, `scale` as big-endian i32 |
//! | 8 | sum of all pixels (big-endian i64) |
//! | 3 | bit-plane count of each quadrant group |
//! | ... | quadtree codes, a 4-bit end code, sign bits |
//!
//! `ny` is the fast axis: element `(i, j)` lives at `i * ny + j`.

use alloc::vec;
use alloc::vec::Vec;

use crate::bits::{BitReader, BitWriter};
use crate::endian::{read_i32_be, read_i64_be};
use crate::error::{Error, Result};
use crate::pixel::{ImageData, PixelType};
use crate::quantize::noise_estimate;

const NAME: &str = "HCOMPRESS_1";

const MAGIC: [u8; 2] = [0xDD, 0x99];
const HEADER_LEN: usize = 25;

// Bounds on decoded magnitudes; they keep the inverse transform within i64.
const MAX_BITPLANES: u8 = 56;
const MAX_COEFFICIENT: i64 = 1 << 60;

/// Huffman codes for the sixteen quadtree nybbles.
const CODE: [u32; 16] = [
    0x3e, 0x00, 0x01, 0x08, 0x02, 0x09, 0x1a, 0x1b, 0x03, 0x1c, 0x0a, 0x1d, 0x0b, 0x1e, 0x3f, 0x0c,
];
const NCODE: [u32; 16] = [6, 3, 3, 4, 3, 4, 5, 5, 3, 5, 4, 5, 4, 5, 6, 4];

fn ceil_log2(n: usize) -> u32 {
    n.next_power_of_two().trailing_zeros()
}

fn truncated() -> Error {
    Error::corrupt(NAME, "truncated HCOMPRESS stream")
}

// ---------------------------------------------------------------------------
// Wavelet transform
// ---------------------------------------------------------------------------

/// Move the even elements of a strided line to its front and the odd ones
/// to its back.
fn shuffle(a: &mut [i64], off: usize, n: usize, n2: usize, tmp: &mut Vec<i64>) {
    tmp.clear();
    tmp.extend((1..n).step_by(2).map(|i| a[off + n2 * i]));
    let mut p1 = off + n2;
    for i in (2..n).step_by(2) {
        a[p1] = a[off + n2 * i];
        p1 += n2;
    }
    for &t in tmp.iter() {
        a[p1] = t;
        p1 += n2;
    }
}

/// Inverse of [`shuffle`].
fn unshuffle(a: &mut [i64], off: usize, n: usize, n2: usize, tmp: &mut Vec<i64>) {
    let nhalf = (n + 1) >> 1;
    tmp.clear();
    tmp.extend((nhalf..n).map(|i| a[off + n2 * i]));
    for i in (0..nhalf).rev() {
        a[off + n2 * 2 * i] = a[off + n2 * i];
    }
    for (k, i) in (1..n).step_by(2).enumerate() {
        a[off + n2 * i] = tmp[k];
    }
}

#[inline]
fn round_up(v: i64, prnd: i64, nrnd: i64, mask: i64) -> i64 {
    (v + if v >= 0 { prnd } else { nrnd }) & mask
}

fn htrans(a: &mut [i64], nx: usize, ny: usize) {
    let log2n = ceil_log2(nx.max(ny));
    let mut tmp = Vec::with_capacity(nx.max(ny));

    let mut shift = 0u32;
    let mut mask: i64 = -2;
    let mut mask2 = mask << 1;
    let mut prnd: i64 = 1;
    let mut prnd2 = prnd << 1;
    let mut nrnd2 = prnd2 - 1;
    let mut nxtop = nx;
    let mut nytop = ny;

    for _ in 0..log2n {
        let oddx = nxtop % 2;
        let oddy = nytop % 2;

        let mut i = 0;
        while i < nxtop - oddx {
            let mut s00 = i * ny;
            let mut s10 = s00 + ny;
            let mut j = 0;
            while j < nytop - oddy {
                let h0 = (a[s10 + 1] + a[s10] + a[s00 + 1] + a[s00]) >> shift;
                let hx = (a[s10 + 1] + a[s10] - a[s00 + 1] - a[s00]) >> shift;
                let hy = (a[s10 + 1] - a[s10] + a[s00 + 1] - a[s00]) >> shift;
                let hc = (a[s10 + 1] - a[s10] - a[s00 + 1] + a[s00]) >> shift;
                a[s10 + 1] = hc;
                a[s10] = round_up(hx, prnd, 0, mask);
                a[s00 + 1] = round_up(hy, prnd, 0, mask);
                a[s00] = round_up(h0, prnd2, nrnd2, mask2);
                s00 += 2;
                s10 += 2;
                j += 2;
            }
            if oddy == 1 {
                let h0 = (a[s10] + a[s00]) << (1 - shift);
                let hx = (a[s10] - a[s00]) << (1 - shift);
                a[s10] = round_up(hx, prnd, 0, mask);
                a[s00] = round_up(h0, prnd2, nrnd2, mask2);
            }
            i += 2;
        }

        if oddx == 1 {
            let mut s00 = (nxtop - 1) * ny;
            let mut j = 0;
            while j < nytop - oddy {
                let h0 = (a[s00 + 1] + a[s00]) << (1 - shift);
                let hy = (a[s00 + 1] - a[s00]) << (1 - shift);
                a[s00 + 1] = round_up(hy, prnd, 0, mask);
                a[s00] = round_up(h0, prnd2, nrnd2, mask2);
                s00 += 2;
                j += 2;
            }
            if oddy == 1 {
                let h0 = a[s00] << (2 - shift);
                a[s00] = round_up(h0, prnd2, nrnd2, mask2);
            }
        }

        for i in 0..nxtop {
            shuffle(a, ny * i, nytop, 1, &mut tmp);
        }
        for j in 0..nytop {
            shuffle(a, j, nxtop, ny, &mut tmp);
        }

        nxtop = (nxtop + 1) >> 1;
        nytop = (nytop + 1) >> 1;
        shift = 1;
        mask = mask2;
        prnd = prnd2;
        mask2 <<= 1;
        prnd2 <<= 1;
        nrnd2 = prnd2 - 1;
    }
}

fn hinv(a: &mut [i64], nx: usize, ny: usize, smooth: bool, scale: i64) {
    let log2n = ceil_log2(nx.max(ny));
    if log2n == 0 {
        return;
    }
    let mut tmp = Vec::with_capacity(nx.max(ny));

    let mut shift = 1u32;
    let mut bit0: i64 = 1 << (log2n - 1);
    let mut bit1 = bit0 << 1;
    let mut mask0 = -bit0;
    let mut mask1 = mask0 << 1;
    let mask2 = mask0 << 2;
    let mut prnd0 = bit0 >> 1;
    let mut prnd1 = bit1 >> 1;
    let prnd2 = bit0 << 1;
    let mut nrnd0 = prnd0 - 1;
    let mut nrnd1 = prnd1 - 1;
    let nrnd2 = prnd2 - 1;

    a[0] = round_up(a[0], prnd2, nrnd2, mask2);

    let mut nxtop = 1usize;
    let mut nytop = 1usize;
    let mut nxf = nx;
    let mut nyf = ny;
    let mut c = 1usize << log2n;

    for k in (0..log2n).rev() {
        c >>= 1;
        nxtop <<= 1;
        nytop <<= 1;
        if nxf <= c {
            nxtop -= 1;
        } else {
            nxf -= c;
        }
        if nyf <= c {
            nytop -= 1;
        } else {
            nyf -= c;
        }
        if k == 0 {
            nrnd0 = 0;
            shift = 2;
        }

        for i in 0..nxtop {
            unshuffle(a, ny * i, nytop, 1, &mut tmp);
        }
        for j in 0..nytop {
            unshuffle(a, j, nxtop, ny, &mut tmp);
        }
        if smooth {
            hsmooth(a, nxtop, nytop, ny, scale);
        }

        let oddx = nxtop % 2;
        let oddy = nytop % 2;
        let mut i = 0;
        while i < nxtop - oddx {
            let mut s00 = ny * i;
            let mut s10 = s00 + ny;
            let mut j = 0;
            while j < nytop - oddy {
                let mut h0 = a[s00];
                let mut hx = round_up(a[s10], prnd1, nrnd1, mask1);
                let mut hy = round_up(a[s00 + 1], prnd1, nrnd1, mask1);
                let hc = round_up(a[s10 + 1], prnd0, nrnd0, mask0);

                let lowbit0 = hc & bit0;
                hx = if hx >= 0 { hx - lowbit0 } else { hx + lowbit0 };
                hy = if hy >= 0 { hy - lowbit0 } else { hy + lowbit0 };
                let lowbit1 = (hc ^ hx ^ hy) & bit1;
                h0 = if h0 >= 0 {
                    h0 + lowbit0 - lowbit1
                } else if lowbit0 == 0 {
                    h0 + lowbit1
                } else {
                    h0 + lowbit0 - lowbit1
                };

                a[s10 + 1] = (h0 + hx + hy + hc) >> shift;
                a[s10] = (h0 + hx - hy - hc) >> shift;
                a[s00 + 1] = (h0 - hx + hy - hc) >> shift;
                a[s00] = (h0 - hx - hy + hc) >> shift;
                s00 += 2;
                s10 += 2;
                j += 2;
            }
            if oddy == 1 {
                let mut h0 = a[s00];
                let hx = round_up(a[s10], prnd1, nrnd1, mask1);
                let lowbit1 = hx & bit1;
                h0 = if h0 >= 0 { h0 - lowbit1 } else { h0 + lowbit1 };
                a[s10] = (h0 + hx) >> shift;
                a[s00] = (h0 - hx) >> shift;
            }
            i += 2;
        }

        if oddx == 1 {
            let mut s00 = ny * i;
            let mut j = 0;
            while j < nytop - oddy {
                let mut h0 = a[s00];
                let hy = round_up(a[s00 + 1], prnd1, nrnd1, mask1);
                let lowbit1 = hy & bit1;
                h0 = if h0 >= 0 { h0 - lowbit1 } else { h0 + lowbit1 };
                a[s00 + 1] = (h0 + hy) >> shift;
                a[s00] = (h0 - hy) >> shift;
                s00 += 2;
                j += 2;
            }
            if oddy == 1 {
                a[s00] >>= shift;
            }
        }

        bit1 = bit0;
        bit0 >>= 1;
        mask1 = mask0;
        mask0 >>= 1;
        prnd1 = prnd0;
        prnd0 >>= 1;
        nrnd1 = nrnd0;
        nrnd0 = prnd0 - 1;
    }
}

fn smooth_div(s: i64, shift: u32) -> i64 {
    if s >= 0 {
        s >> shift
    } else {
        (s + (1 << shift) - 1) >> shift
    }
}

/// Nudge the difference coefficients of one level so the reconstruction is
/// locally smooth, by at most `scale / 2`.
fn hsmooth(a: &mut [i64], nxtop: usize, nytop: usize, ny: usize, scale: i64) {
    let smax = scale >> 1;
    if smax <= 0 {
        return;
    }
    let ny2 = ny << 1;

    // x differences
    for i in (2..nxtop.saturating_sub(2)).step_by(2) {
        let mut s00 = ny * i;
        let mut s10 = s00 + ny;
        for _ in (0..nytop).step_by(2) {
            let hm = a[s00 - ny2];
            let h0 = a[s00];
            let hp = a[s00 + ny2];
            let mut diff = hp - hm;
            let dmax = (hp - h0).min(h0 - hm).max(0) << 2;
            let dmin = (hp - h0).max(h0 - hm).min(0) << 2;
            if dmin < dmax {
                diff = diff.min(dmax).max(dmin);
                let s = smooth_div(diff - (a[s10] << 3), 3).clamp(-smax, smax);
                a[s10] += s;
            }
            s00 += 2;
            s10 += 2;
        }
    }

    // y differences
    for i in (0..nxtop).step_by(2) {
        let mut s00 = ny * i + 2;
        for _ in (2..nytop.saturating_sub(2)).step_by(2) {
            let hm = a[s00 - 2];
            let h0 = a[s00];
            let hp = a[s00 + 2];
            let mut diff = hp - hm;
            let dmax = (hp - h0).min(h0 - hm).max(0) << 2;
            let dmin = (hp - h0).max(h0 - hm).min(0) << 2;
            if dmin < dmax {
                diff = diff.min(dmax).max(dmin);
                let s = smooth_div(diff - (a[s00 + 1] << 3), 3).clamp(-smax, smax);
                a[s00 + 1] += s;
            }
            s00 += 2;
        }
    }

    // cross differences
    for i in (2..nxtop.saturating_sub(2)).step_by(2) {
        let mut s00 = ny * i + 2;
        let mut s10 = s00 + ny;
        for _ in (2..nytop.saturating_sub(2)).step_by(2) {
            let hmm = a[s00 - ny2 - 2];
            let hpm = a[s00 + ny2 - 2];
            let hmp = a[s00 - ny2 + 2];
            let hpp = a[s00 + ny2 + 2];
            let h0 = a[s00];
            let mut diff = hpp + hmm - hmp - hpm;
            let hx2 = a[s10] << 1;
            let hy2 = a[s00 + 1] << 1;

            let m1 = ((hpp - h0).max(0) - hx2 - hy2).min((h0 - hpm).max(0) + hx2 - hy2);
            let m2 = ((h0 - hmp).max(0) - hx2 + hy2).min((hmm - h0).max(0) + hx2 + hy2);
            let dmax = m1.min(m2) << 4;
            let m1 = ((hpp - h0).min(0) - hx2 - hy2).max((h0 - hpm).min(0) + hx2 - hy2);
            let m2 = ((h0 - hmp).min(0) - hx2 + hy2).max((hmm - h0).min(0) + hx2 + hy2);
            let dmin = m1.max(m2) << 4;

            if dmin < dmax {
                diff = diff.min(dmax).max(dmin);
                let s = smooth_div(diff - (a[s10 + 1] << 6), 6).clamp(-smax, smax);
                a[s10 + 1] += s;
            }
            s00 += 2;
            s10 += 2;
        }
    }
}

/// Divide coefficients by `scale`, rounding to the nearest integer.
fn digitize(a: &mut [i64], scale: i64) {
    if scale <= 1 {
        return;
    }
    let d = (scale + 1) / 2 - 1;
    for v in a.iter_mut() {
        *v = if *v > 0 {
            (*v + d) / scale
        } else {
            (*v - d) / scale
        };
    }
}

// ---------------------------------------------------------------------------
// Quadtree coding
// ---------------------------------------------------------------------------

/// Pack bit `bit` of an `nx` x `ny` block (row stride `n`) into 2x2 nybbles.
fn onebit(a: &[i64], off: usize, n: usize, nx: usize, ny: usize, bit: u32) -> Vec<u8> {
    let get = |i: usize, j: usize| -> u8 {
        if i < nx && j < ny {
            ((a[off + n * i + j] >> bit) & 1) as u8
        } else {
            0
        }
    };
    let mut out = Vec::with_capacity(nx.div_ceil(2) * ny.div_ceil(2));
    for i in (0..nx).step_by(2) {
        for j in (0..ny).step_by(2) {
            out.push(
                (get(i, j) << 3) | (get(i, j + 1) << 2) | (get(i + 1, j) << 1) | get(i + 1, j + 1),
            );
        }
    }
    out
}

/// One quadtree level up: a nybble per 2x2 group of non-zero flags.
fn reduce(b: &[u8], nx: usize, ny: usize) -> Vec<u8> {
    let get = |i: usize, j: usize| -> u8 { u8::from(i < nx && j < ny && b[i * ny + j] != 0) };
    let mut out = Vec::with_capacity(nx.div_ceil(2) * ny.div_ceil(2));
    for i in (0..nx).step_by(2) {
        for j in (0..ny).step_by(2) {
            out.push(
                (get(i, j) << 3) | (get(i, j + 1) << 2) | (get(i + 1, j) << 1) | get(i + 1, j + 1),
            );
        }
    }
    out
}

fn qtree_encode(
    w: &mut BitWriter,
    a: &[i64],
    off: usize,
    n: usize,
    nqx: usize,
    nqy: usize,
    nbitplanes: u8,
) {
    if nqx == 0 || nqy == 0 {
        return;
    }
    let log2n = ceil_log2(nqx.max(nqy));

    for bit in (0..nbitplanes as u32).rev() {
        let direct = onebit(a, off, n, nqx, nqy, bit);
        let mut codes: Vec<u8> = direct.iter().copied().filter(|&v| v != 0).collect();
        let mut level = direct.clone();
        let mut nx = (nqx + 1) >> 1;
        let mut ny = (nqy + 1) >> 1;
        for _ in 1..log2n {
            level = reduce(&level, nx, ny);
            nx = (nx + 1) >> 1;
            ny = (ny + 1) >> 1;
            codes.extend(level.iter().copied().filter(|&v| v != 0));
        }

        let nbits: usize = codes.iter().map(|&v| NCODE[v as usize] as usize).sum();
        if nbits > 4 * direct.len() {
            // Cheaper to write the bottom level as raw nybbles.
            w.write_bits(0, 4);
            for &v in &direct {
                w.write_bits(v as u32, 4);
            }
            continue;
        }

        w.write_bits(0xF, 4);
        if codes.is_empty() {
            w.write_bits(CODE[0], NCODE[0]);
        }
        for &v in codes.iter().rev() {
            w.write_bits(CODE[v as usize], NCODE[v as usize]);
        }
    }
}

fn input_huffman(r: &mut BitReader<'_>) -> Option<u8> {
    let mut c = r.read_bits(3)?;
    if c < 4 {
        return Some(1 << c);
    }
    c = r.read_bits(1)? | (c << 1);
    if c < 13 {
        return Some(match c {
            8 => 3,
            9 => 5,
            10 => 10,
            11 => 12,
            _ => 15,
        });
    }
    c = r.read_bits(1)? | (c << 1);
    if c < 31 {
        return Some(match c {
            26 => 6,
            27 => 7,
            28 => 9,
            29 => 11,
            _ => 13,
        });
    }
    c = r.read_bits(1)? | (c << 1);
    Some(if c == 62 { 0 } else { 14 })
}

/// Expand one quadtree level into the next finer `nx` x `ny` level.
fn expand(r: &mut BitReader<'_>, prev: &[u8], nx: usize, ny: usize) -> Option<Vec<u8>> {
    let nx2 = nx.div_ceil(2);
    let ny2 = ny.div_ceil(2);
    let mut b = vec![0u8; nx * ny];
    for i in 0..nx2 {
        for j in 0..ny2 {
            let v = *prev.get(i * ny2 + j)?;
            b[2 * i * ny + 2 * j] = (v >> 3) & 1;
            if 2 * j + 1 < ny {
                b[2 * i * ny + 2 * j + 1] = (v >> 2) & 1;
            }
            if 2 * i + 1 < nx {
                b[(2 * i + 1) * ny + 2 * j] = (v >> 1) & 1;
                if 2 * j + 1 < ny {
                    b[(2 * i + 1) * ny + 2 * j + 1] = v & 1;
                }
            }
        }
    }
    for v in b.iter_mut().rev() {
        if *v != 0 {
            *v = input_huffman(r)?;
        }
    }
    Some(b)
}

/// OR bit `bit` into the block from 2x2 nybbles.
fn bitins(codes: &[u8], nx: usize, ny: usize, a: &mut [i64], off: usize, n: usize, bit: u32) {
    let mut k = 0;
    for i in (0..nx).step_by(2) {
        for j in (0..ny).step_by(2) {
            let v = codes[k];
            k += 1;
            if v & 8 != 0 {
                a[off + n * i + j] |= 1 << bit;
            }
            if j + 1 < ny && v & 4 != 0 {
                a[off + n * i + j + 1] |= 1 << bit;
            }
            if i + 1 < nx && v & 2 != 0 {
                a[off + n * (i + 1) + j] |= 1 << bit;
            }
            if i + 1 < nx && j + 1 < ny && v & 1 != 0 {
                a[off + n * (i + 1) + j + 1] |= 1 << bit;
            }
        }
    }
}

fn qtree_decode(
    r: &mut BitReader<'_>,
    a: &mut [i64],
    off: usize,
    n: usize,
    nqx: usize,
    nqy: usize,
    nbitplanes: u8,
) -> Result<()> {
    if nqx == 0 || nqy == 0 {
        return Ok(());
    }
    let log2n = ceil_log2(nqx.max(nqy));

    for bit in (0..nbitplanes as u32).rev() {
        match r.read_bits(4).ok_or_else(truncated)? {
            0 => {
                let count = nqx.div_ceil(2) * nqy.div_ceil(2);
                let mut codes = Vec::with_capacity(count);
                for _ in 0..count {
                    codes.push(r.read_bits(4).ok_or_else(truncated)? as u8);
                }
                bitins(&codes, nqx, nqy, a, off, n, bit);
            }
            0xF => {
                let mut level = vec![input_huffman(r).ok_or_else(truncated)?];
                let mut nx = 1usize;
                let mut ny = 1usize;
                let mut nfx = nqx;
                let mut nfy = nqy;
                let mut c = 1usize << log2n;
                for _ in 1..log2n {
                    c >>= 1;
                    nx <<= 1;
                    ny <<= 1;
                    if nfx <= c {
                        nx -= 1;
                    } else {
                        nfx -= c;
                    }
                    if nfy <= c {
                        ny -= 1;
                    } else {
                        nfy -= c;
                    }
                    level = expand(r, &level, nx, ny).ok_or_else(truncated)?;
                }
                if level.len() < nqx.div_ceil(2) * nqy.div_ceil(2) {
                    return Err(Error::corrupt(NAME, "quadtree does not cover the quadrant"));
                }
                bitins(&level, nqx, nqy, a, off, n, bit);
            }
            _ => return Err(Error::corrupt(NAME, "bad quadtree format code")),
        }
    }
    Ok(())
}

/// The four quadrant groups: offset, extent and which bit-plane count
/// applies.
fn quadrants(nx: usize, ny: usize) -> [(usize, usize, usize, usize); 4] {
    let nx2 = nx.div_ceil(2);
    let ny2 = ny.div_ceil(2);
    [
        (0, nx2, ny2, 0),
        (ny2, nx2, ny / 2, 1),
        (ny * nx2, nx / 2, ny2, 1),
        (ny * nx2 + ny2, nx / 2, ny / 2, 2),
    ]
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Compress an `nx` x `ny` block of values (fast axis `ny`).
///
/// `scale` 0 or 1 is lossless; larger values divide the wavelet
/// coefficients before coding.
pub fn hcompress_encode(values: &[i64], nx: usize, ny: usize, scale: i64) -> Result<Vec<u8>> {
    if nx == 0 || ny == 0 || nx.checked_mul(ny) != Some(values.len()) {
        return Err(Error::compression(NAME, "tile extent does not match its data"));
    }
    if nx > i32::MAX as usize || ny > i32::MAX as usize || !(0..=i32::MAX as i64).contains(&scale) {
        return Err(Error::compression(NAME, "tile extent or scale out of range"));
    }
    if values.iter().any(|&v| v != v as i32 as i64) {
        return Err(Error::bad_data(NAME, "HCOMPRESS values must fit in 32 bits"));
    }

    let mut a = Vec::new();
    a.try_reserve_exact(values.len())?;
    a.extend_from_slice(values);
    htrans(&mut a, nx, ny);
    digitize(&mut a, scale);

    let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 2);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&(nx as i32).to_be_bytes());
    out.extend_from_slice(&(ny as i32).to_be_bytes());
    out.extend_from_slice(&(scale as i32).to_be_bytes());
    out.extend_from_slice(&a[0].to_be_bytes());
    a[0] = 0;

    // One sign bit per non-zero coefficient, 1 for negative.
    let mut signs = BitWriter::with_capacity(values.len() / 8 + 1);
    for v in a.iter_mut() {
        if *v > 0 {
            signs.write_bits(0, 1);
        } else if *v < 0 {
            signs.write_bits(1, 1);
            *v = -*v;
        }
    }

    let nx2 = nx.div_ceil(2);
    let ny2 = ny.div_ceil(2);
    let mut vmax = [0i64; 3];
    for i in 0..nx {
        for j in 0..ny {
            let q = usize::from(j >= ny2) + usize::from(i >= nx2);
            vmax[q] = vmax[q].max(a[i * ny + j]);
        }
    }
    let nbitplanes = vmax.map(|v| (64 - v.leading_zeros()) as u8);
    out.extend_from_slice(&nbitplanes);

    let mut w = BitWriter::with_capacity(values.len());
    for (off, nqx, nqy, group) in quadrants(nx, ny) {
        qtree_encode(&mut w, &a, off, ny, nqx, nqy, nbitplanes[group]);
    }
    w.write_bits(0, 4);
    out.extend_from_slice(&w.finish());
    out.extend_from_slice(&signs.finish());
    Ok(out)
}

/// A decoded HCOMPRESS block.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBlock {
    pub nx: usize,
    pub ny: usize,
    pub scale: i64,
    pub values: Vec<i64>,
}

/// Decompress an HCOMPRESS stream, optionally smoothing lossy output.
pub fn hcompress_decode(compressed: &[u8], smooth: bool) -> Result<DecodedBlock> {
    decode(compressed, smooth, None)
}

/// Decode a stream, rejecting header dimensions other than `expected`
/// before any buffer is allocated.
fn decode(
    compressed: &[u8],
    smooth: bool,
    expected: Option<(usize, usize)>,
) -> Result<DecodedBlock> {
    if compressed.len() < HEADER_LEN {
        return Err(truncated());
    }
    if compressed[..2] != MAGIC {
        return Err(Error::corrupt(NAME, "bad HCOMPRESS magic number"));
    }
    let nx = read_i32_be(&compressed[2..]);
    let ny = read_i32_be(&compressed[6..]);
    let scale = read_i32_be(&compressed[10..]) as i64;
    let sumall = read_i64_be(&compressed[14..]);
    let nbitplanes = [compressed[22], compressed[23], compressed[24]];

    if nx <= 0 || ny <= 0 || scale < 0 {
        return Err(Error::corrupt(NAME, "invalid HCOMPRESS header"));
    }
    if nbitplanes.iter().any(|&n| n > MAX_BITPLANES) || sumall.unsigned_abs() > 1 << MAX_BITPLANES {
        return Err(Error::corrupt(NAME, "HCOMPRESS coefficients out of range"));
    }
    let (nx, ny) = (nx as usize, ny as usize);
    if expected.is_some_and(|dims| dims != (nx, ny)) {
        return Err(Error::corrupt(NAME, "stream dimensions do not match the tile"));
    }
    let npix = nx
        .checked_mul(ny)
        .ok_or_else(|| Error::corrupt(NAME, "invalid HCOMPRESS header"))?;

    let mut a = Vec::new();
    a.try_reserve_exact(npix)?;
    a.resize(npix, 0i64);

    let mut r = BitReader::new(&compressed[HEADER_LEN..]);
    for (off, nqx, nqy, group) in quadrants(nx, ny) {
        qtree_decode(&mut r, &mut a, off, ny, nqx, nqy, nbitplanes[group])?;
    }
    if r.read_bits(4).ok_or_else(truncated)? != 0 {
        return Err(Error::corrupt(NAME, "missing HCOMPRESS end code"));
    }
    r.align();

    for v in a.iter_mut() {
        if *v != 0 && r.read_bit().ok_or_else(truncated)? {
            *v = -*v;
        }
    }
    a[0] = sumall;

    if scale > 1 {
        for v in a.iter_mut() {
            *v = v
                .checked_mul(scale)
                .filter(|p| p.unsigned_abs() <= MAX_COEFFICIENT as u64)
                .ok_or_else(|| Error::corrupt(NAME, "HCOMPRESS coefficients out of range"))?;
        }
    }
    hinv(&mut a, nx, ny, smooth, scale);

    Ok(DecodedBlock {
        nx,
        ny,
        scale,
        values: a,
    })
}

// ---------------------------------------------------------------------------
// Tile entry points
// ---------------------------------------------------------------------------

/// Collapse a tile shape to `(nx, ny)` with `ny` the fast axis.
fn block_dims(shape: &[usize]) -> Result<(usize, usize)> {
    let mut long_axes = shape.iter().copied().filter(|&n| n > 1);
    let ny = long_axes.next().unwrap_or(1);
    let nx = long_axes.next().unwrap_or(1);
    if long_axes.next().is_some() {
        return Err(Error::bad_data(
            NAME,
            "HCOMPRESS tiles must have at most two axes longer than 1",
        ));
    }
    Ok((nx, ny))
}

/// Resolve the configured scale for one tile. Negative values are
/// multiples of the tile's noise.
fn effective_scale(scale: f32, values: &[i64], ny: usize) -> i64 {
    if scale >= 0.0 {
        return libm::floor(scale as f64 + 0.5) as i64;
    }
    let samples: Vec<f64> = values.iter().map(|&v| v as f64).collect();
    let noise = noise_estimate(&samples, ny).noise3;
    libm::floor(-(scale as f64) * noise + 0.5).max(0.0) as i64
}

fn clamp_to(pixel_type: PixelType, v: i64) -> i64 {
    match pixel_type {
        PixelType::U8 => v.clamp(0, u8::MAX as i64),
        PixelType::I16 => v.clamp(i16::MIN as i64, i16::MAX as i64),
        PixelType::I32 => v.clamp(i32::MIN as i64, i32::MAX as i64),
        _ => v,
    }
}

/// HCOMPRESS-code one integer tile.
pub(crate) fn compress(tile: &ImageData, shape: &[usize], scale: f32) -> Result<Vec<u8>> {
    let (nx, ny) = block_dims(shape)?;
    let values = tile
        .to_integers()
        .ok_or_else(|| Error::bad_data(NAME, "HCOMPRESS requires integer pixels"))?;
    let scale = effective_scale(scale, &values, ny);
    hcompress_encode(&values, nx, ny, scale)
}

/// Decode one HCOMPRESS-coded tile.
///
/// Lossy output is clamped to the range of `pixel_type`.
pub(crate) fn decompress(
    compressed: &[u8],
    pixel_type: PixelType,
    shape: &[usize],
    smooth: bool,
) -> Result<ImageData> {
    if pixel_type.is_float() {
        return Err(Error::bad_data(NAME, "HCOMPRESS requires integer pixels"));
    }
    let (nx, ny) = block_dims(shape)?;
    let block = decode(compressed, smooth, Some((nx, ny)))?;
    let values: Vec<i64> = block
        .values
        .into_iter()
        .map(|v| clamp_to(pixel_type, v))
        .collect();
    ImageData::from_integers(pixel_type, &values)
}
