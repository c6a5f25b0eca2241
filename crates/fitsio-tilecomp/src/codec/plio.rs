//! PLIO_1 tile coding: IRAF pixel-list line lists.
//!
//! A line list is a sequence of 16-bit instruction words. The top four bits
//! of a word are the opcode and the low twelve bits its operand. Runs of
//! zeros and runs of a "high value" are emitted as counts, and the high value
//! itself is changed by small increments or set outright.

use alloc::vec;
use alloc::vec::Vec;

use crate::endian::read_i16_be;
use crate::error::{Error, Result};
use crate::pixel::{ImageData, PixelType};

const NAME: &str = "PLIO_1";

/// Exclusive upper bound of PLIO pixel values.
pub const PLIO_MAX_VALUE: i64 = 1 << 24;

const HEADER_WORDS: usize = 7;
const MAX_RUN: usize = 4095;

// Opcodes, already shifted into the top four bits.
const OP_ZN: i64 = 0;
const OP_SH: i64 = 1 << 12;
const OP_IH: i64 = 2 << 12;
const OP_DH: i64 = 3 << 12;
const OP_HN: i64 = 4 << 12;
const OP_PN: i64 = 5 << 12;

/// Encode one line of pixel values as a line list.
///
/// Values must lie in `0..PLIO_MAX_VALUE`.
pub fn plio_encode(pixels: &[i64]) -> Result<Vec<i16>> {
    if pixels.iter().any(|v| !(0..PLIO_MAX_VALUE).contains(v)) {
        return Err(Error::bad_data(NAME, "PLIO pixel values must lie in 0..2^24"));
    }

    let mut words: Vec<i64> = vec![0, HEADER_WORDS as i64, -100, 0, 0, 0, 0];
    if let Some(&first) = pixels.first() {
        encode_runs(pixels, first, &mut words);
    }

    let total = words.len() as i64;
    if total >= 1 << 30 {
        return Err(Error::compression(NAME, "line list is too long"));
    }
    words[3] = total % 32768;
    words[4] = total / 32768;
    Ok(words.into_iter().map(|w| w as i16).collect())
}

fn encode_runs(pixels: &[i64], first: i64, words: &mut Vec<i64>) {
    let xe = pixels.len() - 1;
    let mut x1 = 0usize;
    let mut iz = 0usize;
    let mut pv = first;
    let mut hi = 1i64;
    let mut nv = 0i64;
    let mut ip = 0usize;

    while ip <= xe {
        if ip < xe {
            nv = pixels[ip + 1];
            if nv == pv {
                ip += 1;
                continue;
            }
            if pv == 0 {
                pv = nv;
                x1 = ip + 1;
                ip += 1;
                continue;
            }
        } else if pv == 0 {
            x1 = xe + 1;
        }

        // Pixels x1..=ip hold pv; pixels iz..x1 are zero.
        let mut np = ip + 1 - x1;
        let mut nz = x1 - iz;
        let mut done = false;

        if pv > 0 {
            let dv = pv - hi;
            if dv != 0 {
                hi = pv;
                if dv.abs() > MAX_RUN as i64 {
                    words.push(OP_SH + (pv & 4095));
                    words.push(pv / 4096);
                } else {
                    let word = if dv < 0 { OP_DH - dv } else { OP_IH + dv };
                    if np == 1 && nz == 0 {
                        // Single pixel: IH/DH become IS/DS, which also store it.
                        words.push(word | OP_HN);
                        done = true;
                    } else {
                        words.push(word);
                    }
                }
            }
        }

        if !done && nz > 0 {
            while nz > 0 {
                let run = nz.min(MAX_RUN);
                words.push(OP_ZN + run as i64);
                nz -= run;
            }
            if np == 1 && pv > 0 {
                // Turn the last zero run into PN, which stores one high value.
                if let Some(last) = words.last_mut() {
                    *last += OP_PN + 1 - OP_ZN;
                }
                done = true;
            }
        }

        if !done {
            while np > 0 {
                let run = np.min(MAX_RUN);
                words.push(OP_HN + run as i64);
                np -= run;
            }
        }

        x1 = ip + 1;
        iz = x1;
        pv = nv;
        ip += 1;
    }
}

/// Decode a line list into `npix` pixel values.
///
/// Pixels the list does not reach are zero.
pub fn plio_decode(words: &[i16], npix: usize) -> Result<Vec<i64>> {
    let mut out = Vec::new();
    out.try_reserve_exact(npix)?;
    if npix == 0 {
        return Ok(out);
    }
    if words.len() < 3 {
        return Err(Error::corrupt(NAME, "line list header is truncated"));
    }

    let (lllen, first) = if words[2] > 0 {
        (words[2] as usize, 3usize)
    } else {
        if words.len() < HEADER_WORDS {
            return Err(Error::corrupt(NAME, "line list header is truncated"));
        }
        let len = ((words[4] as i64) << 15) + words[3] as i64;
        if len < 0 || words[1] < 0 {
            return Err(Error::corrupt(NAME, "negative line list length"));
        }
        (len as usize, words[1] as usize)
    };
    if lllen > words.len() {
        return Err(Error::corrupt(NAME, "line list is truncated"));
    }

    let xe = npix as i64;
    let mut x1 = 1i64;
    let mut pv = 1i64;
    let mut ip = first;

    while ip < lllen {
        let word = words[ip] as u16;
        let opcode = word >> 12;
        let data = (word & 4095) as i64;

        match opcode {
            0 | 4 | 5 => {
                let x2 = x1 + data - 1;
                let i1 = x1.max(1);
                let i2 = x2.min(xe);
                if i2 >= i1 {
                    let n = (i2 - i1 + 1) as usize;
                    if opcode == 4 {
                        out.resize(out.len() + n, pv);
                    } else {
                        out.resize(out.len() + n, 0);
                        if opcode == 5 && i2 == x2 {
                            if let Some(last) = out.last_mut() {
                                *last = pv;
                            }
                        }
                    }
                }
                x1 = x2 + 1;
            }
            1 => {
                let high = *words
                    .get(ip + 1)
                    .ok_or_else(|| Error::corrupt(NAME, "line list is truncated"))?;
                pv = ((high as i64) << 12) + data;
                ip += 1;
            }
            2 => pv += data,
            3 => pv -= data,
            6 | 7 => {
                if opcode == 6 {
                    pv += data;
                } else {
                    pv -= data;
                }
                if x1 <= xe {
                    out.push(pv);
                }
                x1 += 1;
            }
            _ => return Err(Error::corrupt(NAME, "unknown line list opcode")),
        }

        ip += 1;
        if x1 > xe {
            break;
        }
    }

    out.resize(npix, 0);
    Ok(out)
}

/// PLIO-code one integer tile.
pub(crate) fn compress(tile: &ImageData) -> Result<Vec<u8>> {
    let values = tile
        .to_integers()
        .ok_or_else(|| Error::bad_data(NAME, "PLIO coding requires integer pixels"))?;
    let words = plio_encode(&values)?;
    let mut out = Vec::with_capacity(words.len() * 2);
    for w in words {
        out.extend_from_slice(&w.to_be_bytes());
    }
    Ok(out)
}

/// Decode one PLIO-coded tile of `count` pixels.
pub(crate) fn decompress(
    compressed: &[u8],
    pixel_type: PixelType,
    count: usize,
) -> Result<ImageData> {
    if pixel_type.is_float() {
        return Err(Error::bad_data(NAME, "PLIO coding requires integer pixels"));
    }
    if compressed.len() % 2 != 0 {
        return Err(Error::corrupt(NAME, "odd number of bytes in line list"));
    }
    let words: Vec<i16> = compressed.chunks_exact(2).map(read_i16_be).collect();
    let values = plio_decode(&words, count)?;
    ImageData::from_integers(pixel_type, &values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let words = plio_encode(&[0, 0, 5, 5, 5, 0]).unwrap();
        assert_eq!(&words[..3], &[0, 7, -100]);
        assert_eq!(words[3] as usize, words.len());
        assert_eq!(words[4], 0);
    }

    #[test]
    fn test_all_zero_line() {
        let words = plio_encode(&[0; 10]).unwrap();
        assert_eq!(plio_decode(&words, 10).unwrap(), vec![0; 10]);
    }

    #[test]
    fn test_mask_round_trip() {
        let mut line = vec![0i64; 300];
        for x in 20..80 {
            line[x] = 1;
        }
        line[100] = 3;
        for x in 150..290 {
            line[x] = 9000;
        }
        line[299] = 16_777_215;
        let words = plio_encode(&line).unwrap();
        assert!(words.len() < 30);
        assert_eq!(plio_decode(&words, 300).unwrap(), line);
    }

    #[test]
    fn test_alternating_values() {
        let line: Vec<i64> = (0..200).map(|i| (i % 7) * 1000).collect();
        let words = plio_encode(&line).unwrap();
        assert_eq!(plio_decode(&words, 200).unwrap(), line);
    }

    #[test]
    fn test_long_runs_split() {
        let mut line = vec![0i64; 9000];
        line.extend(vec![2i64; 9000]);
        let words = plio_encode(&line).unwrap();
        assert_eq!(plio_decode(&words, 18000).unwrap(), line);
    }

    #[test]
    fn test_old_format_header() {
        // Length in word 2, instructions from word 3: a run of four 1s.
        let words = [0i16, 0, 4, OP_HN as i16 + 4];
        assert_eq!(plio_decode(&words, 6).unwrap(), vec![1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(matches!(
            plio_encode(&[0, -1]),
            Err(Error::BadDataType { .. })
        ));
        assert!(matches!(
            plio_encode(&[PLIO_MAX_VALUE]),
            Err(Error::BadDataType { .. })
        ));
    }

    #[test]
    fn test_truncated_list_is_corrupt() {
        let words = plio_encode(&[1, 2, 3, 4, 5]).unwrap();
        assert!(matches!(
            plio_decode(&words[..words.len() - 1], 5),
            Err(Error::CorruptData { .. })
        ));
    }

    #[test]
    fn test_tile_round_trip() {
        let tile = ImageData::I16(vec![0, 0, 1, 1, 1, 7, 0, 300]);
        let compressed = compress(&tile).unwrap();
        assert_eq!(decompress(&compressed, PixelType::I16, 8).unwrap(), tile);
        assert!(matches!(
            compress(&ImageData::F32(vec![1.0])),
            Err(Error::BadDataType { .. })
        ));
    }
}
