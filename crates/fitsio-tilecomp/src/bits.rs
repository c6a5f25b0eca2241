//! MSB-first bit packing shared by the Rice and HCOMPRESS codecs.

use alloc::vec::Vec;

/// Position of the most significant 1-bit for each byte value 0..255.
const NONZERO_COUNT: [u8; 256] = [
    0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
    8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

/// Appends bit fields to a byte vector, most significant bit first.
pub struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    pending: u32,
}

impl BitWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        BitWriter {
            out: Vec::with_capacity(bytes),
            acc: 0,
            pending: 0,
        }
    }

    /// Write the low `nbits` bits of `value` (`nbits <= 32`).
    pub fn write_bits(&mut self, value: u32, nbits: u32) {
        debug_assert!(nbits <= 32);
        if nbits == 0 {
            return;
        }
        let masked = (value as u64) & ((1u64 << nbits) - 1);
        self.acc = (self.acc << nbits) | masked;
        self.pending += nbits;
        while self.pending >= 8 {
            self.pending -= 8;
            self.out.push((self.acc >> self.pending) as u8);
        }
        self.acc &= (1u64 << self.pending) - 1;
    }

    /// Write `count` zero bits.
    pub fn write_zeros(&mut self, mut count: u64) {
        while count >= 32 {
            self.write_bits(0, 32);
            count -= 32;
        }
        self.write_bits(0, count as u32);
    }

    /// Pad the current byte with zero bits.
    pub fn align(&mut self) {
        if self.pending > 0 {
            let pad = 8 - self.pending;
            self.write_bits(0, pad);
        }
    }

    /// Flush any partial byte and return the packed bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.align();
        self.out
    }
}

/// Reads bit fields from a byte slice, most significant bit first.
///
/// Every read returns `None` once the input is exhausted.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    // Never more than 8 between calls.
    nbits: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
        }
    }

    fn load_byte(&mut self) -> Option<()> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        self.acc = (self.acc << 8) | byte as u64;
        self.nbits += 8;
        Some(())
    }

    /// Read `nbits` bits (`nbits <= 32`) as an unsigned value.
    pub fn read_bits(&mut self, nbits: u32) -> Option<u32> {
        debug_assert!(nbits <= 32);
        if nbits == 0 {
            return Some(0);
        }
        while self.nbits < nbits {
            self.load_byte()?;
        }
        self.nbits -= nbits;
        let value = (self.acc >> self.nbits) & ((1u64 << nbits) - 1);
        self.acc &= (1u64 << self.nbits) - 1;
        Some(value as u32)
    }

    pub fn read_bit(&mut self) -> Option<bool> {
        self.read_bits(1).map(|b| b == 1)
    }

    /// Count zero bits up to and including the next 1-bit, returning the
    /// number of zeros.
    pub fn read_unary(&mut self) -> Option<u64> {
        let mut zeros = 0u64;
        loop {
            if self.nbits == 0 {
                self.load_byte()?;
            }
            if self.acc == 0 {
                zeros += self.nbits as u64;
                self.nbits = 0;
                continue;
            }
            let top = NONZERO_COUNT[self.acc as usize] as u32;
            zeros += (self.nbits - top) as u64;
            self.nbits = top - 1;
            self.acc &= (1u64 << self.nbits) - 1;
            return Some(zeros);
        }
    }

    /// Drop the unread bits of the current byte.
    pub fn align(&mut self) {
        self.nbits = 0;
        self.acc = 0;
    }

    /// Bytes consumed so far, counting a partially read byte as consumed.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonzero_count_table() {
        assert_eq!(NONZERO_COUNT[0], 0);
        assert_eq!(NONZERO_COUNT[1], 1);
        assert_eq!(NONZERO_COUNT[2], 2);
        assert_eq!(NONZERO_COUNT[3], 2);
        assert_eq!(NONZERO_COUNT[128], 8);
        assert_eq!(NONZERO_COUNT[255], 8);
    }

    #[test]
    fn writer_packs_msb_first() {
        let mut w = BitWriter::with_capacity(4);
        w.write_bits(0b101, 3);
        w.write_bits(0b1, 1);
        w.write_bits(0xF, 4);
        w.write_bits(0b11, 2);
        assert_eq!(w.finish(), vec![0b1011_1111, 0b1100_0000]);
    }

    #[test]
    fn writer_handles_full_words() {
        let mut w = BitWriter::with_capacity(8);
        w.write_bits(1, 1);
        w.write_bits(0xDEAD_BEEF, 32);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(1), Some(1));
        assert_eq!(r.read_bits(32), Some(0xDEAD_BEEF));
    }

    #[test]
    fn unary_counts_across_bytes() {
        let mut w = BitWriter::with_capacity(8);
        w.write_zeros(19);
        w.write_bits(1, 1);
        w.write_bits(0b0110, 4);
        w.write_bits(1, 1);
        let bytes = w.finish();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_unary(), Some(19));
        assert_eq!(r.read_bits(4), Some(0b0110));
        assert_eq!(r.read_unary(), Some(0));
    }

    #[test]
    fn reader_reports_exhaustion() {
        let mut r = BitReader::new(&[0xFF]);
        assert_eq!(r.read_bits(6), Some(0x3F));
        assert_eq!(r.read_bits(4), None);
        let mut r = BitReader::new(&[0x00]);
        assert_eq!(r.read_unary(), None);
    }

    #[test]
    fn align_skips_to_next_byte() {
        let mut r = BitReader::new(&[0b1000_0000, 0xAB]);
        assert_eq!(r.read_bit(), Some(true));
        r.align();
        assert_eq!(r.read_bits(8), Some(0xAB));
        assert_eq!(r.position(), 2);
    }
}
