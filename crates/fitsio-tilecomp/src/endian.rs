//! Big-endian byte conversion for tile payloads.
//!
//! FITS stores every multi-byte value most-significant byte first. The GZIP
//! codecs compress element bytes in that order, and the HCOMPRESS stream
//! header carries big-endian integers.

/// Read a big-endian `i16` from the first 2 bytes of the slice.
#[inline]
pub fn read_i16_be(buf: &[u8]) -> i16 {
    i16::from_be_bytes([buf[0], buf[1]])
}

/// Read a big-endian `i32` from the first 4 bytes of the slice.
#[inline]
pub fn read_i32_be(buf: &[u8]) -> i32 {
    i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}

/// Read a big-endian `i64` from the first 8 bytes of the slice.
#[inline]
pub fn read_i64_be(buf: &[u8]) -> i64 {
    i64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ])
}

/// Convert a buffer of native-endian elements of `width` bytes to big-endian
/// in place. The same swap converts big-endian back to native.
///
/// # Panics
/// Panics if `buf.len()` is not a multiple of `width`.
pub fn swap_to_be(buf: &mut [u8], width: usize) {
    assert!(
        width > 0 && buf.len() % width == 0,
        "buffer length must be a multiple of the element width"
    );
    if cfg!(target_endian = "little") && width > 1 {
        for chunk in buf.chunks_exact_mut(width) {
            chunk.reverse();
        }
    }
}

/// Byte-plane shuffle: gather byte `k` of every element into plane `k`.
///
/// Applied to big-endian element bytes this puts all most-significant bytes
/// first, which deflate compresses far better for smooth integer data.
pub fn shuffle_bytes(buf: &[u8], width: usize) -> alloc::vec::Vec<u8> {
    let n = buf.len() / width;
    let mut out = alloc::vec![0u8; buf.len()];
    for (i, element) in buf.chunks_exact(width).enumerate() {
        for (k, &byte) in element.iter().enumerate() {
            out[k * n + i] = byte;
        }
    }
    out
}

/// Inverse of [`shuffle_bytes`].
pub fn unshuffle_bytes(buf: &[u8], width: usize) -> alloc::vec::Vec<u8> {
    let n = buf.len() / width;
    let mut out = alloc::vec![0u8; buf.len()];
    for (i, element) in out.chunks_exact_mut(width).enumerate() {
        for (k, byte) in element.iter_mut().enumerate() {
            *byte = buf[k * n + i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_be_values() {
        assert_eq!(read_i16_be(&[0xFF, 0xFE]), -2);
        assert_eq!(read_i32_be(&[0x00, 0x00, 0x01, 0x00]), 256);
        assert_eq!(read_i64_be(&(-5i64).to_be_bytes()), -5);
    }

    #[test]
    fn swap_i32_matches_to_be_bytes() {
        let values = [1i32, -1, i32::MIN, 0x0102_0304];
        let mut buf: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        swap_to_be(&mut buf, 4);
        let expected: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        assert_eq!(buf, expected);
    }

    #[test]
    fn swap_width_one_is_identity() {
        let mut buf = vec![1u8, 2, 3];
        swap_to_be(&mut buf, 1);
        assert_eq!(buf, vec![1, 2, 3]);
    }

    #[test]
    #[should_panic]
    fn swap_rejects_ragged_buffer() {
        let mut buf = vec![0u8; 5];
        swap_to_be(&mut buf, 4);
    }

    #[test]
    fn shuffle_groups_byte_planes() {
        let buf = [0x01, 0x02, 0x11, 0x12, 0x21, 0x22];
        let shuffled = shuffle_bytes(&buf, 2);
        assert_eq!(shuffled, vec![0x01, 0x11, 0x21, 0x02, 0x12, 0x22]);
        assert_eq!(unshuffle_bytes(&shuffled, 2), buf.to_vec());
    }
}
