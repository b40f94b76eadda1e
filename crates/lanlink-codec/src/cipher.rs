//! Packet whitening cipher and additive checksum.
//!
//! Each byte at index `i` in `offset+3 .. len-3` is XORed with the one-byte
//! key `(i - offset) as u8` while a wrapping 16-bit sum of the plaintext bytes
//! is accumulated. The sum is stored little-endian at `offset+1`. The trailing
//! three bytes are never whitened.

use crate::error::CodecError;

/// Offset of the 16-bit checksum relative to the record start
pub const CHECKSUM_OFFSET: usize = 1;

/// First whitened byte relative to the record start
pub const CIPHER_START: usize = 3;

/// Number of trailing bytes left in the clear
const CLEAR_TAIL: usize = 3;

/// Shortest buffer the cipher transforms
pub const MIN_CIPHER_LEN: usize = 4;

/// Byte appended to buffers too short to encrypt
pub const PAD_BYTE: u8 = 0x00;

/// Checksums recovered by [`decrypt`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksums {
    /// Checksum carried in the record header
    pub extracted: u16,
    /// Checksum recomputed over the decrypted bytes
    pub computed: u16,
}

impl Checksums {
    /// Whether the stored and recomputed checksums agree
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.extracted == self.computed
    }

    /// Convert a mismatch into a [`CodecError`]
    pub fn verify(self) -> Result<(), CodecError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CodecError::ChecksumMismatch {
                extracted: self.extracted,
                computed: self.computed,
            })
        }
    }
}

/// Whiten `buffer` in place and stamp its checksum.
///
/// Buffers shorter than [`MIN_CIPHER_LEN`] only get [`PAD_BYTE`] appended.
pub fn encrypt(buffer: &mut Vec<u8>) {
    if buffer.len() < MIN_CIPHER_LEN {
        buffer.push(PAD_BYTE);
        return;
    }

    let end = buffer.len() - CLEAR_TAIL;
    let mut check: u16 = 0;
    for (i, byte) in buffer.iter_mut().enumerate().take(end).skip(CIPHER_START) {
        check = check.wrapping_add(u16::from(*byte));
        *byte ^= i as u8;
    }
    buffer[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&check.to_le_bytes());
}

/// Undo [`encrypt`] in place for the record starting at `offset`.
///
/// Returns both the stored and the recomputed checksum; the caller decides
/// what a mismatch means (usually "not addressed to us, drop it").
///
/// # Errors
/// Returns [`CodecError::TooShort`] if fewer than four bytes follow `offset`.
pub fn decrypt(buffer: &mut [u8], offset: usize) -> Result<Checksums, CodecError> {
    let min = offset + MIN_CIPHER_LEN;
    if buffer.len() < min {
        return Err(CodecError::TooShort {
            expected: min,
            actual: buffer.len(),
        });
    }

    let at = offset + CHECKSUM_OFFSET;
    let extracted = u16::from_le_bytes([buffer[at], buffer[at + 1]]);

    let end = buffer.len() - CLEAR_TAIL;
    let mut computed: u16 = 0;
    for i in offset + CIPHER_START..end {
        buffer[i] ^= (i - offset) as u8;
        computed = computed.wrapping_add(u16::from(buffer[i]));
    }

    Ok(Checksums {
        extracted,
        computed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_known_vector() {
        let mut buf = vec![0x03, 0x00, 0x00, 0x10, 0x20, 0xAA, 0xBB, 0xCC];
        encrypt(&mut buf);
        assert_eq!(buf, vec![0x03, 0x30, 0x00, 0x13, 0x24, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn test_decrypt_restores_plaintext() {
        let original: Vec<u8> = (0u8..64).collect();
        let mut buf = original.clone();
        encrypt(&mut buf);
        assert_ne!(buf[3..61], original[3..61]);

        let sums = decrypt(&mut buf, 0).unwrap();
        assert!(sums.is_valid());
        assert_eq!(buf[0], original[0]);
        assert_eq!(buf[3..], original[3..]);
    }

    #[test]
    fn test_decrypt_with_offset() {
        let mut record = vec![0x03, 0x00, 0x00, 1, 2, 3, 4, 5, 6, 7];
        encrypt(&mut record);

        let mut framed = vec![0xEE, 0xEE];
        framed.extend_from_slice(&record);
        let sums = decrypt(&mut framed, 2).unwrap();
        assert!(sums.is_valid());
        assert_eq!(&framed[5..], &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut buf = vec![0x03, 0x00, 0x00, 9, 9, 9, 9, 9, 9];
        encrypt(&mut buf);
        buf[4] ^= 0x01;
        let sums = decrypt(&mut buf, 0).unwrap();
        assert!(!sums.is_valid());
        assert!(matches!(
            sums.verify(),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_wraps() {
        let mut buf = vec![0x03, 0x00, 0x00];
        buf.extend(std::iter::repeat_n(0xFF, 400));
        encrypt(&mut buf);
        let expected = (0xFFu32 * 397) as u16;
        assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), expected);
    }

    #[test]
    fn test_short_buffer_padded() {
        let mut buf = vec![0x03, 0x01];
        encrypt(&mut buf);
        assert_eq!(buf, vec![0x03, 0x01, PAD_BYTE]);
    }

    #[test]
    fn test_decrypt_too_short() {
        let mut buf = vec![0x03, 0x00, 0x00];
        assert!(matches!(
            decrypt(&mut buf, 0),
            Err(CodecError::TooShort {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_minimum_length_has_no_whitened_bytes() {
        let mut buf = vec![0x03, 0x55, 0x55, 0x42];
        encrypt(&mut buf);
        assert_eq!(buf, vec![0x03, 0x00, 0x00, 0x42]);
        let sums = decrypt(&mut buf, 0).unwrap();
        assert_eq!(sums.computed, 0);
        assert!(sums.is_valid());
    }
}
