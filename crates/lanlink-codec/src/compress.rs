//! LZ-style record compression.
//!
//! The body after the 3-byte header is a token stream. A flag byte precedes
//! every group of eight tokens; bit `n` (LSB first) set means token `n` is a
//! back-reference, clear means a literal byte.
//!
//! ```text
//! back-reference word (u16 LE):  dddd dddd dddd llll
//!                                distance     length - 2
//! ```
//!
//! `distance` counts back from the current end of the decompressed body, and
//! a word with distance 0 terminates the stream.

use crate::error::CodecError;
use crate::{CODE_COMPRESSED, CODE_UNCOMPRESSED, HEADER_SIZE};
use std::collections::HashMap;

/// Largest back-reference distance
pub const WINDOW_SIZE: usize = 4095;

/// Shortest match worth a back-reference
pub const MIN_MATCH: usize = 3;

/// Longest match a single back-reference can express
pub const MAX_MATCH: usize = 17;

/// Terminator word
const END_OF_STREAM: u16 = 0;

/// Output of [`decompress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    /// Header plus expanded body (possibly partial)
    pub data: Vec<u8>,
    /// False if the token stream broke off before its terminator
    pub complete: bool,
}

impl Decompressed {
    fn complete(data: Vec<u8>) -> Self {
        Self {
            data,
            complete: true,
        }
    }

    fn partial(data: Vec<u8>) -> Self {
        Self {
            data,
            complete: false,
        }
    }

    /// Reject partial output
    ///
    /// # Errors
    /// Returns [`CodecError::IncompleteStream`] if the stream broke off.
    pub fn into_result(self) -> Result<Vec<u8>, CodecError> {
        if self.complete {
            Ok(self.data)
        } else {
            Err(CodecError::IncompleteStream {
                produced: self.data.len(),
            })
        }
    }
}

/// Compress a record.
///
/// The header is kept with its code switched to [`CODE_COMPRESSED`]. If the
/// token stream would not be strictly shorter, the stored form (code
/// [`CODE_UNCOMPRESSED`], body verbatim) is returned instead. Records already
/// marked compressed, and buffers shorter than the header, pass through.
#[must_use]
pub fn compress(packet: &[u8]) -> Vec<u8> {
    if packet.len() < HEADER_SIZE || packet[0] == CODE_COMPRESSED {
        return packet.to_vec();
    }

    let tokens = encode_tokens(&packet[HEADER_SIZE..]);
    if HEADER_SIZE + tokens.len() < packet.len() {
        let mut out = Vec::with_capacity(HEADER_SIZE + tokens.len());
        out.push(CODE_COMPRESSED);
        out.extend_from_slice(&packet[1..HEADER_SIZE]);
        out.extend_from_slice(&tokens);
        out
    } else {
        let mut out = packet.to_vec();
        out[0] = CODE_UNCOMPRESSED;
        out
    }
}

/// Expand a record compressed by [`compress`].
///
/// The first `header_size` bytes are copied (code switched to
/// [`CODE_UNCOMPRESSED`]) and the rest is expanded one byte at a time, so
/// back-references may overlap the bytes they produce. Records not marked
/// compressed are returned unchanged.
#[must_use]
pub fn decompress(data: &[u8], header_size: usize) -> Decompressed {
    if data.len() < header_size || data.first() != Some(&CODE_COMPRESSED) {
        return Decompressed::complete(data.to_vec());
    }

    let mut out = Vec::with_capacity(data.len() * 2);
    out.extend_from_slice(&data[..header_size]);
    if let Some(code) = out.first_mut() {
        *code = CODE_UNCOMPRESSED;
    }

    let mut pos = header_size;
    loop {
        let Some(&flags) = data.get(pos) else {
            return Decompressed::partial(out);
        };
        pos += 1;

        for bit in 0..8 {
            if flags & (1 << bit) == 0 {
                let Some(&byte) = data.get(pos) else {
                    return Decompressed::partial(out);
                };
                out.push(byte);
                pos += 1;
                continue;
            }

            let Some(word) = data.get(pos..pos + 2) else {
                return Decompressed::partial(out);
            };
            let word = u16::from_le_bytes([word[0], word[1]]);
            pos += 2;

            let distance = usize::from(word >> 4);
            if distance == 0 {
                return Decompressed::complete(out);
            }
            let length = usize::from(word & 0x0F) + 2;
            if distance > out.len() - header_size {
                return Decompressed::partial(out);
            }
            for _ in 0..length {
                let byte = out[out.len() - distance];
                out.push(byte);
            }
        }
    }
}

/// Accumulates tokens behind their flag bytes
struct TokenWriter {
    out: Vec<u8>,
    flag_pos: usize,
    used: u8,
}

impl TokenWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
            flag_pos: 0,
            used: 8,
        }
    }

    fn begin(&mut self, reference: bool) {
        if self.used == 8 {
            self.flag_pos = self.out.len();
            self.out.push(0);
            self.used = 0;
        }
        if reference {
            self.out[self.flag_pos] |= 1 << self.used;
        }
        self.used += 1;
    }

    fn literal(&mut self, byte: u8) {
        self.begin(false);
        self.out.push(byte);
    }

    fn reference(&mut self, word: u16) {
        self.begin(true);
        self.out.extend_from_slice(&word.to_le_bytes());
    }

    fn finish(mut self) -> Vec<u8> {
        self.reference(END_OF_STREAM);
        self.out
    }
}

type MatchKey = [u8; MIN_MATCH];

fn match_key(body: &[u8], pos: usize) -> Option<MatchKey> {
    body.get(pos..pos + MIN_MATCH)
        .map(|k| [k[0], k[1], k[2]])
}

fn encode_tokens(body: &[u8]) -> Vec<u8> {
    let mut writer = TokenWriter::with_capacity(body.len() + body.len() / 8 + 4);
    let mut chains: HashMap<MatchKey, Vec<usize>> = HashMap::new();

    let mut pos = 0;
    while pos < body.len() {
        let (length, distance) = longest_match(body, pos, &chains);
        let step = if length >= MIN_MATCH {
            writer.reference(((distance as u16) << 4) | (length - 2) as u16);
            length
        } else {
            writer.literal(body[pos]);
            1
        };

        for p in pos..pos + step {
            if let Some(key) = match_key(body, p) {
                chains.entry(key).or_default().push(p);
            }
        }
        pos += step;
    }

    writer.finish()
}

/// Longest match for `pos` within the window; ties go to the nearest start.
fn longest_match(body: &[u8], pos: usize, chains: &HashMap<MatchKey, Vec<usize>>) -> (usize, usize) {
    let Some(candidates) = match_key(body, pos).and_then(|key| chains.get(&key)) else {
        return (0, 0);
    };

    let max_len = MAX_MATCH.min(body.len() - pos);
    let mut best = (0, 0);
    for &start in candidates.iter().rev() {
        let distance = pos - start;
        if distance > WINDOW_SIZE {
            break;
        }
        let mut len = 0;
        while len < max_len && body[start + len] == body[pos + len] {
            len += 1;
        }
        if len > best.0 {
            best = (len, distance);
            if len == max_len {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: &[u8]) -> Vec<u8> {
        let mut packet = vec![CODE_UNCOMPRESSED, 0x11, 0x22];
        packet.extend_from_slice(body);
        packet
    }

    #[test]
    fn test_compress_known_vector() {
        let packet = record(b"abcabcabcabc");
        let compressed = compress(&packet);
        assert_eq!(
            compressed,
            vec![
                0x04, 0x11, 0x22, 0x18, b'a', b'b', b'c', 0x37, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_decompress_known_vector() {
        let compressed = [
            0x04, 0x11, 0x22, 0x18, b'a', b'b', b'c', 0x37, 0x00, 0x00, 0x00,
        ];
        let out = decompress(&compressed, HEADER_SIZE);
        assert!(out.complete);
        assert_eq!(out.data, record(b"abcabcabcabc"));
    }

    #[test]
    fn test_run_length_overlap() {
        let packet = record(&[b'a'; 10]);
        let compressed = compress(&packet);
        assert_eq!(&compressed[3..], &[0x06, b'a', 0x17, 0x00, 0x00, 0x00]);

        let out = decompress(&compressed, HEADER_SIZE).into_result().unwrap();
        assert_eq!(out, packet);
    }

    #[test]
    fn test_incompressible_stored() {
        let body: Vec<u8> = (0u8..=255).collect();
        let packet = record(&body);
        let compressed = compress(&packet);
        assert_eq!(compressed[0], CODE_UNCOMPRESSED);
        assert_eq!(compressed, packet);
        assert_eq!(compress(&compressed), compressed);
    }

    #[test]
    fn test_already_compressed_passthrough() {
        let packet = compress(&record(&[7u8; 100]));
        assert_eq!(packet[0], CODE_COMPRESSED);
        assert_eq!(compress(&packet), packet);
    }

    #[test]
    fn test_long_run_roundtrip() {
        let mut body = vec![0u8; 5000];
        body.extend((0..3000).map(|i| (i % 251) as u8));
        body.extend(vec![0xAB; 777]);
        let packet = record(&body);
        let compressed = compress(&packet);
        assert!(compressed.len() < packet.len());

        let out = decompress(&compressed, HEADER_SIZE);
        assert!(out.complete);
        assert_eq!(out.data, packet);
    }

    #[test]
    fn test_truncated_stream_partial() {
        let compressed = compress(&record(b"hello hello hello hello world"));
        let cut = &compressed[..compressed.len() - 4];
        let out = decompress(cut, HEADER_SIZE);
        assert!(!out.complete);
        assert!(out.data.starts_with(&[CODE_UNCOMPRESSED, 0x11, 0x22, b'h']));
        assert!(matches!(
            out.into_result(),
            Err(CodecError::IncompleteStream { .. })
        ));
    }

    #[test]
    fn test_reference_before_start_rejected() {
        // one literal then a reference 5 bytes back
        let data = [0x04, 0, 0, 0b10, b'x', 0x53, 0x00];
        let out = decompress(&data, HEADER_SIZE);
        assert!(!out.complete);
        assert_eq!(out.data, vec![CODE_UNCOMPRESSED, 0, 0, b'x']);
    }

    #[test]
    fn test_uncompressed_passthrough() {
        let packet = record(b"plain");
        let out = decompress(&packet, HEADER_SIZE);
        assert!(out.complete);
        assert_eq!(out.data, packet);
    }

    #[test]
    fn test_short_input_passthrough() {
        assert_eq!(compress(&[0x03, 0x01]), vec![0x03, 0x01]);
        assert!(decompress(&[0x04], HEADER_SIZE).complete);
    }

    #[test]
    fn test_empty_body() {
        let packet = record(&[]);
        let compressed = compress(&packet);
        assert_eq!(compressed, packet);
    }
}
