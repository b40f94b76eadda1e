//! Fuzz target for the decompressor
//!
//! Arbitrary token streams must never panic or read out of bounds, and
//! anything the compressor produces must expand back to its input.

#![no_main]

use lanlink_codec::{CODE_UNCOMPRESSED, HEADER_SIZE, compress, decompress};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decompress(data, HEADER_SIZE);

    let mut record = vec![CODE_UNCOMPRESSED, 0, 0];
    record.extend_from_slice(data);
    let packed = compress(&record);
    let restored = decompress(&packed, HEADER_SIZE).into_result().ok();
    assert_eq!(restored, Some(record));
});
