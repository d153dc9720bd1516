//! Fuzz target: UDP wire frame decoding
//!
//! Any datagram must either be rejected or decode to a frame that encodes
//! and decodes back to itself.
//!
//! cargo fuzz run fuzz_wire_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use sparkgrid::adapters::udp_link::{decode_frame, encode_frame};

fuzz_target!(|data: &[u8]| {
    if let Some(frame) = decode_frame(data) {
        let bytes = encode_frame(&frame).expect("decoded frame must re-encode");
        assert_eq!(decode_frame(&bytes), Some(frame));
    }
});
