//! Fuzz target: Moyoung packet reassembly
//!
//! Feeds the input in 20-byte notifications. The buffer must never yield a
//! frame over the limit or panic on bad magic and declared lengths.
//!
//! cargo fuzz run fuzz_moyoung_reassembly

#![no_main]

use bandlink::protocol::MoyoungCodec;
use bandlink::reassembly::ReassemblyBuffer;
use libfuzzer_sys::fuzz_target;

const LIMIT: usize = 512;

fuzz_target!(|data: &[u8]| {
    let mut rx = ReassemblyBuffer::new(MoyoungCodec, LIMIT);
    for chunk in data.chunks(20) {
        if let Some(frame) = rx.feed(chunk) {
            assert!(frame.payload.len() <= LIMIT, "frame exceeds limit");
            assert!(frame.endpoint <= 0xff, "packet type wider than a byte");
        }
    }
});
