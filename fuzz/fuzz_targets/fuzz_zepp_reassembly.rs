//! Fuzz target: ZeppOS chunk reassembly
//!
//! Splits the input into chunks at every `0x03` marker and feeds them to a
//! reassembly buffer. Frames must never exceed the frame limit, and after a
//! reset the buffer must still reassemble a well-formed frame.
//!
//! cargo fuzz run fuzz_zepp_reassembly

#![no_main]

use bandlink::protocol::{FrameCodec, ZeppCodec};
use bandlink::reassembly::ReassemblyBuffer;
use libfuzzer_sys::fuzz_target;

const LIMIT: usize = 1024;

fuzz_target!(|data: &[u8]| {
    let mut rx = ReassemblyBuffer::new(ZeppCodec, LIMIT);

    let mut start = 0;
    for i in 1..=data.len() {
        if i == data.len() || data[i] == 0x03 {
            if let Some(frame) = rx.feed(&data[start..i]) {
                assert!(frame.payload.len() <= LIMIT, "frame exceeds limit");
            }
            start = i;
        }
    }

    rx.reset();
    let probe = [0xa5; 40];
    let mut frames = Vec::new();
    for chunk in ZeppCodec.encode(0, 0x001d, &probe, 23, false).unwrap() {
        frames.extend(rx.feed(&chunk));
    }
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload, probe);
});
