//! Fuzz target: legacy record padding repair
//!
//! Whatever `repair` accepts must be a padded record with a valid checksum,
//! and repairing it again must be a no-op.
//!
//! cargo fuzz run fuzz_padding_repair

#![no_main]

use bandlink::protocol::padding;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some(repaired) = padding::repair(data) else {
        return;
    };
    assert!(repaired.len() == data.len() || repaired.len() == data.len() + 1);

    let again = padding::repair(&repaired).expect("repaired record must stay valid");
    assert_eq!(again.as_ref(), repaired.as_ref());
});
