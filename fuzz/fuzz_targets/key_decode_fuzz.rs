//! Fuzz test for the nested-container key decoder
//!
//! Stored keys are read back from disk, so the decoder sees whatever bytes
//! the data file holds. It must never panic, and any key it accepts must
//! re-encode to exactly the same bytes.
//!
//! Run with: cargo +nightly fuzz run key_decode_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use strongbox_storage::layout::{self, KeyKind};

fuzz_target!(|data: &[u8]| {
    let Ok(decoded) = layout::decode_key(data) else {
        return;
    };

    let components = decoded.path.as_slice();
    let (last, containers) = components
        .split_last()
        .expect("a decoded key has at least one component");

    let mut prefix = Vec::new();
    for name in containers {
        prefix = layout::nested_prefix(&prefix, name).expect("decoded container name re-encodes");
    }
    let encoded = match decoded.kind {
        KeyKind::Leaf => layout::leaf_key(&prefix, last),
        KeyKind::Container => layout::container_key(&prefix, last),
    };

    assert_eq!(encoded, data, "decoded key must re-encode to the same bytes");
});
