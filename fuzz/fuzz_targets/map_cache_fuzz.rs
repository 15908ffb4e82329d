//! Fuzz test for the versioned map cache
//!
//! Replays an arbitrary sequence of add/get/remove calls against a
//! `MapCache` and a plain model of its rules, and checks they agree after
//! every step.
//!
//! Run with: cargo +nightly fuzz run map_cache_fuzz -- -max_total_time=60

#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use strongbox_storage::{Cache, MapCache};

fuzz_target!(|data: &[u8]| {
    let cache: MapCache<u8, u8> = MapCache::new();
    let mut model: HashMap<u8, (u8, u64)> = HashMap::new();
    let mut watermark = 0u64;

    for op in data.chunks_exact(3) {
        let key = op[1] % 4;
        let version = u64::from(op[2]);
        match op[0] % 3 {
            0 => {
                let accepted = version >= watermark
                    && model.get(&key).map_or(true, |&(_, current)| version >= current);
                if accepted {
                    model.insert(key, (op[0], version));
                }
                assert_eq!(cache.add(key, op[0], version), accepted);
            }
            1 => {
                assert_eq!(cache.get(&key), model.get(&key).map(|&(value, _)| value));
            }
            _ => {
                watermark = watermark.max(version);
                let dropped = matches!(model.get(&key), Some(&(_, current)) if current <= version);
                if dropped {
                    model.remove(&key);
                }
                assert_eq!(cache.remove(&key, version), dropped);
            }
        }
        assert_eq!(cache.len(), model.len());
    }
});
