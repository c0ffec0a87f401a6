// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for the namespace-qualified key encoding

#![no_main]

use libfuzzer_sys::fuzz_target;
use nskv_storage::key::InternalKey;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    // Decoding arbitrary input must not panic.
    if let Some(key) = InternalKey::decode(s) {
        assert_eq!(InternalKey::decode(&key.encode()), Some(key));
    }

    // Every split of the input into namespace and key round-trips.
    if let Some(split) = s.char_indices().map(|(i, _)| i).nth(s.chars().count() / 2) {
        let (namespace, key) = s.split_at(split);
        let internal = InternalKey::new(namespace, key);
        assert_eq!(InternalKey::decode(&internal.encode()), Some(internal));
    }
});
