// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for value decoding and the clamp rule

#![no_main]

use libfuzzer_sys::fuzz_target;
use nskv_storage::clamp::ClampSettings;
use nskv_storage::codec;

fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }
    let (bounds, rest) = data.split_at(16);
    let mut min = [0u8; 8];
    let mut max = [0u8; 8];
    min.copy_from_slice(&bounds[..8]);
    max.copy_from_slice(&bounds[8..]);
    let settings = ClampSettings::between(f64::from_le_bytes(min), f64::from_le_bytes(max));

    if let Ok(text) = std::str::from_utf8(rest) {
        // Arbitrary stored text must decode or fail cleanly.
        if let Ok(value) = codec::decode(text) {
            let clamped = settings.apply(&value);

            // Clamping never changes the JSON type of a value.
            assert_eq!(codec::type_name(&clamped), codec::type_name(&value));

            // Whatever the clamp produces can be stored and read back.
            let encoded = codec::encode(&clamped).unwrap();
            let decoded = codec::decode(&encoded).unwrap();
            assert_eq!(codec::type_name(&decoded), codec::type_name(&clamped));
        }
    }
});
