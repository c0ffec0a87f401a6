// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Value codec.
//
// Stored values are arbitrary JSON documents kept as text, both in the
// in-memory map and in the `value` column of the SQL table. This module owns
// the text representation and the numeric helpers shared by the clamp rule
// and the typed facade.

use serde_json::{Number, Value};

use crate::error::StorageResult;

/// Encode a value to its stored JSON text.
pub fn encode(value: &Value) -> StorageResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode stored JSON text back into a value.
pub fn decode(text: &str) -> StorageResult<Value> {
    Ok(serde_json::from_str(text)?)
}

/// Name of the JSON type of `value`, as reported in type errors.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `n` as an `i64` when it is a whole number inside the `i64` range.
pub fn whole(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64).then(|| n as i64)
}

/// Build a JSON number from an `f64`.
///
/// Integral values inside the `i64` range become JSON integers so that a
/// bound of `10.0` is stored as `10`, the same text the SQL backends produce
/// when they bind integral bounds as integers. Returns `None` for NaN and
/// infinities, which JSON cannot represent.
pub fn number_from_f64(n: f64) -> Option<Value> {
    match whole(n) {
        Some(i) => Some(Value::Number(Number::from(i))),
        None => Number::from_f64(n).map(Value::Number),
    }
}

/// `n + delta` as a JSON number.
///
/// Two whole numbers add exactly as `i64` while the sum fits; everything
/// else goes through `f64`. `None` when the sum is not finite.
pub fn add(n: &Number, delta: f64) -> Option<Value> {
    if let (Some(a), Some(d)) = (n.as_i64(), whole(delta)) {
        if let Some(sum) = a.checked_add(d) {
            return Some(Value::from(sum));
        }
    }
    number_from_f64(n.as_f64()? + delta)
}
