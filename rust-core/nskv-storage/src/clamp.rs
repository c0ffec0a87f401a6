// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Clamp rule for numeric values.
//
// Write operations accept optional `{min, max}` bounds. Bounds only apply to
// JSON numbers; every other value passes through untouched. The floor is
// applied before the ceiling, i.e. `min(max(v, min), max)`, so a
// misconfigured `min > max` always yields `max`. The SQL backends evaluate
// the same rule inside their statements; this module is the reference used
// by the in-memory backend and the typed facade.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::codec;

/// Optional numeric bounds applied to values on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClampSettings {
    /// Lower bound (floor), applied first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound (ceiling), applied last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ClampSettings {
    /// Bounds with both ends optional.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// Only a lower bound.
    pub fn at_least(min: f64) -> Self {
        Self::new(Some(min), None)
    }

    /// Only an upper bound.
    pub fn at_most(max: f64) -> Self {
        Self::new(None, Some(max))
    }

    /// Both bounds.
    pub fn between(min: f64, max: f64) -> Self {
        Self::new(Some(min), Some(max))
    }

    /// True when neither bound is set.
    pub fn is_noop(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Clamp a raw number: floor first, then ceiling.
    pub fn apply_f64(&self, n: f64) -> f64 {
        let mut clamped = n;
        if let Some(min) = self.min {
            clamped = clamped.max(min);
        }
        if let Some(max) = self.max {
            clamped = clamped.min(max);
        }
        clamped
    }

    /// Clamp a JSON value.
    ///
    /// Non-numeric values are returned unchanged. A number that is already
    /// within bounds keeps its original representation. Integers are compared
    /// with the bounds exactly, so values beyond 2^53 are not rounded into
    /// range.
    pub fn apply(&self, value: &Value) -> Value {
        let Value::Number(n) = value else {
            return value.clone();
        };

        // `None` stands for the original number.
        let mut landed: Option<f64> = None;
        if let Some(min) = self.min {
            if compare(n, min) == Some(Ordering::Less) {
                landed = Some(min);
            }
        }
        if let Some(max) = self.max {
            let above = match landed {
                Some(floor) => floor > max,
                None => compare(n, max) == Some(Ordering::Greater),
            };
            if above {
                landed = Some(max);
            }
        }

        match landed {
            Some(bound) if compare(n, bound) != Some(Ordering::Equal) => {
                codec::number_from_f64(bound).unwrap_or_else(|| value.clone())
            }
            _ => value.clone(),
        }
    }
}

/// Compare a JSON number with a bound without rounding integers to `f64`.
fn compare(n: &Number, bound: f64) -> Option<Ordering> {
    let whole = n
        .as_i64()
        .map(i128::from)
        .or_else(|| n.as_u64().map(i128::from));
    match whole {
        Some(x) if bound.is_finite() && bound.abs() < 1e38 => {
            let floor = bound.floor() as i128;
            Some(match x.cmp(&floor) {
                Ordering::Equal if bound.fract() != 0.0 => Ordering::Less,
                ord => ord,
            })
        }
        _ => n.as_f64()?.partial_cmp(&bound),
    }
}

/// Apply optional clamp settings to a value.
pub fn clamp_value(value: &Value, clamp: Option<&ClampSettings>) -> Value {
    match clamp {
        Some(settings) if !settings.is_noop() => settings.apply(value),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_ceiling() {
        assert_eq!(ClampSettings::at_most(10.0).apply(&json!(20)), json!(10));
    }

    #[test]
    fn test_floor() {
        assert_eq!(ClampSettings::at_least(10.0).apply(&json!(5)), json!(10));
    }

    #[test]
    fn test_within_bounds_keeps_representation() {
        let settings = ClampSettings::between(0.0, 100.0);
        assert_eq!(settings.apply(&json!(5.0)), json!(5.0));
        assert_eq!(settings.apply(&json!(42)), json!(42));
    }

    #[test]
    fn test_fractional_bound() {
        assert_eq!(ClampSettings::at_most(2.5).apply(&json!(3)), json!(2.5));
        assert_eq!(ClampSettings::at_most(2.5).apply(&json!(2)), json!(2));
        assert_eq!(ClampSettings::at_least(2.5).apply(&json!(2)), json!(2.5));
        assert_eq!(ClampSettings::at_least(2.5).apply(&json!(3)), json!(3));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let ceiling = ClampSettings::at_most(9_007_199_254_740_992.0);
        assert_eq!(
            ceiling.apply(&json!(9_007_199_254_740_993_i64)),
            json!(9_007_199_254_740_992_i64)
        );
        assert_eq!(ClampSettings::at_least(0.0).apply(&json!(u64::MAX)), json!(u64::MAX));
        assert_eq!(ClampSettings::at_least(-1.0).apply(&json!(i64::MIN)), json!(-1));
    }

    #[test]
    fn test_in_range_float_keeps_every_digit() {
        let value: Value = serde_json::from_str("0.30000000000000004").unwrap();
        assert_eq!(ClampSettings::between(0.0, 1.0).apply(&value), value);
    }

    #[test]
    fn test_value_equal_to_bound_keeps_text() {
        // 5.0 already equals the ceiling a misconfigured range forces.
        let settings = ClampSettings::between(10.0, 5.0);
        assert_eq!(settings.apply(&json!(5.0)), json!(5.0));
    }

    #[test]
    fn test_non_numeric_passthrough() {
        let settings = ClampSettings::between(0.0, 1.0);
        for value in [json!("20"), json!(true), json!(null), json!([20]), json!({"n": 20})] {
            assert_eq!(settings.apply(&value), value);
        }
    }

    #[test]
    fn test_max_wins_when_misconfigured() {
        // min > max: floor first (-> 10), then ceiling (-> 5).
        let settings = ClampSettings::between(10.0, 5.0);
        assert_eq!(settings.apply(&json!(7)), json!(5));
        assert_eq!(settings.apply(&json!(0)), json!(5));
        assert_eq!(settings.apply(&json!(100)), json!(5));
    }

    #[test]
    fn test_clamp_value_without_settings() {
        assert_eq!(clamp_value(&json!(99), None), json!(99));
        assert_eq!(clamp_value(&json!(99), Some(&ClampSettings::default())), json!(99));
        assert_eq!(clamp_value(&json!(99), Some(&ClampSettings::at_most(1.0))), json!(1));
    }

    #[test]
    fn test_settings_deserialize_with_missing_bounds() {
        let settings: ClampSettings = serde_json::from_str(r#"{"max": 3}"#).unwrap();
        assert_eq!(settings, ClampSettings::at_most(3.0));
        let empty: ClampSettings = serde_json::from_str("{}").unwrap();
        assert!(empty.is_noop());
    }

    proptest! {
        #[test]
        fn prop_result_within_bounds(
            v in -1.0e6f64..1.0e6,
            a in -1.0e3f64..1.0e3,
            b in -1.0e3f64..1.0e3
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let clamped = ClampSettings::between(lo, hi).apply_f64(v);
            prop_assert!(clamped >= lo && clamped <= hi);
        }

        #[test]
        fn prop_floor_then_ceiling(
            v in -1.0e6f64..1.0e6,
            lo in -1.0e3f64..1.0e3,
            hi in -1.0e3f64..1.0e3
        ) {
            let clamped = ClampSettings::between(lo, hi).apply_f64(v);
            prop_assert_eq!(clamped, v.max(lo).min(hi));
        }

        #[test]
        fn prop_large_integers_never_exceed_ceiling(
            v in any::<i64>(),
            hi in -(1i64 << 62)..(1i64 << 62)
        ) {
            let bound = hi as f64;
            let exact = bound as i128;
            let out = ClampSettings::at_most(bound).apply(&json!(v));
            let out = out.as_i64().map(i128::from);
            if i128::from(v) <= exact {
                prop_assert_eq!(out, Some(i128::from(v)));
            } else {
                prop_assert_eq!(out, Some(exact));
            }
        }

        #[test]
        fn prop_strings_untouched(s in ".*", lo in -10.0f64..10.0) {
            let value = json!(s);
            prop_assert_eq!(ClampSettings::at_least(lo).apply(&value), value);
        }
    }
}
