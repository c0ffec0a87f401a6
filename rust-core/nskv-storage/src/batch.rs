// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Batch normalisation shared by all backends.
//
// A batch may name the same key twice. SQL engines reject or arbitrarily
// resolve such batches (`ON CONFLICT DO UPDATE` cannot touch a row twice),
// so every backend collapses duplicates up front with the same rule:
// insert-if-absent keeps the first occurrence, updates keep the last.

use std::collections::{HashMap, HashSet};

/// Keep the first occurrence of every key, preserving input order.
pub(crate) fn first_wins_by<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(key(&item).to_string()) {
            out.push(item);
        }
    }
    out
}

/// Keep the last occurrence of every key, at the position of the first one.
pub(crate) fn last_wins_by<T>(items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(items.len());
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        let existing = index.get(key(&item)).copied();
        match existing {
            Some(slot) => out[slot] = item,
            None => {
                index.insert(key(&item).to_string(), out.len());
                out.push(item);
            }
        }
    }
    out
}

/// Distinct keys, preserving first-seen order.
pub(crate) fn distinct_keys(keys: &[String]) -> Vec<String> {
    first_wins_by(keys.to_vec(), |k| k.as_str())
}

/// Per-key flags: `true` for keys contained in `hits`.
pub(crate) fn flags<'a>(
    keys: impl IntoIterator<Item = &'a String>,
    hits: &HashSet<String>,
) -> HashMap<String, bool> {
    keys.into_iter()
        .map(|key| (key.clone(), hits.contains(key)))
        .collect()
}
