// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests: every backend behaves like a plain map per namespace.

use std::collections::BTreeMap;

use futures::TryStreamExt;
use proptest::prelude::*;
use serde_json::{json, Value};

use nskv_storage::{ClampSettings, NamespacedStorage, SharedMap, SqliteStorage, UpsertItem};

#[derive(Debug, Clone)]
enum Op {
    Insert(String, i64),
    Update(String, i64),
    Upsert(String, i64, i64),
    Remove(String),
    Clear,
}

/// Keys from a tiny alphabet so operations collide often.
fn arb_key() -> impl Strategy<Value = String> {
    "[ab/]{1,3}"
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (arb_key(), -50i64..50).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => (arb_key(), -50i64..50).prop_map(|(k, v)| Op::Update(k, v)),
        3 => (arb_key(), -50i64..50, -50i64..50).prop_map(|(k, i, u)| Op::Upsert(k, i, u)),
        2 => arb_key().prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn arb_clamp() -> impl Strategy<Value = Option<ClampSettings>> {
    prop_oneof![
        Just(None),
        (-20i64..20).prop_map(|min| Some(ClampSettings::at_least(min as f64))),
        (-20i64..20).prop_map(|max| Some(ClampSettings::at_most(max as f64))),
    ]
}

fn clamped(value: i64, clamp: Option<&ClampSettings>) -> i64 {
    match clamp {
        Some(settings) => settings.apply_f64(value as f64) as i64,
        None => value,
    }
}

/// Apply `ops` to `storage` and to a model map, comparing every reported
/// flag and the final contents. `other` shares the store and must stay
/// untouched.
async fn run_against_model<S: NamespacedStorage>(
    storage: &S,
    other: &S,
    ops: &[Op],
    clamp: Option<ClampSettings>,
) -> Result<(), TestCaseError> {
    let clamp = clamp.as_ref();
    other
        .insert_if_not_exists_many(vec![("a".to_string(), json!("other"))], None)
        .await
        .unwrap();

    let mut model: BTreeMap<String, i64> = BTreeMap::new();
    for op in ops {
        match op {
            Op::Insert(key, value) => {
                let result = storage
                    .insert_if_not_exists_many(vec![(key.clone(), json!(value))], clamp)
                    .await
                    .unwrap();
                let expected = !model.contains_key(key);
                if expected {
                    model.insert(key.clone(), clamped(*value, clamp));
                }
                prop_assert_eq!(result[key], expected);
            }
            Op::Update(key, value) => {
                let result = storage
                    .update_if_exists_many(vec![(key.clone(), json!(value))], clamp)
                    .await
                    .unwrap();
                let expected = model.contains_key(key);
                if expected {
                    model.insert(key.clone(), clamped(*value, clamp));
                }
                prop_assert_eq!(result[key], expected);
            }
            Op::Upsert(key, insert, update) => {
                let item = UpsertItem::new(key.clone(), json!(insert), json!(update));
                storage
                    .insert_or_update_many(vec![item], clamp)
                    .await
                    .unwrap();
                let next = if model.contains_key(key) { *update } else { *insert };
                model.insert(key.clone(), clamped(next, clamp));
            }
            Op::Remove(key) => {
                let result = storage.remove_if_exists_many(&[key.clone()]).await.unwrap();
                prop_assert_eq!(result[key], model.remove(key).is_some());
            }
            Op::Clear => {
                storage.clear().await.unwrap();
                model.clear();
            }
        }
    }

    let stored: BTreeMap<String, Value> = storage
        .iterate()
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .into_iter()
        .collect();
    let expected: BTreeMap<String, Value> =
        model.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
    prop_assert_eq!(stored, expected);
    prop_assert_eq!(storage.size().await.unwrap(), model.len() as u64);

    let mut prefixed: Vec<String> = storage
        .get_starts_with_many("a")
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    prefixed.sort();
    let expected_prefixed: Vec<String> =
        model.keys().filter(|k| k.starts_with('a')).cloned().collect();
    prop_assert_eq!(prefixed, expected_prefixed);

    // The neighbouring namespace never changes.
    prop_assert_eq!(other.size().await.unwrap(), 1);
    Ok(())
}

proptest! {
    #[test]
    fn test_memory_matches_model(
        ops in prop::collection::vec(arb_op(), 1..40),
        clamp in arb_clamp()
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let map = SharedMap::new();
            let storage = map.namespace("subject");
            let other = map.namespace("neighbour");
            run_against_model(&storage, &other, &ops, clamp).await
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_sqlite_matches_model(
        ops in prop::collection::vec(arb_op(), 1..30),
        clamp in arb_clamp()
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            let storage = SqliteStorage::connect(pool, "subject").await.unwrap();
            let other = storage.sibling("neighbour");
            run_against_model(&storage, &other, &ops, clamp).await
        })?;
    }
}
