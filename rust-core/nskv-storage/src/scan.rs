// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Pattern scan streams.
//
// `KeyPattern` describes the plain-text key filters of the contract
// (everything, prefix, suffix, substring). `paged` turns a "fetch the next
// page after this key" function into a lazy `EntryStream`: a page is only
// requested when the consumer has drained the previous one, and nothing is
// held between pulls, so an abandoned stream leaks no lock or cursor.

use std::future::Future;

use futures::stream::{self, StreamExt, TryStreamExt};

use crate::backend::{Entry, EntryStream};
use crate::error::{StorageError, StorageResult};

/// Key filter applied by `iterate` and the pattern scans.
///
/// Matching is a plain string test on the raw key: no wildcards, no
/// escaping, case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    All,
    StartsWith(String),
    EndsWith(String),
    Includes(String),
}

impl KeyPattern {
    /// Test `key` against the pattern.
    pub fn matches(&self, key: &str) -> bool {
        match self {
            KeyPattern::All => true,
            KeyPattern::StartsWith(prefix) => key.starts_with(prefix.as_str()),
            KeyPattern::EndsWith(suffix) => key.ends_with(suffix.as_str()),
            KeyPattern::Includes(substring) => key.contains(substring.as_str()),
        }
    }

    /// The pattern text, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            KeyPattern::All => None,
            KeyPattern::StartsWith(s) | KeyPattern::EndsWith(s) | KeyPattern::Includes(s) => {
                Some(s)
            }
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            KeyPattern::All => "all",
            KeyPattern::StartsWith(_) => "starts_with",
            KeyPattern::EndsWith(_) => "ends_with",
            KeyPattern::Includes(_) => "includes",
        }
    }
}

/// One page of a paged scan.
#[derive(Debug, Default)]
pub(crate) struct Page {
    /// Entries of this page, in key order.
    pub entries: Vec<Entry>,
    /// Whether another page may follow.
    pub more: bool,
}

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Build a lazy stream from a page fetcher.
///
/// `fetch(None)` returns the first page, `fetch(Some(k))` the page of
/// entries whose key sorts strictly after `k`. The stream ends on the first
/// page that reports `more == false` or comes back empty.
pub(crate) fn paged<'a, F, Fut>(fetch: F) -> EntryStream<'a>
where
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = StorageResult<Page>> + Send + 'a,
{
    stream::try_unfold((Cursor::Start, fetch), |(cursor, mut fetch)| async move {
        let after = match cursor {
            Cursor::Done => return Ok::<_, StorageError>(None),
            Cursor::Start => None,
            Cursor::After(key) => Some(key),
        };
        let page = fetch(after).await?;
        let next = match page.entries.last() {
            Some((last, _)) if page.more => Cursor::After(last.clone()),
            _ => Cursor::Done,
        };
        let entries = stream::iter(page.entries.into_iter().map(Ok::<Entry, StorageError>));
        Ok(Some((entries, (next, fetch))))
    })
    .try_flatten()
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_pattern_matching() {
        assert!(KeyPattern::StartsWith("ab/".into()).matches("ab/a"));
        assert!(!KeyPattern::StartsWith("ab/".into()).matches("a/ab"));
        assert!(KeyPattern::EndsWith("/ab".into()).matches("a/ab"));
        assert!(!KeyPattern::EndsWith("/ab".into()).matches("ab/a"));
        assert!(KeyPattern::Includes("/ab/".into()).matches("b/ab/a"));
        assert!(KeyPattern::All.matches(""));
    }

    #[test]
    fn test_pattern_has_no_wildcards() {
        assert!(!KeyPattern::StartsWith("a%".into()).matches("abc"));
        assert!(KeyPattern::StartsWith("a%".into()).matches("a%c"));
        assert!(!KeyPattern::Includes("_".into()).matches("abc"));
        assert!(!KeyPattern::StartsWith("A".into()).matches("abc"));
    }

    #[test]
    fn test_pattern_text_and_label() {
        assert_eq!(KeyPattern::All.text(), None);
        assert_eq!(KeyPattern::EndsWith("x".into()).text(), Some("x"));
        assert_eq!(KeyPattern::Includes("x".into()).label(), "includes");
    }

    fn numbered(range: std::ops::Range<usize>) -> Vec<Entry> {
        range.map(|i| (format!("k{:03}", i), json!(i))).collect()
    }

    #[tokio::test]
    async fn test_paged_yields_all_pages() {
        let all = numbered(0..7);
        let source = all.clone();
        let stream = paged(move |after: Option<String>| {
            let source = source.clone();
            async move {
                let start = match after {
                    None => 0,
                    Some(key) => source.iter().position(|(k, _)| *k == key).unwrap() + 1,
                };
                let entries: Vec<Entry> = source.iter().skip(start).take(3).cloned().collect();
                let more = start + entries.len() < source.len();
                Ok(Page { entries, more })
            }
        });
        let collected: Vec<Entry> = stream.try_collect().await.unwrap();
        assert_eq!(collected, all);
    }

    #[tokio::test]
    async fn test_paged_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut stream = paged(move |after: Option<String>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let first = after.map(|k| k[1..].parse::<usize>().unwrap() + 1).unwrap_or(0);
                Ok(Page {
                    entries: numbered(first..first + 2),
                    more: true,
                })
            }
        });

        // An endless source: only the pages actually pulled are fetched.
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.0, "k000");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_paged_propagates_errors() {
        let stream = paged(|_after: Option<String>| async {
            Err::<Page, _>(StorageError::message("cursor failed"))
        });
        let result: StorageResult<Vec<Entry>> = stream.try_collect().await;
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_starts_with_agrees_with_std(key in "[ab/%_]{0,6}", prefix in "[ab/%_]{0,3}") {
            let starts = KeyPattern::StartsWith(prefix.clone());
            let ends = KeyPattern::EndsWith(prefix.clone());
            let includes = KeyPattern::Includes(prefix.clone());
            prop_assert_eq!(starts.matches(&key), key.starts_with(&prefix));
            prop_assert_eq!(ends.matches(&key), key.ends_with(&prefix));
            prop_assert_eq!(includes.matches(&key), key.contains(&prefix));
        }
    }
}
