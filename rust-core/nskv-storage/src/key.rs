// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 nskv contributors
//
// Internal key scheme for the in-memory backend.
//
// Many namespaces share one physical map. Each entry is addressed by an
// `InternalKey`, a composite `(namespace, key)` value. Ordering is by
// namespace first, so all entries of a namespace form one contiguous range
// of the map.

use std::fmt;

/// Composite physical key combining a namespace and a logical key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternalKey {
    namespace: String,
    key: String,
}

impl InternalKey {
    /// Build the internal key for `key` inside `namespace`.
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// The smallest internal key of `namespace`; every key of the namespace
    /// sorts at or after it.
    pub fn namespace_start(namespace: &str) -> Self {
        Self::new(namespace, String::new())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// True if this key belongs to `namespace`.
    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.namespace == namespace
    }

    /// Consume the internal key and return the logical key.
    pub fn into_key(self) -> String {
        self.key
    }

    /// Deterministic, injective string encoding: `"{len}:{namespace}{key}"`
    /// where `len` is the namespace length in bytes.
    pub fn encode(&self) -> String {
        format!("{}:{}{}", self.namespace.len(), self.namespace, self.key)
    }

    /// Inverse of [`InternalKey::encode`]. Returns `None` for text that was
    /// not produced by `encode`.
    pub fn decode(encoded: &str) -> Option<Self> {
        let (len, rest) = encoded.split_once(':')?;
        if len.is_empty() || !len.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let len: usize = len.parse().ok()?;
        let namespace = rest.get(..len)?;
        let key = rest.get(len..)?;
        Some(Self::new(namespace, key))
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
