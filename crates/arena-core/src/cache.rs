//! Interpretation cache
//!
//! Owned by one [`StrategyInterpreter`](crate::interpreter::StrategyInterpreter);
//! lives exactly as long as it does. Entries are write-once: the first value
//! stored under a key is the one every later lookup sees.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::CacheConflict;
use crate::random::fingerprint;
use crate::strategy::InterpretedStrategy;

/// Normalized strategy text.
///
/// Lowercased, whitespace runs collapsed to one space, trimmed. Two texts
/// that differ only in case or spacing share a key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_text(text: &str) -> Self {
        let lowered = text.to_lowercase();
        Self(lowered.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable 64-bit digest, used to seed randomized actions.
    pub fn fingerprint(&self) -> u64 {
        fingerprint(self.0.as_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful [`InterpretationCache::insert`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inserted {
    New,
    /// An equal interpretation was already present.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct InterpretationCache {
    entries: RwLock<HashMap<CacheKey, InterpretedStrategy>>,
}

impl InterpretationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<InterpretedStrategy> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Idempotent insert. Storing a different interpretation under an
    /// existing key is refused.
    pub fn insert(&self, key: CacheKey, value: InterpretedStrategy) -> Result<Inserted, CacheConflict> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&key) {
            Some(existing) if same_result(existing, &value) => Ok(Inserted::Unchanged),
            Some(_) => Err(CacheConflict { key }),
            None => {
                entries.insert(key, value);
                Ok(Inserted::New)
            }
        }
    }

    /// Store `value` unless the key is already taken, and return whatever
    /// the cache holds afterwards. Concurrent misses settle here: the first
    /// writer wins and later writers get the winner back.
    pub fn insert_or_get(&self, key: CacheKey, value: InterpretedStrategy) -> InterpretedStrategy {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(key).or_insert(value).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Names and provenance differ between submitters; only the logic counts.
fn same_result(a: &InterpretedStrategy, b: &InterpretedStrategy) -> bool {
    Arc::ptr_eq(&a.logic, &b.logic) || a.logic == b.logic
}
