//! In-memory sorted KV engine.
//!
//! A `BTreeMap` under a `parking_lot::RwLock`. Range iteration collects a
//! snapshot under the read lock, so an open iterator never observes a batch
//! committed after it was created.

use crate::{Batch, KvError, KvIter, KvResult, Mutation, SortedKv};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

///
/// MemKv
///

#[derive(Default)]
pub struct MemKv {
    rows: RwLock<BTreeMap<String, String>>,
}

impl MemKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Row count, for tests and diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Clone the full contents, sorted. Test-oriented: bit-identity checks
    /// compare two of these.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.rows.read().clone()
    }
}

impl SortedKv for MemKv {
    fn get(&self, key: &str) -> KvResult<String> {
        self.rows.read().get(key).cloned().ok_or(KvError::NotFound)
    }

    fn set(&self, key: &str, value: &str) -> KvResult<()> {
        self.rows.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        self.rows.write().remove(key);
        Ok(())
    }

    fn find(&self, start: &str, end: &str) -> KvResult<KvIter> {
        if start > end {
            return Err(KvError::InvalidRange(format!("start {start:?} > end {end:?}")));
        }

        let pairs: Vec<(String, String)> = self
            .rows
            .read()
            .range::<str, _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Box::new(pairs.into_iter().map(Ok)))
    }

    fn commit_batch(&self, batch: Batch) -> KvResult<()> {
        let mut rows = self.rows.write();
        for mutation in batch.into_mutations() {
            match mutation {
                Mutation::Set { key, value } => {
                    rows.insert(key, value);
                }
                Mutation::Delete { key } => {
                    rows.remove(&key);
                }
            }
        }

        Ok(())
    }

    fn wipe(&self) -> KvResult<()> {
        self.rows.write().clear();
        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemKv {
        let kv = MemKv::new();
        for (k, v) in [
            ("claim|a|1", "x"),
            ("claim|a|2", "y"),
            ("claim|b|1", "z"),
            ("meta|a", "3|"),
        ] {
            kv.set(k, v).unwrap();
        }
        kv
    }

    #[test]
    fn get_missing_is_not_found() {
        let kv = MemKv::new();
        assert!(kv.get("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn find_prefix_returns_exactly_the_prefix_range() {
        let kv = seeded();
        let keys: Vec<String> = kv
            .find_prefix("claim|a|")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["claim|a|1", "claim|a|2"]);
    }

    #[test]
    fn find_is_half_open() {
        let kv = seeded();
        let keys: Vec<String> = kv
            .find("claim|a|1", "claim|b|1")
            .unwrap()
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(keys, vec!["claim|a|1", "claim|a|2"]);
    }

    #[test]
    fn find_rejects_inverted_range() {
        let kv = seeded();
        assert!(kv.find("z", "a").is_err());
    }

    #[test]
    fn open_iterator_does_not_observe_later_commits() {
        let kv = seeded();
        let iter = kv.find_prefix("claim|").unwrap();

        let mut batch = Batch::new();
        batch.set("claim|a|3", "late");
        kv.commit_batch(batch).unwrap();

        let keys: Vec<String> = iter.map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec!["claim|a|1", "claim|a|2", "claim|b|1"]);
    }

    #[test]
    fn batch_commit_applies_in_declaration_order() {
        let kv = MemKv::new();
        let mut batch = kv.begin_batch();
        batch.set("k", "1");
        batch.delete("k");
        batch.set("k", "2");
        kv.commit_batch(batch).unwrap();

        assert_eq!(kv.get("k").unwrap(), "2");
    }

    #[test]
    fn wipe_drops_everything() {
        let kv = seeded();
        kv.wipe().unwrap();
        assert!(kv.is_empty());
    }
}
