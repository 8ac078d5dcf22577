//! Module: index::deletes
//! Responsibility: the delete cache — per-target deleter lists and the
//! recursive effective-deleted computation.
//! Boundary: populated from `deleted|` rows at startup and mutated only
//! after a commit, under the index write lock then the cache write lock.

use crate::{
    blobref::BlobRef,
    error::IndexError,
    keys::DeletedRow,
    model::DeletionRecord,
};
use blobindex_kv::SortedKv;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

///
/// DeleteCache
///
/// `target → deleters, newest first`. A target is effectively deleted iff
/// some deleter of it is itself not effectively deleted. The deleter graph
/// is acyclic (every deletion claim is newer than its target), so the
/// recursion terminates; results are memoized within a single call.
///

#[derive(Default)]
pub struct DeleteCache {
    map: RwLock<HashMap<BlobRef, Vec<DeletionRecord>>>,
}

impl DeleteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate from a full scan of the `deleted|` family.
    pub fn load(kv: &dyn SortedKv) -> Result<Self, IndexError> {
        let cache = Self::new();

        {
            let mut map = cache.map.write();
            for pair in kv.find_prefix(&format!("{}|", DeletedRow::FAMILY))? {
                let (key, _) = pair?;
                match DeletedRow::parse(&key) {
                    Ok(row) => insert_record(&mut map, row.target, row.deleter, row.when),
                    Err(err) => {
                        tracing::warn!(target: "index_deletes", %key, %err, "skipping malformed deleted row");
                    }
                }
            }
        }

        Ok(cache)
    }

    /// Record one delete claim. Called while the committing thread holds
    /// the index write lock, so readers never observe the row without the
    /// cache entry or vice versa.
    pub fn add(&self, target: BlobRef, deleter: BlobRef, when: DateTime<Utc>) {
        insert_record(&mut self.map.write(), target, deleter, when);
    }

    /// Effective deleted state of `target` right now.
    #[must_use]
    pub fn is_deleted(&self, target: &BlobRef) -> bool {
        let map = self.map.read();
        let mut memo = HashMap::new();
        is_deleted_memo(&map, &mut memo, target)
    }

    /// Effective deleted state plus the date of the most recent
    /// state-changing claim, when one exists.
    #[must_use]
    pub fn deleted_at(&self, target: &BlobRef) -> (bool, Option<DateTime<Utc>>) {
        let map = self.map.read();
        let mut memo = HashMap::new();
        deleted_at_memo(&map, &mut memo, target)
    }

    /// Number of targets with at least one deleter. Diagnostics only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

fn insert_record(
    map: &mut HashMap<BlobRef, Vec<DeletionRecord>>,
    target: BlobRef,
    deleter: BlobRef,
    when: DateTime<Utc>,
) {
    let records = map.entry(target).or_default();
    if records.iter().any(|r| r.deleter == deleter) {
        return;
    }

    let record = DeletionRecord { deleter, when };
    let at = records
        .binary_search_by(|probe| record.when.cmp(&probe.when))
        .unwrap_or_else(|i| i);
    records.insert(at, record);
}

fn is_deleted_memo(
    map: &HashMap<BlobRef, Vec<DeletionRecord>>,
    memo: &mut HashMap<BlobRef, bool>,
    target: &BlobRef,
) -> bool {
    if let Some(&answer) = memo.get(target) {
        return answer;
    }
    // Seed false before recursing: on (malformed) cyclic input the revisit
    // reads the seed and the walk still terminates.
    memo.insert(target.clone(), false);

    let deleted = map
        .get(target)
        .is_some_and(|records| records.iter().any(|r| !is_deleted_memo(map, memo, &r.deleter)));

    memo.insert(target.clone(), deleted);
    deleted
}

fn deleted_at_memo(
    map: &HashMap<BlobRef, Vec<DeletionRecord>>,
    memo: &mut HashMap<BlobRef, bool>,
    target: &BlobRef,
) -> (bool, Option<DateTime<Utc>>) {
    let Some(records) = map.get(target) else {
        return (false, None);
    };

    // Newest live deleter wins.
    for record in records {
        if !is_deleted_memo(map, memo, &record.deleter) {
            return (true, Some(record.when));
        }
    }

    // Every deleter is itself deleted; the state change is whenever the
    // newest of them was put down.
    let when = records
        .iter()
        .filter_map(|r| deleted_at_memo(map, memo, &r.deleter).1)
        .max();

    (false, when.or_else(|| records.first().map(|r| r.when)))
}

///
/// TESTS
///
