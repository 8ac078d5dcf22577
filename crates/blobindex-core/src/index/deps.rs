//! Module: index::deps
//! Responsibility: out-of-order ingest — the `have → missing` dependency
//! graph and the bounded pool that re-drives indexing when dependencies
//! arrive.
//! Boundary: graph edits happen under the index write lock; the re-index
//! work itself runs on pool workers without holding it.

use crate::{blobref::BlobRef, error::IndexError, keys::MissingRow};
use blobindex_kv::SortedKv;
use crossbeam_channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;

///
/// DepTracker
///
/// `needs[h]` is the set of refs blocking `h`; `needed_by[m]` is the
/// reverse edge set. Both are mirrored on disk as `missing|h|m` rows so a
/// restart resumes with the same graph.
///

#[derive(Default)]
pub struct DepTracker {
    needs: HashMap<BlobRef, HashSet<BlobRef>>,
    needed_by: HashMap<BlobRef, HashSet<BlobRef>>,
}

impl DepTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the `missing|` family.
    pub fn load(kv: &dyn SortedKv) -> Result<Self, IndexError> {
        let mut tracker = Self::new();

        for pair in kv.find_prefix(&format!("{}|", MissingRow::FAMILY))? {
            let (key, _) = pair?;
            match MissingRow::parse(&key) {
                Ok(row) => tracker.add_edge(row.have, row.missing),
                Err(err) => {
                    tracing::warn!(target: "index_deps", %key, %err, "skipping malformed missing row");
                }
            }
        }

        Ok(tracker)
    }

    fn add_edge(&mut self, have: BlobRef, missing: BlobRef) {
        self.needed_by
            .entry(missing.clone())
            .or_default()
            .insert(have.clone());
        self.needs.entry(have).or_default().insert(missing);
    }

    /// Replace `have`'s requirement set. A re-ingest may fail on a
    /// different set than last time; stale reverse edges are dropped.
    pub fn record(&mut self, have: &BlobRef, missing: &[BlobRef]) {
        self.clear_needs(have);
        for m in missing {
            self.add_edge(have.clone(), m.clone());
        }
    }

    fn clear_needs(&mut self, have: &BlobRef) {
        if let Some(old) = self.needs.remove(have) {
            for m in old {
                if let Some(back) = self.needed_by.get_mut(&m) {
                    back.remove(have);
                    if back.is_empty() {
                        self.needed_by.remove(&m);
                    }
                }
            }
        }
    }

    /// Note that `arrived` finished indexing. Returns the dependents whose
    /// requirement sets just drained, in no particular order; the caller
    /// schedules them for re-indexing.
    pub fn on_indexed(&mut self, arrived: &BlobRef) -> Vec<BlobRef> {
        self.clear_needs(arrived);

        let Some(dependents) = self.needed_by.remove(arrived) else {
            return Vec::new();
        };

        let mut ready = Vec::new();
        for have in dependents {
            if let Some(set) = self.needs.get_mut(&have) {
                set.remove(arrived);
                if set.is_empty() {
                    self.needs.remove(&have);
                    ready.push(have);
                }
            }
        }

        ready
    }

    /// Refs still blocking `have`, if any.
    #[must_use]
    pub fn needs_of(&self, have: &BlobRef) -> Option<&HashSet<BlobRef>> {
        self.needs.get(have)
    }

    /// Blobs currently waiting on `missing`, ready or not.
    #[must_use]
    pub fn dependents_of(&self, missing: &BlobRef) -> Vec<BlobRef> {
        self.needed_by
            .get(missing)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.needs.is_empty()
    }
}

///
/// ReindexFn
///

pub type ReindexFn = Box<dyn Fn(&BlobRef) + Send + Sync>;

///
/// ReindexPool
///
/// Fixed worker pool draining the ready queue. Not a thread per dependent:
/// a blob that re-fails simply re-enters the queue on the next trigger.
///

pub struct ReindexPool {
    sender: Option<Sender<BlobRef>>,
    workers: Vec<JoinHandle<()>>,
}

impl ReindexPool {
    pub fn spawn(workers: usize, reindex: ReindexFn) -> Self {
        let (sender, receiver): (Sender<BlobRef>, Receiver<BlobRef>) =
            crossbeam_channel::unbounded();

        let reindex = std::sync::Arc::new(reindex);
        let handles = (0..workers.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                let reindex = std::sync::Arc::clone(&reindex);
                std::thread::Builder::new()
                    .name(format!("blobindex-ooo-{n}"))
                    .spawn(move || {
                        while let Ok(blob_ref) = receiver.recv() {
                            reindex(&blob_ref);
                        }
                    })
                    .expect("spawning reindex worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers: handles,
        }
    }

    pub fn schedule(&self, blob_ref: BlobRef) {
        if let Some(sender) = &self.sender {
            // Send only fails when every worker is gone, i.e. at shutdown.
            let _ = sender.send(blob_ref);
        }
    }
}

impl Drop for ReindexPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain and exit.
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(tag: &str) -> BlobRef {
        BlobRef::from_sha224(tag.as_bytes())
    }

    #[test]
    fn ready_when_last_dependency_arrives() {
        let mut tracker = DepTracker::new();
        let (file, c1, c2) = (blob("file"), blob("c1"), blob("c2"));

        tracker.record(&file, &[c1.clone(), c2.clone()]);
        assert_eq!(tracker.needs_of(&file).unwrap().len(), 2);

        assert!(tracker.on_indexed(&c1).is_empty());
        assert_eq!(tracker.on_indexed(&c2), vec![file]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn record_replaces_stale_edges() {
        let mut tracker = DepTracker::new();
        let (h, old, new) = (blob("h"), blob("old"), blob("new"));

        tracker.record(&h, &[old.clone()]);
        tracker.record(&h, &[new.clone()]);

        // The stale edge must not resurrect h.
        assert!(tracker.on_indexed(&old).is_empty());
        assert_eq!(tracker.on_indexed(&new), vec![h]);
    }

    #[test]
    fn shared_dependency_readies_all_dependents() {
        let mut tracker = DepTracker::new();
        let (h1, h2, m) = (blob("h1"), blob("h2"), blob("m"));

        tracker.record(&h1, &[m.clone()]);
        tracker.record(&h2, &[m.clone()]);

        let mut ready = tracker.on_indexed(&m);
        ready.sort();
        let mut want = vec![h1, h2];
        want.sort();
        assert_eq!(ready, want);
    }

    #[test]
    fn load_round_trips_rows() {
        let kv = blobindex_kv::MemKv::new();
        let (h, m) = (blob("h"), blob("m"));
        kv.set(&MissingRow::key(&h, &m), "1").unwrap();

        let mut tracker = DepTracker::load(&kv).unwrap();
        assert_eq!(tracker.on_indexed(&m), vec![h]);
    }

    #[test]
    fn pool_runs_scheduled_work() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let pool = ReindexPool::spawn(2, Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        for n in 0..8 {
            pool.schedule(blob(&format!("b{n}")));
        }
        drop(pool); // joins workers after the queue drains

        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
