//! Module: index
//! Responsibility: the indexer itself — ingest orchestration, the
//! dependency tracker, the delete cache, schema versioning, and the query
//! surface over the sorted KV.
//! Boundary: storage engines, signature verification, blob transport, and
//! media decoding come in through contracts; the optional corpus mirrors
//! committed mutations and serves reads when present.

mod claims;
mod deletes;
mod deps;
mod files;
mod query;
mod receive;
mod reindex;

#[cfg(test)]
mod tests;

pub use deletes::DeleteCache;
pub use deps::DepTracker;
pub use receive::ReceiveOutcome;
pub use reindex::ReindexStats;

use crate::{
    blobref::BlobRef,
    contracts::{BlobSource, MediaSniffer, NoopMedia, SignatureVerifier},
    corpus::Corpus,
    error::IndexError,
    settings::IndexSettings,
};
use blobindex_kv::SortedKv;
use chrono::{DateTime, Utc};
use deps::ReindexPool;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashSet;
use std::sync::Arc;

///
/// PendingDelete
///
/// A delete claim observed while building a mutation set; merged into the
/// delete cache after its batch commits.
///

#[derive(Clone, Debug)]
pub(in crate::index) struct PendingDelete {
    pub target: BlobRef,
    pub deleter: BlobRef,
    pub when: DateTime<Utc>,
}

///
/// InFlight
///
/// Singleflight guard: concurrent `receive_blob` calls for one ref run the
/// indexing work at most once; latecomers wait, then hit the fast path.
///

#[derive(Default)]
struct InFlight {
    set: Mutex<HashSet<BlobRef>>,
    cond: Condvar,
}

impl InFlight {
    fn enter(&self, blob_ref: &BlobRef) -> FlightGuard<'_> {
        let mut set = self.set.lock();
        while set.contains(blob_ref) {
            self.cond.wait(&mut set);
        }
        set.insert(blob_ref.clone());

        FlightGuard {
            inflight: self,
            blob_ref: blob_ref.clone(),
        }
    }
}

struct FlightGuard<'a> {
    inflight: &'a InFlight,
    blob_ref: BlobRef,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inflight.set.lock().remove(&self.blob_ref);
        self.inflight.cond.notify_all();
    }
}

///
/// IndexConfig
///

pub struct IndexConfig {
    pub settings: IndexSettings,
    pub media: Arc<dyn MediaSniffer>,
    /// Mirror committed mutations into an in-memory corpus and serve reads
    /// from it.
    pub enable_corpus: bool,
    /// Permission to wipe and rebuild when the stored schema version does
    /// not match. Without it a mismatch refuses to open.
    pub allow_reindex: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            settings: IndexSettings::default(),
            media: Arc::new(NoopMedia),
            enable_corpus: false,
            allow_reindex: false,
        }
    }
}

///
/// Index
///
/// All writes go through `receive_blob`, which commits one atomic batch
/// per blob under the write lock. Readers take the read lock for the
/// duration of a KV query; when the corpus is enabled they take only the
/// corpus lock. The delete cache is updated under the index write lock
/// then its own lock, in that order.
///

pub struct Index {
    kv: Arc<dyn SortedKv>,
    source: Arc<dyn BlobSource>,
    verifier: Arc<dyn SignatureVerifier>,
    media: Arc<dyn MediaSniffer>,
    settings: IndexSettings,
    lock: RwLock<()>,
    deletes: DeleteCache,
    deps: Mutex<DepTracker>,
    corpus: Option<Corpus>,
    inflight: InFlight,
    pool: Mutex<Option<ReindexPool>>,
}

impl Index {
    /// Open an index over `kv`.
    ///
    /// Checks the stored schema version, loads the delete cache and
    /// dependency graph, optionally loads the corpus, and spawns the
    /// out-of-order re-index pool.
    pub fn open(
        kv: Arc<dyn SortedKv>,
        source: Arc<dyn BlobSource>,
        verifier: Arc<dyn SignatureVerifier>,
        config: IndexConfig,
    ) -> Result<Arc<Self>, IndexError> {
        let needs_rebuild = reindex::ensure_schema_version(&*kv, config.allow_reindex)?;

        let deletes = DeleteCache::load(&*kv)?;
        let deps = DepTracker::load(&*kv)?;
        let corpus = if config.enable_corpus {
            Some(Corpus::load(&*kv)?)
        } else {
            None
        };

        let index = Arc::new(Self {
            kv,
            source,
            verifier,
            media: config.media,
            settings: config.settings,
            lock: RwLock::new(()),
            deletes,
            deps: Mutex::new(deps),
            corpus,
            inflight: InFlight::default(),
            pool: Mutex::new(None),
        });

        if !index.settings.disable_ooo_pool {
            let weak = Arc::downgrade(&index);
            let pool = ReindexPool::spawn(
                index.settings.reindex_workers,
                Box::new(move |blob_ref| {
                    if let Some(index) = weak.upgrade() {
                        index.reindex_one(blob_ref);
                    }
                }),
            );
            *index.pool.lock() = Some(pool);
        }

        if needs_rebuild {
            index.reindex_all()?;
        }

        Ok(index)
    }

    #[must_use]
    pub const fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// The in-memory corpus, when enabled at open.
    #[must_use]
    pub const fn corpus(&self) -> Option<&Corpus> {
        self.corpus.as_ref()
    }

    /// Effective deleted state of any blob (permanode or claim).
    #[must_use]
    pub fn is_deleted(&self, blob_ref: &BlobRef) -> bool {
        self.deletes.is_deleted(blob_ref)
    }

    /// Deleted state plus the date of the most recent state change.
    #[must_use]
    pub fn deleted_at(&self, blob_ref: &BlobRef) -> (bool, Option<DateTime<Utc>>) {
        self.deletes.deleted_at(blob_ref)
    }

    /// Re-drive one parked blob through ingest. Pool workers and the
    /// synchronous test path land here; failures are logged, not
    /// propagated, because arrival of further dependencies will retry.
    fn reindex_one(&self, blob_ref: &BlobRef) {
        match self.source.fetch_bytes(blob_ref) {
            Ok(bytes) => match self.receive_blob_bytes(blob_ref, bytes) {
                Ok(outcome) => {
                    tracing::debug!(target: "index_deps", %blob_ref, ?outcome, "re-indexed dependent");
                }
                Err(err) => {
                    tracing::warn!(target: "index_deps", %blob_ref, %err, "re-index failed");
                }
            },
            Err(err) => {
                tracing::warn!(target: "index_deps", %blob_ref, %err, "re-index fetch failed");
            }
        }
    }

    /// Hand newly ready blobs to the pool, or run them inline when the
    /// pool is disabled for deterministic tests.
    fn schedule_ready(&self, ready: Vec<BlobRef>) {
        if ready.is_empty() {
            return;
        }

        let pool = self.pool.lock();
        if let Some(pool) = pool.as_ref() {
            for blob_ref in ready {
                pool.schedule(blob_ref);
            }
        } else {
            drop(pool);
            for blob_ref in ready {
                self.reindex_one(&blob_ref);
            }
        }
    }

    /// Block until the out-of-order pool has drained every scheduled
    /// re-index, then restart it. Test and shutdown convenience.
    ///
    /// While the pool is down, concurrently readied blobs fall back to the
    /// inline path, so no work is lost.
    pub fn flush_reindex_queue(self: &Arc<Self>) {
        let old = self.pool.lock().take();
        // Dropping the pool closes its queue and joins the workers.
        drop(old);

        if self.settings.disable_ooo_pool {
            return;
        }

        let weak = Arc::downgrade(self);
        let pool = ReindexPool::spawn(
            self.settings.reindex_workers,
            Box::new(move |blob_ref| {
                if let Some(index) = weak.upgrade() {
                    index.reindex_one(blob_ref);
                }
            }),
        );
        *self.pool.lock() = Some(pool);
    }
}
