//! Module: index::receive
//! Responsibility: the ingest pipeline — sniff, dispatch by camliType,
//! assemble one atomic batch, commit, and wake dependents.
//! Boundary: row emission lives in claims/files; this module owns ordering,
//! idempotence, the missing-dependency fallback, and lock discipline.

use crate::{
    blobref::BlobRef,
    error::IndexError,
    index::{Index, PendingDelete},
    keys::{HaveRow, MetaRow, MissingRow},
    model::CamliType,
    schema::{SniffedBlob, sniff_blob},
};
use blobindex_kv::Batch;
use std::io::Read;

///
/// ReceiveOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReceiveOutcome {
    /// Fully indexed; the `have` row carries the `|indexed` suffix.
    Indexed,

    /// Already indexed and the reindex override is off; nothing written.
    AlreadyIndexed,

    /// Some dependencies are not yet present. `meta`, `have` (without the
    /// suffix), and `missing` rows were committed; indexing resumes when
    /// the listed refs arrive.
    Parked { missing: Vec<BlobRef> },
}

impl Index {
    /// Ingest one blob from a reader.
    pub fn receive_blob(
        &self,
        blob_ref: &BlobRef,
        reader: &mut dyn Read,
    ) -> Result<ReceiveOutcome, IndexError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| {
                crate::contracts::FetchError::Transport(err.to_string()).into()
            })
            .and_then(|_| self.receive_blob_bytes(blob_ref, bytes))
    }

    /// Ingest one blob already buffered in memory.
    ///
    /// Always succeeds when the blob itself is well-formed: missing
    /// dependencies park the blob rather than failing it, because the
    /// caller has already durably stored the bytes.
    pub fn receive_blob_bytes(
        &self,
        blob_ref: &BlobRef,
        bytes: Vec<u8>,
    ) -> Result<ReceiveOutcome, IndexError> {
        let _flight = self.inflight.enter(blob_ref);

        if !self.settings.redo_index_on_receive && self.already_indexed(blob_ref)? {
            tracing::debug!(target: "index_ingest", %blob_ref, "already indexed; skipping");
            return Ok(ReceiveOutcome::AlreadyIndexed);
        }

        let sniffed = sniff_blob(blob_ref, bytes)?;
        let size = sniffed.size;

        let mut batch = self.kv.begin_batch();
        batch.set(MetaRow::key(blob_ref), MetaRow::value(size, &sniffed.meta_mime()));

        let mut pending_deletes: Vec<PendingDelete> = Vec::new();
        let outcome = match self.dispatch(&sniffed, &mut batch, &mut pending_deletes) {
            Ok(()) => {
                batch.set(HaveRow::key(blob_ref), HaveRow::value(size, true));
                ReceiveOutcome::Indexed
            }
            Err(err) if err.is_missing_dependency() => {
                // Discard the partial mutation set; record only what we
                // know: the blob exists and what it is waiting for.
                let missing = err.missing.clone();
                batch = self.kv.begin_batch();
                batch.set(MetaRow::key(blob_ref), MetaRow::value(size, &sniffed.meta_mime()));
                for m in &missing {
                    batch.set(MissingRow::key(blob_ref, m), "1");
                }
                batch.set(HaveRow::key(blob_ref), HaveRow::value(size, false));
                ReceiveOutcome::Parked { missing }
            }
            Err(err) => return Err(err),
        };

        let ready = self.commit(blob_ref, batch, pending_deletes, &outcome);

        match &outcome {
            ReceiveOutcome::Indexed if self.settings.debug => {
                tracing::info!(target: "index_ingest", %blob_ref, size, "indexed");
            }
            ReceiveOutcome::Indexed => {
                tracing::debug!(target: "index_ingest", %blob_ref, size, "indexed");
            }
            ReceiveOutcome::Parked { missing } => {
                tracing::debug!(target: "index_ingest", %blob_ref, missing = missing.len(), "parked on missing dependencies");
            }
            ReceiveOutcome::AlreadyIndexed => {}
        }

        self.schedule_ready(ready?);
        Ok(outcome)
    }

    fn already_indexed(&self, blob_ref: &BlobRef) -> Result<bool, IndexError> {
        let key = HaveRow::key(blob_ref);
        match self.kv.get(&key) {
            Ok(value) => Ok(HaveRow::parse(&key, &value).map(|row| row.indexed).unwrap_or(false)),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Emit per-type rows. Opaque blobs and bare static-sets produce
    /// nothing beyond `meta`/`have`; permanodes only need their signature
    /// to verify.
    fn dispatch(
        &self,
        sniffed: &SniffedBlob,
        batch: &mut Batch,
        pending_deletes: &mut Vec<PendingDelete>,
    ) -> Result<(), IndexError> {
        let Some(camli_type) = sniffed
            .schema
            .as_ref()
            .and_then(crate::schema::Superset::recognized_type)
        else {
            return Ok(());
        };

        match camli_type {
            CamliType::Permanode => {
                self.verifier
                    .verify(&sniffed.bytes, &*self.source)
                    .map(drop)
                    .map_err(IndexError::from)
            }
            CamliType::Claim => super::claims::claim_mutations(
                sniffed,
                &*self.verifier,
                &*self.source,
                &*self.kv,
                batch,
                pending_deletes,
            ),
            CamliType::File => super::files::file_mutations(
                sniffed,
                &*self.source,
                &*self.media,
                self.settings.debug_images,
                batch,
            ),
            CamliType::Directory => super::files::dir_mutations(sniffed, &*self.source, batch),
            CamliType::Bytes | CamliType::StaticSet => Ok(()),
        }
    }

    /// Commit the batch and perform every post-commit step that must be
    /// atomic with it: delete-cache merge, corpus replay, dependency-graph
    /// maintenance. Returns the blobs readied by this arrival.
    fn commit(
        &self,
        blob_ref: &BlobRef,
        mut batch: Batch,
        pending_deletes: Vec<PendingDelete>,
        outcome: &ReceiveOutcome,
    ) -> Result<Vec<BlobRef>, IndexError> {
        let _write = self.lock.write();

        let mut deps = self.deps.lock();
        let ready = match outcome {
            ReceiveOutcome::Indexed => {
                // A formerly parked blob may complete without each of its
                // dependencies passing through ingest; its own missing rows
                // are stale now.
                if let Some(stale) = deps.needs_of(blob_ref) {
                    for m in stale {
                        batch.delete(MissingRow::key(blob_ref, m));
                    }
                }

                // This blob satisfied its dependents; retire their missing
                // rows in the same atomic batch.
                let dependents = deps.dependents_of(blob_ref);
                for have in &dependents {
                    batch.delete(MissingRow::key(have, blob_ref));
                }
                deps.on_indexed(blob_ref)
            }
            ReceiveOutcome::Parked { missing } => {
                // A re-park may wait on a different set than last time.
                if let Some(old) = deps.needs_of(blob_ref) {
                    for m in old {
                        if !missing.contains(m) {
                            batch.delete(MissingRow::key(blob_ref, m));
                        }
                    }
                }
                deps.record(blob_ref, missing);
                Vec::new()
            }
            ReceiveOutcome::AlreadyIndexed => Vec::new(),
        };
        drop(deps);

        let mutations = batch.mutations().to_vec();
        self.kv.commit_batch(batch)?;

        // Index write lock first, then the cache's own lock: the fixed
        // order prevents lock-order inversions with readers.
        for d in pending_deletes {
            self.deletes.add(d.target, d.deleter, d.when);
        }

        if let Some(corpus) = &self.corpus {
            corpus.add_blob(blob_ref, &mutations);
        }

        Ok(ready)
    }
}
