//! Module: corpus::load
//! Responsibility: the startup scan — `meta|` first, then the remaining
//! cached families on parallel workers merging under the write lock, then
//! the final claim-sort and generation stamp.

use crate::{
    corpus::{Corpus, parse_corpus_row},
    error::IndexError,
    keys::RowFamily,
};
use blobindex_kv::SortedKv;

/// Families scanned concurrently after `meta|`. Each worker parses its own
/// rows and only takes the corpus write lock to merge a chunk.
const PARALLEL_FAMILIES: [RowFamily; 6] = [
    RowFamily::SignerKeyId,
    RowFamily::Claim,
    RowFamily::FileInfo,
    RowFamily::FileTimes,
    RowFamily::ImageSize,
    RowFamily::MediaTag,
];

const MERGE_CHUNK_ROWS: usize = 4096;

impl Corpus {
    /// Build the corpus from a full scan of the sorted KV.
    ///
    /// During the scan, claim order may be violated; a final pass restores
    /// nondecreasing date order per permanode before the corpus is handed
    /// to readers.
    pub fn load(kv: &dyn SortedKv) -> Result<Self, IndexError> {
        let corpus = Self::default();

        // The blob map goes first so every later family joins against it.
        {
            let mut inner = corpus.inner.write();
            for pair in kv.find_prefix(&RowFamily::Meta.prefix())? {
                let (key, value) = pair?;
                if let Some(row) = parse_corpus_row(&key, &value) {
                    inner.apply(row, false);
                }
            }
        }

        std::thread::scope(|scope| -> Result<(), IndexError> {
            let workers: Vec<_> = PARALLEL_FAMILIES
                .iter()
                .map(|family| {
                    let corpus = &corpus;
                    scope.spawn(move || -> Result<(), IndexError> {
                        let mut pending = Vec::new();
                        for pair in kv.find_prefix(&family.prefix())? {
                            let (key, value) = pair?;
                            if let Some(row) = parse_corpus_row(&key, &value) {
                                pending.push(row);
                            }
                            if pending.len() >= MERGE_CHUNK_ROWS {
                                let mut inner = corpus.inner.write();
                                for row in pending.drain(..) {
                                    inner.apply(row, false);
                                }
                            }
                        }

                        let mut inner = corpus.inner.write();
                        for row in pending {
                            inner.apply(row, false);
                        }
                        Ok(())
                    })
                })
                .collect();

            for worker in workers {
                worker.join().expect("corpus load worker panicked")?;
            }
            Ok(())
        })?;

        let mut inner = corpus.inner.write();
        inner.sort_claims();
        inner.generation = 1;

        tracing::info!(
            target: "index_corpus",
            blobs = inner.blobs.len(),
            permanodes = inner.claims.len(),
            files = inner.files.len(),
            interned = inner.strs.len(),
            "corpus loaded"
        );
        drop(inner);

        Ok(corpus)
    }
}
