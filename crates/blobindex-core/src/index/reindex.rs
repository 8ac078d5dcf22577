//! Module: index::reindex
//! Responsibility: schema-version gating at open and the full wipe+rebuild
//! path that streams every stored blob back through ingest.

use crate::{
    error::{ErrorClass, ErrorOrigin, IndexError},
    index::Index,
    keys::{SCHEMA_VERSION, SchemaVersionRow},
};
use blobindex_kv::SortedKv;
use std::sync::Arc;

///
/// ReindexStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReindexStats {
    pub blobs: u64,
    pub failures: u64,
}

/// Compare the stored schema version against the one this build requires.
///
/// Equal: proceed. Absent on an empty database: stamp it and proceed.
/// Anything else: refuse, unless the caller granted `allow_reindex`, in
/// which case the KV is wiped and restamped and the caller must stream
/// every blob back through ingest. Returns whether that rebuild is owed.
pub(in crate::index) fn ensure_schema_version(
    kv: &dyn SortedKv,
    allow_reindex: bool,
) -> Result<bool, IndexError> {
    let stored = match kv.get(SchemaVersionRow::KEY) {
        Ok(value) => Some(SchemaVersionRow::parse(&value)?),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err.into()),
    };

    match stored {
        Some(version) if version == SCHEMA_VERSION => Ok(false),
        None if kv_is_empty(kv)? => {
            kv.set(SchemaVersionRow::KEY, &SchemaVersionRow::value(SCHEMA_VERSION))?;
            Ok(false)
        }
        other => {
            if !allow_reindex {
                return Err(IndexError::new(
                    ErrorClass::SchemaVersion,
                    ErrorOrigin::Kv,
                    format!(
                        "index schema version is {other:?}, this build requires \
                         {SCHEMA_VERSION}; refusing to start without an explicit reindex"
                    ),
                ));
            }

            tracing::info!(
                target: "index_reindex",
                stored = ?other,
                required = SCHEMA_VERSION,
                "schema version mismatch; wiping for rebuild"
            );
            kv.wipe()?;
            kv.set(SchemaVersionRow::KEY, &SchemaVersionRow::value(SCHEMA_VERSION))?;
            Ok(true)
        }
    }
}

fn kv_is_empty(kv: &dyn SortedKv) -> Result<bool, IndexError> {
    // Row keys are ASCII, so this range covers every key an index ever
    // writes.
    let mut iter = kv.find("\u{0}", "\u{7f}")?;
    Ok(iter.next().transpose()?.is_none())
}

impl Index {
    /// Stream every blob in the source back through ingest.
    ///
    /// Honors the `REINDEX_START` resume marker. Individual blob failures
    /// are counted and logged but do not abort the sweep; out-of-order
    /// arrivals park and complete as their dependencies stream past.
    pub fn reindex_all(self: &Arc<Self>) -> Result<ReindexStats, IndexError> {
        let start = self.settings().reindex_start.clone();
        if let Some(start) = &start {
            tracing::info!(target: "index_reindex", %start, "resuming reindex");
        } else {
            tracing::info!(target: "index_reindex", "starting full reindex");
        }

        let mut stats = ReindexStats::default();
        let mut sweep_err: Option<IndexError> = None;

        self.source.enumerate(start.as_ref(), &mut |blob_ref| {
            stats.blobs += 1;

            match self.source.fetch_bytes(blob_ref) {
                Ok(bytes) => {
                    if let Err(err) = self.receive_blob_bytes(blob_ref, bytes) {
                        stats.failures += 1;
                        tracing::warn!(target: "index_reindex", %blob_ref, %err, "blob failed to index");
                    }
                }
                Err(err) => {
                    // The source just enumerated this ref; a fetch failure
                    // here is transport trouble worth stopping for.
                    sweep_err = Some(err.into());
                    return false;
                }
            }

            if stats.blobs % 1000 == 0 {
                tracing::info!(target: "index_reindex", blobs = stats.blobs, "reindex progress");
            }
            true
        })?;

        if let Some(err) = sweep_err {
            return Err(err);
        }

        tracing::info!(
            target: "index_reindex",
            blobs = stats.blobs,
            failures = stats.failures,
            "reindex complete"
        );
        Ok(stats)
    }
}
