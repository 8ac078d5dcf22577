//! Module: corpus
//! Responsibility: the optional in-memory mirror of query-relevant index
//! rows — blob metadata, claim histories, signer identities, file and
//! image info, media tags — with interning and per-permanode sorted claim
//! lists.
//! Boundary: loaded once from a full KV scan, then mutated only via
//! `add_blob` replays of committed mutation sets. Reads never touch the KV.
//!
//! Cyclic ownership is avoided by construction: claims store plain BlobRef
//! values, and the authoritative `BlobMeta` records live in a single owner
//! map keyed by ref. Every "pointer" between entities is a map lookup.

mod intern;
mod load;


use crate::{
    blobref::{BlobRef, KeyId},
    contracts::{CANCEL_CHECK_ROWS, Cancel},
    error::{ErrorOrigin, IndexError},
    index::DeleteCache,
    keys::{
        ClaimRow, FileInfoRow, FileTimesRow, ImageSizeRow, MediaTagRow, MetaRow, RowFamily,
        SignerKeyIdRow,
    },
    model::{BlobMeta, CamliType, Claim, FileInfo, ImageInfo, RecentPermanode, reduce_claims},
};
use blobindex_kv::Mutation;
use chrono::{DateTime, Utc};
use intern::StrInterner;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

///
/// Corpus
///

#[derive(Default)]
pub struct Corpus {
    inner: RwLock<CorpusInner>,
}

///
/// FileMeta
/// Corpus-resident slice of a `fileinfo` row, MIME interned.
///

#[derive(Clone, Debug)]
struct FileMeta {
    size: u64,
    file_name: String,
    mime: Arc<str>,
    whole_ref: Option<BlobRef>,
}

#[derive(Default)]
struct CorpusInner {
    generation: u64,
    blobs: HashMap<BlobRef, Arc<BlobMeta>>,
    camli_counts: HashMap<CamliType, usize>,
    key_ids: HashMap<BlobRef, KeyId>,
    signers_by_key_id: HashMap<KeyId, Vec<BlobRef>>,
    claims: HashMap<BlobRef, Vec<Arc<Claim>>>,
    files: HashMap<BlobRef, FileMeta>,
    file_times: HashMap<BlobRef, Vec<DateTime<Utc>>>,
    image_sizes: HashMap<BlobRef, ImageInfo>,
    media_tags: HashMap<BlobRef, BTreeMap<Arc<str>, String>>,
    strs: StrInterner,
}

/// One row in a family the corpus caches.
enum CorpusRow {
    Meta(MetaRow),
    SignerKeyId(SignerKeyIdRow),
    Claim(Claim),
    FileInfo(FileInfoRow),
    FileTimes(FileTimesRow),
    ImageSize(ImageSizeRow),
    MediaTag(MediaTagRow),
}

fn parse_corpus_row(key: &str, value: &str) -> Option<CorpusRow> {
    let family = RowFamily::of_key(key)?;
    let parsed = match family {
        RowFamily::Meta => MetaRow::parse(key, value).map(CorpusRow::Meta),
        RowFamily::SignerKeyId => SignerKeyIdRow::parse(key, value).map(CorpusRow::SignerKeyId),
        RowFamily::Claim => ClaimRow::parse(key, value).map(CorpusRow::Claim),
        RowFamily::FileInfo => FileInfoRow::parse(key, value).map(CorpusRow::FileInfo),
        RowFamily::FileTimes => FileTimesRow::parse(key, value).map(CorpusRow::FileTimes),
        RowFamily::ImageSize => ImageSizeRow::parse(key, value).map(CorpusRow::ImageSize),
        RowFamily::MediaTag => MediaTagRow::parse(key, value).map(CorpusRow::MediaTag),
        _ => return None,
    };

    match parsed {
        Ok(row) => Some(row),
        Err(err) => {
            tracing::warn!(target: "index_corpus", %key, %err, "skipping malformed row");
            None
        }
    }
}

impl CorpusInner {
    /// Merge one parsed row. `sorted_insert` keeps claim lists ordered on
    /// the fly (runtime replays); the loader passes `false` and sorts once
    /// afterwards.
    fn apply(&mut self, row: CorpusRow, sorted_insert: bool) {
        match row {
            CorpusRow::Meta(meta) => {
                let camli_type = CamliType::from_meta_mime(&meta.mime);
                if let Some(t) = camli_type
                    && !self.blobs.contains_key(&meta.blob_ref)
                {
                    *self.camli_counts.entry(t).or_default() += 1;
                }
                self.blobs.insert(
                    meta.blob_ref.clone(),
                    Arc::new(BlobMeta {
                        blob_ref: meta.blob_ref,
                        size: meta.size,
                        camli_type,
                    }),
                );
            }
            CorpusRow::SignerKeyId(row) => {
                let signers = self.signers_by_key_id.entry(row.key_id.clone()).or_default();
                if !signers.contains(&row.signer) {
                    signers.push(row.signer.clone());
                }
                self.key_ids.insert(row.signer, row.key_id);
            }
            CorpusRow::Claim(claim) => {
                let list = self.claims.entry(claim.permanode.clone()).or_default();
                if list.iter().any(|c| c.blob_ref == claim.blob_ref) {
                    return;
                }

                let claim = Arc::new(claim);
                if sorted_insert {
                    let at = list
                        .binary_search_by(|probe| {
                            (probe.date, &probe.blob_ref).cmp(&(claim.date, &claim.blob_ref))
                        })
                        .unwrap_or_else(|i| i);
                    list.insert(at, claim);
                } else {
                    list.push(claim);
                }
            }
            CorpusRow::FileInfo(row) => {
                let mime = self.strs.intern(&row.mime);
                self.files.insert(
                    row.file_ref,
                    FileMeta {
                        size: row.size,
                        file_name: row.file_name,
                        mime,
                        whole_ref: row.whole_ref,
                    },
                );
            }
            CorpusRow::FileTimes(row) => {
                self.file_times.insert(row.file_ref, row.times);
            }
            CorpusRow::ImageSize(row) => {
                self.image_sizes.insert(
                    row.file_ref,
                    ImageInfo {
                        width: row.width,
                        height: row.height,
                    },
                );
            }
            CorpusRow::MediaTag(row) => {
                let tag = self.strs.intern(&row.tag);
                self.media_tags
                    .entry(row.whole_ref)
                    .or_default()
                    .insert(tag, row.value);
            }
        }
    }

    fn sort_claims(&mut self) {
        for list in self.claims.values_mut() {
            list.sort_by(|a, b| (a.date, &a.blob_ref).cmp(&(b.date, &b.blob_ref)));
        }
    }
}

impl Corpus {
    /// Replay one committed mutation set. The generation counter moves
    /// strictly monotonically; readers may key caches on it.
    pub fn add_blob(&self, blob_ref: &BlobRef, mutations: &[Mutation]) {
        let mut inner = self.inner.write();

        for mutation in mutations {
            if let Mutation::Set { key, value } = mutation
                && let Some(row) = parse_corpus_row(key, value)
            {
                inner.apply(row, true);
            }
        }

        inner.generation += 1;
        tracing::debug!(target: "index_corpus", %blob_ref, generation = inner.generation, "replayed mutations");
    }

    /// Cache-invalidation stamp; bumps on every `add_blob`.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    #[must_use]
    pub fn blob_meta(&self, blob_ref: &BlobRef) -> Option<BlobMeta> {
        self.inner.read().blobs.get(blob_ref).map(|m| (**m).clone())
    }

    /// Count of indexed schema blobs of one type.
    #[must_use]
    pub fn camli_type_count(&self, camli_type: CamliType) -> usize {
        self.inner
            .read()
            .camli_counts
            .get(&camli_type)
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn key_id_of_signer(&self, signer: &BlobRef) -> Option<KeyId> {
        self.inner.read().key_ids.get(signer).cloned()
    }

    /// Every signer blob hash a key id has been presented under.
    #[must_use]
    pub fn signer_refs(&self, key_id: &KeyId) -> Vec<BlobRef> {
        self.inner
            .read()
            .signers_by_key_id
            .get(key_id)
            .cloned()
            .unwrap_or_default()
    }

    /// The permanode's claims, date-ascending.
    #[must_use]
    pub fn claims_of(&self, permanode: &BlobRef) -> Vec<Arc<Claim>> {
        self.inner
            .read()
            .claims
            .get(permanode)
            .cloned()
            .unwrap_or_default()
    }

    /// Attribute materialization over the in-memory claim list; must agree
    /// with the KV walk for every input.
    #[must_use]
    pub fn attr_values(
        &self,
        permanode: &BlobRef,
        attr: &str,
        at: DateTime<Utc>,
        signer_filter: Option<&KeyId>,
    ) -> Vec<String> {
        let inner = self.inner.read();
        let Some(claims) = inner.claims.get(permanode) else {
            return Vec::new();
        };

        reduce_claims(claims.iter().map(|c| &**c), attr, at, signer_filter)
    }

    pub fn recent_permanodes(
        &self,
        owner: &KeyId,
        before: Option<DateTime<Utc>>,
        limit: usize,
        deletes: &DeleteCache,
        cancel: &Cancel,
    ) -> Result<Vec<RecentPermanode>, IndexError> {
        let inner = self.inner.read();

        let mut recent = Vec::new();
        for (rows, (permanode, claims)) in inner.claims.iter().enumerate() {
            if rows % CANCEL_CHECK_ROWS == 0 && cancel.is_canceled() {
                return Err(IndexError::canceled(ErrorOrigin::Corpus));
            }

            // Newest qualifying claim by this owner, if any.
            let last_modified = claims
                .iter()
                .rev()
                .filter(|c| c.key_id == *owner)
                .filter(|c| before.is_none_or(|b| c.date <= b))
                .find(|c| !deletes.is_deleted(&c.blob_ref))
                .map(|c| c.date);

            let Some(last_modified) = last_modified else {
                continue;
            };
            if deletes.is_deleted(permanode) {
                continue;
            }

            recent.push(RecentPermanode {
                permanode: permanode.clone(),
                key_id: owner.clone(),
                last_modified,
            });
        }

        recent.sort_by(|a, b| {
            (b.last_modified, &b.permanode).cmp(&(a.last_modified, &a.permanode))
        });
        recent.truncate(limit);
        Ok(recent)
    }

    #[must_use]
    pub fn file_info(&self, file_ref: &BlobRef) -> Option<FileInfo> {
        let inner = self.inner.read();
        let meta = inner.files.get(file_ref)?;
        let times = inner.file_times.get(file_ref);

        Some(FileInfo {
            size: meta.size,
            file_name: meta.file_name.clone(),
            mime_type: meta.mime.to_string(),
            whole_ref: meta.whole_ref.clone(),
            creation_time: times.and_then(|t| t.first().copied()),
            mod_time: times.and_then(|t| t.last().copied()),
        })
    }

    /// Recorded file times, oldest first. Empty when the file has none.
    #[must_use]
    pub fn file_times(&self, file_ref: &BlobRef) -> Vec<DateTime<Utc>> {
        self.inner
            .read()
            .file_times
            .get(file_ref)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn image_info(&self, file_ref: &BlobRef) -> Option<ImageInfo> {
        self.inner.read().image_sizes.get(file_ref).copied()
    }

    #[must_use]
    pub fn media_tags(&self, whole_ref: &BlobRef) -> Option<BTreeMap<String, String>> {
        self.inner.read().media_tags.get(whole_ref).map(|tags| {
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect()
        })
    }

    /// Visit every cached BlobMeta. Order is unspecified.
    pub fn enumerate_blob_meta(&self, mut f: impl FnMut(&BlobMeta)) {
        for meta in self.inner.read().blobs.values() {
            f(meta);
        }
    }
}
