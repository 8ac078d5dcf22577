//! Module: index::query
//! Responsibility: read operations over the index — claim materialization,
//! recency enumeration, edges, paths, directory members, file metadata.
//! Boundary: with the corpus enabled, reads it serves never touch the KV;
//! malformed rows are logged and skipped, never fatal to a query.

use crate::{
    blobref::{BlobRef, KeyId},
    contracts::{CANCEL_CHECK_ROWS, Cancel},
    error::{ErrorOrigin, IndexError},
    index::Index,
    keys::{
        ClaimRow, DirChildRow, EdgeBackRow, FileInfoRow, FileTimesRow, HaveRow, ImageSizeRow,
        MediaTagRow, MetaRow, PathRow, RecpnRow, SignerAttrValueRow, SignerKeyIdRow,
        SignerTargetPathRow, WholeToFileRow,
    },
    model::{
        BlobMeta, CamliType, Claim, EdgeTo, EdgeType, FileInfo, ImageInfo, PathClaim,
        RecentPermanode, reduce_claims,
    },
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

fn warn_row(key: &str, err: &dyn std::fmt::Display) {
    tracing::warn!(target: "index_query", %key, %err, "skipping malformed row");
}

fn check_cancel(cancel: &Cancel, rows: usize) -> Result<(), IndexError> {
    if rows % CANCEL_CHECK_ROWS == 0 && cancel.is_canceled() {
        return Err(IndexError::canceled(ErrorOrigin::Query));
    }
    Ok(())
}

impl Index {
    /// Metadata of one indexed blob.
    pub fn get_blob_meta(&self, blob_ref: &BlobRef) -> Result<BlobMeta, IndexError> {
        if let Some(corpus) = self.corpus() {
            return corpus
                .blob_meta(blob_ref)
                .ok_or_else(|| IndexError::not_found(ErrorOrigin::Query, blob_ref.to_string()));
        }

        let _read = self.lock.read();
        let key = MetaRow::key(blob_ref);
        let value = self.kv.get(&key)?;
        let row = MetaRow::parse(&key, &value)?;

        Ok(BlobMeta {
            blob_ref: row.blob_ref,
            size: row.size,
            camli_type: CamliType::from_meta_mime(&row.mime),
        })
    }

    /// Whether the blob is stored, and whether its indexing completed.
    pub fn have_blob(&self, blob_ref: &BlobRef) -> Result<Option<(u64, bool)>, IndexError> {
        let _read = self.lock.read();
        let key = HaveRow::key(blob_ref);
        match self.kv.get(&key) {
            Ok(value) => {
                let row = HaveRow::parse(&key, &value)?;
                Ok(Some((row.size, row.indexed)))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// The verified key id a signer blob signed with.
    pub fn key_id_of_signer(&self, signer: &BlobRef) -> Result<KeyId, IndexError> {
        if let Some(corpus) = self.corpus() {
            return corpus
                .key_id_of_signer(signer)
                .ok_or_else(|| IndexError::not_found(ErrorOrigin::Query, signer.to_string()));
        }

        let _read = self.lock.read();
        let key = SignerKeyIdRow::key(signer);
        let value = self.kv.get(&key)?;
        Ok(SignerKeyIdRow::parse(&key, &value)?.key_id)
    }

    /// Every claim on `permanode`, date-ascending, optionally restricted
    /// to one attribute.
    pub fn append_claims(
        &self,
        permanode: &BlobRef,
        attr_filter: Option<&str>,
    ) -> Result<Vec<Claim>, IndexError> {
        let mut claims = if let Some(corpus) = self.corpus() {
            corpus
                .claims_of(permanode)
                .iter()
                .map(|c| (**c).clone())
                .collect()
        } else {
            self.kv_claims_of(permanode)?
        };

        if let Some(attr) = attr_filter {
            claims.retain(|c| c.attr == attr);
        }
        Ok(claims)
    }

    /// Materialize the values of `attr` on `permanode` at `at` (default
    /// now), per the set/add/del reduction.
    pub fn permanode_attr_values(
        &self,
        permanode: &BlobRef,
        attr: &str,
        at: Option<DateTime<Utc>>,
        signer_filter: Option<&KeyId>,
    ) -> Result<Vec<String>, IndexError> {
        let at = at.unwrap_or_else(Utc::now);

        if let Some(corpus) = self.corpus() {
            return Ok(corpus.attr_values(permanode, attr, at, signer_filter));
        }

        let claims = self.kv_claims_of(permanode)?;
        Ok(reduce_claims(claims.iter(), attr, at, signer_filter))
    }

    fn kv_claims_of(&self, permanode: &BlobRef) -> Result<Vec<Claim>, IndexError> {
        let _read = self.lock.read();

        let mut claims = Vec::new();
        for pair in self.kv.find_prefix(&ClaimRow::prefix(permanode))? {
            let (key, value) = pair?;
            match ClaimRow::parse(&key, &value) {
                Ok(claim) => claims.push(claim),
                Err(err) => warn_row(&key, &err),
            }
        }

        // The prefix interleaves signers; restore global date order.
        claims.sort_by(|a, b| (a.date, &a.blob_ref).cmp(&(b.date, &b.blob_ref)));
        Ok(claims)
    }

    /// Permanodes touched by `owner`, newest first, deleted ones skipped.
    pub fn enumerate_recent_permanodes(
        &self,
        owner: &KeyId,
        before: Option<DateTime<Utc>>,
        limit: usize,
        cancel: &Cancel,
    ) -> Result<Vec<RecentPermanode>, IndexError> {
        if let Some(corpus) = self.corpus() {
            return corpus.recent_permanodes(owner, before, limit, &self.deletes, cancel);
        }

        let _read = self.lock.read();
        let start = match before {
            Some(before) => RecpnRow::start_at(owner, before),
            None => RecpnRow::prefix(owner),
        };
        let end = blobindex_kv::prefix_end(&RecpnRow::prefix(owner))
            .map_err(IndexError::from)?;

        let mut recent = Vec::new();
        let mut seen: HashSet<BlobRef> = HashSet::new();
        for (rows, pair) in self.kv.find(&start, &end)?.enumerate() {
            check_cancel(cancel, rows)?;
            if recent.len() >= limit {
                break;
            }

            let (key, value) = pair?;
            let row = match RecpnRow::parse(&key, &value) {
                Ok(row) => row,
                Err(err) => {
                    warn_row(&key, &err);
                    continue;
                }
            };

            if seen.contains(&row.permanode) {
                continue;
            }
            // Filter before marking seen: a deleted newest claim must not
            // suppress the permanode, which the next surviving claim then
            // represents — the same fallback the corpus fast path takes.
            if self.deletes.is_deleted(&row.permanode) || self.deletes.is_deleted(&row.claim_ref) {
                continue;
            }
            seen.insert(row.permanode.clone());

            recent.push(RecentPermanode {
                permanode: row.permanode,
                key_id: row.key_id,
                last_modified: row.date,
            });
        }

        Ok(recent)
    }

    /// Newest non-deleted permanode the signer claimed `attr = value` on.
    pub fn permanode_of_signer_attr_value(
        &self,
        owner: &KeyId,
        attr: &str,
        value: &str,
    ) -> Result<Option<BlobRef>, IndexError> {
        let _read = self.lock.read();

        for pair in self
            .kv
            .find_prefix(&SignerAttrValueRow::prefix(owner, attr, value))?
        {
            let (key, row_value) = pair?;
            let row = match SignerAttrValueRow::parse(&key, &row_value) {
                Ok(row) => row,
                Err(err) => {
                    warn_row(&key, &err);
                    continue;
                }
            };

            if self.deletes.is_deleted(&row.claim_ref) || self.deletes.is_deleted(&row.permanode) {
                continue;
            }
            return Ok(Some(row.permanode));
        }

        Ok(None)
    }

    /// Inbound edges: which permanodes and directories reference `to`.
    /// Deleted parents and retracted claims are excluded; permanode
    /// parents are deduplicated.
    pub fn edges_to(&self, to: &BlobRef, cancel: &Cancel) -> Result<Vec<EdgeTo>, IndexError> {
        let _read = self.lock.read();

        let mut edges = Vec::new();
        let mut seen_permanodes: HashSet<BlobRef> = HashSet::new();
        for (rows, pair) in self
            .kv
            .find_prefix(&EdgeBackRow::prefix(to))?
            .enumerate()
        {
            check_cancel(cancel, rows)?;

            let (key, value) = pair?;
            let row = match EdgeBackRow::parse(&key, &value) {
                Ok(row) => row,
                Err(err) => {
                    warn_row(&key, &err);
                    continue;
                }
            };

            if self.deletes.is_deleted(&row.parent) || self.deletes.is_deleted(&row.blob_ref) {
                continue;
            }
            if row.parent_type == EdgeType::Permanode && !seen_permanodes.insert(row.parent.clone())
            {
                continue;
            }

            edges.push(EdgeTo {
                from: row.parent,
                from_type: row.parent_type,
                from_name: row.parent_name,
                to: to.clone(),
                blob_ref: row.blob_ref,
            });
        }

        Ok(edges)
    }

    /// Live paths (base, suffix) the signer pointed at `target`.
    pub fn paths_of_signer_target(
        &self,
        owner: &KeyId,
        target: &BlobRef,
    ) -> Result<Vec<PathClaim>, IndexError> {
        let _read = self.lock.read();

        // Newest claim per (base, suffix) wins; only active winners are
        // reported.
        let mut newest: HashMap<(BlobRef, String), PathClaim> = HashMap::new();
        for pair in self
            .kv
            .find_prefix(&SignerTargetPathRow::prefix(owner, target))?
        {
            let (key, value) = pair?;
            let row = match SignerTargetPathRow::parse(&key, &value) {
                Ok(row) => row,
                Err(err) => {
                    warn_row(&key, &err);
                    continue;
                }
            };
            if self.deletes.is_deleted(&row.claim_ref) {
                continue;
            }

            let path = PathClaim {
                claim_ref: row.claim_ref,
                claim_date: row.date,
                base: row.base.clone(),
                suffix: row.suffix.clone(),
                target: row.target.clone(),
                active: row.active,
            };
            newest
                .entry((row.base, row.suffix))
                .and_modify(|existing| {
                    if path.claim_date > existing.claim_date {
                        *existing = path.clone();
                    }
                })
                .or_insert(path);
        }

        let mut paths: Vec<PathClaim> = newest.into_values().filter(|p| p.active).collect();
        paths.sort_by(|a, b| a.claim_date.cmp(&b.claim_date));
        Ok(paths)
    }

    /// The path (base, suffix) as of `at` (default now): the newest
    /// applicable claim decides whether the path is live or retracted.
    pub fn path_lookup(
        &self,
        owner: &KeyId,
        base: &BlobRef,
        suffix: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<PathClaim>, IndexError> {
        let _read = self.lock.read();
        let at = at.unwrap_or_else(Utc::now);

        for pair in self.kv.find_prefix(&PathRow::prefix(owner, base, suffix))? {
            let (key, value) = pair?;
            let row = match PathRow::parse(&key, &value) {
                Ok(row) => row,
                Err(err) => {
                    warn_row(&key, &err);
                    continue;
                }
            };

            if row.date > at || self.deletes.is_deleted(&row.claim_ref) {
                continue;
            }

            // Rows are newest-first; the first applicable one decides.
            if !row.active {
                return Ok(None);
            }
            return Ok(Some(PathClaim {
                claim_ref: row.claim_ref,
                claim_date: row.date,
                base: row.base,
                suffix: row.suffix,
                target: row.target,
                active: true,
            }));
        }

        Ok(None)
    }

    /// Children of a directory blob, up to `limit`.
    pub fn get_dir_members(
        &self,
        dir_ref: &BlobRef,
        limit: usize,
        cancel: &Cancel,
    ) -> Result<Vec<BlobRef>, IndexError> {
        let _read = self.lock.read();

        let mut members = Vec::new();
        for (rows, pair) in self
            .kv
            .find_prefix(&DirChildRow::prefix(dir_ref))?
            .enumerate()
        {
            check_cancel(cancel, rows)?;
            if members.len() >= limit {
                break;
            }

            let (key, _) = pair?;
            match DirChildRow::parse(&key) {
                Ok(row) => members.push(row.child_ref),
                Err(err) => warn_row(&key, &err),
            }
        }

        Ok(members)
    }

    /// Size, name, MIME, wholeRef, and times of an indexed file schema.
    pub fn get_file_info(&self, file_ref: &BlobRef) -> Result<FileInfo, IndexError> {
        if let Some(corpus) = self.corpus() {
            return corpus
                .file_info(file_ref)
                .ok_or_else(|| IndexError::not_found(ErrorOrigin::Query, file_ref.to_string()));
        }

        let _read = self.lock.read();
        let key = FileInfoRow::key(file_ref);
        let value = self.kv.get(&key)?;
        let row = FileInfoRow::parse(&key, &value)?;

        let times_key = FileTimesRow::key(file_ref);
        let times = match self.kv.get(&times_key) {
            Ok(value) => FileTimesRow::parse(&times_key, &value)?.times,
            Err(err) if err.is_not_found() => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(FileInfo {
            size: row.size,
            file_name: row.file_name,
            mime_type: row.mime,
            whole_ref: row.whole_ref,
            creation_time: times.first().copied(),
            mod_time: times.last().copied(),
        })
    }

    /// Recorded times of an indexed file, oldest first.
    pub fn get_file_times(&self, file_ref: &BlobRef) -> Result<Vec<DateTime<Utc>>, IndexError> {
        if let Some(corpus) = self.corpus() {
            return Ok(corpus.file_times(file_ref));
        }

        let _read = self.lock.read();
        let key = FileTimesRow::key(file_ref);
        match self.kv.get(&key) {
            Ok(value) => Ok(FileTimesRow::parse(&key, &value)?.times),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Pixel dimensions of an indexed image file.
    pub fn get_image_info(&self, file_ref: &BlobRef) -> Result<ImageInfo, IndexError> {
        if let Some(corpus) = self.corpus() {
            return corpus
                .image_info(file_ref)
                .ok_or_else(|| IndexError::not_found(ErrorOrigin::Query, file_ref.to_string()));
        }

        let _read = self.lock.read();
        let key = ImageSizeRow::key(file_ref);
        let value = self.kv.get(&key)?;
        let row = ImageSizeRow::parse(&key, &value)?;

        Ok(ImageInfo {
            width: row.width,
            height: row.height,
        })
    }

    /// File schemas whose concatenated content hashes to `whole_ref`.
    pub fn existing_file_schemas(&self, whole_ref: &BlobRef) -> Result<Vec<BlobRef>, IndexError> {
        let _read = self.lock.read();

        let mut files = Vec::new();
        for pair in self.kv.find_prefix(&WholeToFileRow::prefix(whole_ref))? {
            let (key, _) = pair?;
            match WholeToFileRow::parse(&key) {
                Ok(row) => files.push(row.file_ref),
                Err(err) => warn_row(&key, &err),
            }
        }

        Ok(files)
    }

    /// Audio tags recorded for a whole-file hash.
    pub fn get_media_tags(
        &self,
        whole_ref: &BlobRef,
    ) -> Result<BTreeMap<String, String>, IndexError> {
        if let Some(corpus) = self.corpus() {
            return Ok(corpus.media_tags(whole_ref).unwrap_or_default());
        }

        let _read = self.lock.read();
        let mut tags = BTreeMap::new();
        for pair in self.kv.find_prefix(&MediaTagRow::prefix(whole_ref))? {
            let (key, value) = pair?;
            match MediaTagRow::parse(&key, &value) {
                Ok(row) => {
                    tags.insert(row.tag, row.value);
                }
                Err(err) => warn_row(&key, &err),
            }
        }

        Ok(tags)
    }
}
