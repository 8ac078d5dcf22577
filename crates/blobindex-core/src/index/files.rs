//! Module: index::files
//! Responsibility: file, bytes, and directory schema rows — whole-file
//! hashing over the chunk tree, MIME/time extraction, and media rows.
//! Does not own: media decoding (injected contract) or chunk storage.

use crate::{
    blobref::{BlobRef, HashAlg},
    contracts::{Fetcher, ImageMeta, MAX_IMAGE_SNIFF_BYTES, MEDIA_TAG_NAMES, MediaSniffer},
    error::{ErrorClass, ErrorOrigin, IndexError},
    keys::{
        DirChildRow, EdgeBackRow, ExifGpsRow, ExifTagRow, FileInfoRow, FileTimesRow, ImageSizeRow,
        MediaTagRow, WholeToFileRow,
    },
    model::{CamliType, EdgeType},
    schema::{SniffedBlob, Superset, sniff_mime},
};
use blobindex_kv::Batch;
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha224, Sha256};

/// Chunk trees deeper than this are treated as corrupt rather than walked.
const MAX_PART_DEPTH: usize = 32;

fn bad_file(message: impl Into<String>) -> IndexError {
    IndexError::new(ErrorClass::Corruption, ErrorOrigin::File, message)
}

enum WholeHasher {
    Sha224(Sha224),
    Sha256(Sha256),
}

impl WholeHasher {
    fn new(alg: HashAlg) -> Self {
        match alg {
            HashAlg::Sha224 => Self::Sha224(Sha224::new()),
            HashAlg::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha224(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finish(self, alg: HashAlg) -> BlobRef {
        let digest = match self {
            Self::Sha224(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
        };
        BlobRef::from_digest(alg, digest).expect("digest width matches algorithm")
    }
}

/// Bytes of leading content needed to rule audio in or out (the widest
/// magic window is the 12-byte RIFF check).
const AUDIO_DECIDE_BYTES: usize = 12;

/// Streaming walk over a file's chunk tree.
///
/// Missing chunks are collected, not short-circuited, so one pass reports
/// every unmet dependency; the mutation set is discarded in that case
/// anyway.
///
/// Only audio tag extraction ever reads past the sniff prefix, so the full
/// byte stream is retained only while the file still looks like audio;
/// everything else stays bounded by `MAX_IMAGE_SNIFF_BYTES`.
struct WholeBuild<'a> {
    fetcher: &'a dyn Fetcher,
    file_name: &'a str,
    hasher: WholeHasher,
    size: u64,
    prefix: Vec<u8>,
    /// `Some` while the stream is still an audio candidate.
    full: Option<Vec<u8>>,
    audio_decided: bool,
    missing: Vec<BlobRef>,
}

impl<'a> WholeBuild<'a> {
    fn new(alg: HashAlg, fetcher: &'a dyn Fetcher, file_name: &'a str) -> Self {
        Self {
            fetcher,
            file_name,
            hasher: WholeHasher::new(alg),
            size: 0,
            prefix: Vec::new(),
            full: Some(Vec::new()),
            audio_decided: false,
            missing: Vec::new(),
        }
    }

    fn walk(&mut self, parts: &[crate::schema::BytesPart], depth: usize) -> Result<(), IndexError> {
        if depth > MAX_PART_DEPTH {
            return Err(bad_file("chunk tree exceeds maximum depth"));
        }

        for part in parts {
            if let Some(chunk) = part.chunk_ref() {
                match self.fetcher.fetch_bytes(&chunk) {
                    Ok(bytes) => self.consume(&bytes),
                    Err(err) if err.is_not_found() => self.missing.push(chunk),
                    Err(err) => return Err(err.into()),
                }
            } else if let Some(nested) = part.nested_ref() {
                match self.fetcher.fetch_bytes(&nested) {
                    Ok(bytes) => {
                        let superset = Superset::decode(&bytes).map_err(|_| {
                            bad_file(format!("nested part {nested} is not a schema blob"))
                        })?;
                        if superset.recognized_type() != Some(CamliType::Bytes) {
                            return Err(bad_file(format!(
                                "nested part {nested} is not a bytes schema"
                            )));
                        }
                        self.walk(&superset.parts, depth + 1)?;
                    }
                    Err(err) if err.is_not_found() => self.missing.push(nested),
                    Err(err) => return Err(err.into()),
                }
            } else {
                return Err(bad_file("part has neither blobRef nor bytesRef"));
            }
        }

        Ok(())
    }

    fn consume(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
        self.size += bytes.len() as u64;

        let room = MAX_IMAGE_SNIFF_BYTES.saturating_sub(self.prefix.len());
        if room > 0 {
            self.prefix.extend_from_slice(&bytes[..bytes.len().min(room)]);
        }

        // Once enough leading bytes exist to judge, drop the full buffer
        // for everything that is not audio. Streams that end before the
        // window stay retained, but they are tiny by definition.
        if !self.audio_decided && self.prefix.len() >= AUDIO_DECIDE_BYTES {
            self.audio_decided = true;
            let audio = sniff_mime(&self.prefix, Some(self.file_name))
                .is_some_and(|mime| mime.starts_with("audio/"));
            if !audio {
                self.full = None;
            }
        }

        if let Some(full) = &mut self.full {
            full.extend_from_slice(bytes);
        }
    }
}

/// Emit the rows for a file schema blob.
pub(in crate::index) fn file_mutations(
    sniffed: &SniffedBlob,
    fetcher: &dyn Fetcher,
    media: &dyn MediaSniffer,
    debug_images: bool,
    batch: &mut Batch,
) -> Result<(), IndexError> {
    let superset = sniffed
        .schema
        .as_ref()
        .ok_or_else(|| bad_file("file dispatch on non-schema blob"))?;
    let file_ref = &sniffed.blob_ref;

    let file_name = superset.file_name.as_str();
    let mut build = WholeBuild::new(file_ref.algorithm(), fetcher, file_name);
    build.walk(&superset.parts, 0)?;

    if !build.missing.is_empty() {
        return Err(IndexError::missing_dependency(
            ErrorOrigin::File,
            build.missing,
        ));
    }

    let mime = sniff_mime(&build.prefix, Some(file_name))
        .map(str::to_string)
        .unwrap_or_default();

    let WholeBuild {
        hasher,
        size,
        prefix,
        full,
        ..
    } = build;
    let whole_ref = hasher.finish(file_ref.algorithm());

    batch.set(WholeToFileRow::key(&whole_ref, file_ref), "1");
    batch.set(
        FileInfoRow::key(file_ref),
        FileInfoRow::value(size, file_name, &mime, Some(&whole_ref)),
    );

    let mut image_meta: Option<ImageMeta> = None;
    if mime.starts_with("image/") {
        image_meta = media.image_meta(&prefix);
        if let Some(meta) = &image_meta {
            emit_image_rows(&whole_ref, file_ref, meta, debug_images, batch);
        } else if debug_images {
            tracing::info!(target: "index_ingest", %file_ref, %mime, "image did not decode");
        }
    }

    let exif_time = image_meta.as_ref().and_then(|m| m.datetime);
    batch.set(
        FileTimesRow::key(file_ref),
        FileTimesRow::value(&file_times(superset.explicit_mod_time(), exif_time)),
    );

    // Tag frames can trail the stream, so audio reads the retained full
    // bytes. An audio verdict here implies the decision pass kept them;
    // the prefix stands in otherwise.
    if mime.starts_with("audio/")
        && let Some(tags) = media.audio_tags(full.as_deref().unwrap_or(&prefix))
    {
        for name in MEDIA_TAG_NAMES {
            if let Some(value) = tags.get(name) {
                batch.set(
                    MediaTagRow::key(&whole_ref, name),
                    MediaTagRow::value(value),
                );
            }
        }
    }

    Ok(())
}

fn emit_image_rows(
    whole_ref: &BlobRef,
    file_ref: &BlobRef,
    meta: &ImageMeta,
    debug_images: bool,
    batch: &mut Batch,
) {
    if let Some(size) = meta.size {
        batch.set(
            ImageSizeRow::key(file_ref),
            ImageSizeRow::value(size.width, size.height),
        );
    }

    if let Some((lat, long)) = meta.gps {
        if lat.is_nan() || long.is_nan() || lat.abs() > 90.0 || long.abs() > 180.0 {
            // Out-of-range coordinates are skipped, never clamped.
            if debug_images {
                tracing::info!(target: "index_ingest", %file_ref, lat, long, "rejecting out-of-range EXIF GPS");
            }
        } else {
            batch.set(
                ExifGpsRow::key(whole_ref),
                ExifGpsRow::value(lat, long),
            );
        }
    }

    for tag in &meta.tags {
        batch.set(
            ExifTagRow::key(whole_ref, tag.tag),
            ExifTagRow::value(tag.format, tag.count, &tag.values),
        );
    }
}

/// Usable times for a file, oldest first, at most two entries. The MSDOS
/// epoch (1980-01-01) is a placeholder many cameras write; it is dropped
/// whenever a better time exists.
fn file_times(
    explicit: Option<DateTime<Utc>>,
    exif: Option<DateTime<Utc>>,
) -> Vec<DateTime<Utc>> {
    let msdos_epoch = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();

    let mut times: Vec<DateTime<Utc>> = [explicit, exif].into_iter().flatten().collect();
    if times.len() > 1 {
        times.retain(|t| *t != msdos_epoch);
    }
    times.sort();
    times.dedup();
    times
}

/// Emit the rows for a directory schema blob: the member list lives in a
/// separate static-set blob, which is a dependency of the directory.
pub(in crate::index) fn dir_mutations(
    sniffed: &SniffedBlob,
    fetcher: &dyn Fetcher,
    batch: &mut Batch,
) -> Result<(), IndexError> {
    let superset = sniffed
        .schema
        .as_ref()
        .ok_or_else(|| bad_file("directory dispatch on non-schema blob"))?;
    let dir_ref = &sniffed.blob_ref;

    let entries = superset
        .entries_ref()
        .ok_or_else(|| bad_file(format!("directory {dir_ref} has no entries ref")))?;

    let set_bytes = match fetcher.fetch_bytes(&entries) {
        Ok(bytes) => bytes,
        Err(err) if err.is_not_found() => {
            return Err(IndexError::missing_dependency(
                ErrorOrigin::File,
                vec![entries],
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let set = Superset::decode(&set_bytes)
        .map_err(|_| bad_file(format!("entries blob {entries} is not a schema blob")))?;
    if set.recognized_type() != Some(CamliType::StaticSet) {
        return Err(bad_file(format!("entries blob {entries} is not a static-set")));
    }

    let members = set.member_refs();
    batch.set(
        FileInfoRow::key(dir_ref),
        FileInfoRow::value(
            members.len() as u64,
            &superset.file_name,
            "application/json; camliType=directory",
            None,
        ),
    );

    for member in &members {
        batch.set(DirChildRow::key(dir_ref, member), "1");
        batch.set(
            EdgeBackRow::key(member, dir_ref, dir_ref),
            EdgeBackRow::value(EdgeType::Directory, &superset.file_name),
        );
    }

    Ok(())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msdos_epoch_dropped_when_better_time_exists() {
        let msdos = Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).unwrap();
        let real = Utc.with_ymd_and_hms(2012, 6, 1, 10, 0, 0).unwrap();

        assert_eq!(file_times(Some(msdos), Some(real)), vec![real]);
        assert_eq!(file_times(Some(msdos), None), vec![msdos]);
        assert_eq!(file_times(None, None), Vec::<DateTime<Utc>>::new());
    }

    #[test]
    fn file_times_oldest_first() {
        let older = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(file_times(Some(newer), Some(older)), vec![older, newer]);
        assert_eq!(file_times(Some(newer), Some(newer)), vec![newer]);
    }

    #[test]
    fn full_bytes_dropped_for_non_audio_streams() {
        let source = crate::test_support::MemorySource::new();
        let mut build = WholeBuild::new(HashAlg::Sha224, &source, "big.bin");

        build.consume(&[0u8; 64]);
        assert!(build.full.is_none());

        build.consume(&[0u8; 64]);
        assert_eq!(build.size, 128);
        assert!(build.full.is_none());
    }

    #[test]
    fn full_bytes_retained_for_audio_streams() {
        let source = crate::test_support::MemorySource::new();

        let mut by_magic = WholeBuild::new(HashAlg::Sha224, &source, "unnamed");
        by_magic.consume(b"ID3\x04\x00\x00\x00\x00\x00\x00rest of the frame");
        assert!(by_magic.full.is_some());

        let mut by_extension = WholeBuild::new(HashAlg::Sha224, &source, "track.mp3");
        by_extension.consume(&[0u8; 64]);
        assert_eq!(by_extension.full.as_ref().map(Vec::len), Some(64));
    }
}
