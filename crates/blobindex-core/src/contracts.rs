//! Module: contracts
//! Responsibility: the traits the core consumes but does not implement —
//! blob fetch, signature verification, media extraction — plus cooperative
//! cancellation. Implementations live outside the core; injected objects
//! must not affect indexing semantics beyond their declared contract.

use crate::{
    blobref::{BlobRef, KeyId},
    error::{ErrorClass, ErrorOrigin, IndexError},
    model::ImageInfo,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error as ThisError;

/// Enumerations poll their cancel token once per this many rows.
pub const CANCEL_CHECK_ROWS: usize = 256;

/// How much of an image file the dimension/EXIF extractors may consume.
pub const MAX_IMAGE_SNIFF_BYTES: usize = 512 << 10;

/// Audio properties recorded as `mediatag` rows.
pub const MEDIA_TAG_NAMES: [&str; 10] = [
    "title",
    "artist",
    "album",
    "genre",
    "year",
    "track",
    "disc",
    "musicbrainzalbumid",
    "mediaref",
    "durationms",
];

///
/// Cancel
///
/// Cooperative cancellation handle. Cheap to clone; enumerations check it
/// every [`CANCEL_CHECK_ROWS`] rows to bound cancellation latency without
/// per-row overhead.
///

#[derive(Clone, Debug, Default)]
pub struct Cancel {
    flag: Arc<AtomicBool>,
}

impl Cancel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

///
/// FetchError
///
/// `NotFound` feeds missing-dependency handling; transport errors propagate
/// unchanged and never record dependency rows.
///

#[derive(Debug, ThisError)]
pub enum FetchError {
    #[error("blob not found")]
    NotFound,

    #[error("transport failure: {0}")]
    Transport(String),
}

impl FetchError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<FetchError> for IndexError {
    fn from(err: FetchError) -> Self {
        let class = match err {
            FetchError::NotFound => ErrorClass::NotFound,
            FetchError::Transport(_) => ErrorClass::Transient,
        };
        Self::new(class, ErrorOrigin::Fetch, err.to_string())
    }
}

///
/// Fetcher
///

pub trait Fetcher: Send + Sync {
    /// Open `blob_ref` for reading, returning the reader and the blob size.
    fn fetch(&self, blob_ref: &BlobRef) -> Result<(Box<dyn Read + Send>, u64), FetchError>;

    /// Fetch and buffer the whole blob.
    fn fetch_bytes(&self, blob_ref: &BlobRef) -> Result<Vec<u8>, FetchError> {
        let (mut reader, size) = self.fetch(blob_ref)?;
        let mut buf = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        reader
            .read_to_end(&mut buf)
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(buf)
    }
}

///
/// BlobSource
///
/// A fetcher that can also enumerate every blob it holds, in canonical ref
/// order. Full reindex streams the enumeration back through ingest.
///

pub trait BlobSource: Fetcher {
    /// Call `f` for each ref at or after `start` (all refs when `None`),
    /// in ascending canonical order, until `f` returns `false`.
    fn enumerate(
        &self,
        start: Option<&BlobRef>,
        f: &mut dyn FnMut(&BlobRef) -> bool,
    ) -> Result<(), FetchError>;
}

///
/// VerifyError
///
/// A missing signer public key is recoverable (the claim parks in the
/// dependency tracker); an actual signature failure is fatal for the blob.
///

#[derive(Debug, ThisError)]
pub enum VerifyError {
    #[error("signer public key blob {0} not available")]
    MissingKeyBlob(BlobRef),

    #[error("signature verification failed: {0}")]
    BadSignature(String),

    #[error("transport failure during verification: {0}")]
    Transport(String),
}

impl From<VerifyError> for IndexError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::MissingKeyBlob(r) => {
                Self::missing_dependency(ErrorOrigin::Verify, vec![r])
            }
            VerifyError::BadSignature(msg) => {
                Self::new(ErrorClass::BadSignature, ErrorOrigin::Verify, msg)
            }
            VerifyError::Transport(msg) => {
                Self::new(ErrorClass::Transient, ErrorOrigin::Verify, msg)
            }
        }
    }
}

///
/// VerifiedSignature
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerifiedSignature {
    pub key_id: KeyId,
    pub signer: BlobRef,
}

///
/// SignatureVerifier
///
/// Trusted oracle over canonically signed JSON. Must translate a NotFound
/// from `signer_blobs` into `MissingKeyBlob`, distinguishable from a bad
/// signature.
///

pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        schema_json: &[u8],
        signer_blobs: &dyn Fetcher,
    ) -> Result<VerifiedSignature, VerifyError>;
}

///
/// ExifTagValue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExifTagValue {
    pub tag: u16,
    pub format: u16,
    pub count: u32,
    pub values: String,
}

///
/// ImageMeta
///
/// Everything the image extractors recover from a bounded file prefix.
/// Dimensions are post-rotation; GPS is raw and range-checked by ingest.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageMeta {
    pub size: Option<ImageInfo>,
    pub gps: Option<(f64, f64)>,
    pub tags: Vec<ExifTagValue>,
    pub datetime: Option<DateTime<Utc>>,
}

///
/// MediaSniffer
///
/// Pure functions over bytes. The core never decodes media itself.
///

pub trait MediaSniffer: Send + Sync {
    /// Extract image metadata from at most [`MAX_IMAGE_SNIFF_BYTES`] of the
    /// file. `None` when the bytes are not a decodable image.
    fn image_meta(&self, prefix: &[u8]) -> Option<ImageMeta>;

    /// Extract audio tags. Only names from [`MEDIA_TAG_NAMES`] are indexed;
    /// extra entries are ignored.
    fn audio_tags(&self, data: &[u8]) -> Option<BTreeMap<String, String>>;
}

///
/// NoopMedia
///

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMedia;

impl MediaSniffer for NoopMedia {
    fn image_meta(&self, _prefix: &[u8]) -> Option<ImageMeta> {
        None
    }

    fn audio_tags(&self, _data: &[u8]) -> Option<BTreeMap<String, String>> {
        None
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_sticky_and_shared() {
        let cancel = Cancel::new();
        let observer = cancel.clone();
        assert!(!observer.is_canceled());

        cancel.cancel();
        assert!(observer.is_canceled());
    }

    #[test]
    fn verify_errors_map_to_classes() {
        let signer = BlobRef::from_sha224(b"signer");

        let missing: IndexError = VerifyError::MissingKeyBlob(signer.clone()).into();
        assert!(missing.is_missing_dependency());
        assert_eq!(missing.missing_refs(), &[signer]);

        let bad: IndexError = VerifyError::BadSignature("nope".to_string()).into();
        assert_eq!(bad.class, ErrorClass::BadSignature);
    }

    #[test]
    fn fetch_not_found_is_not_found_class() {
        let err: IndexError = FetchError::NotFound.into();
        assert!(err.is_not_found());

        let err: IndexError = FetchError::Transport("socket".to_string()).into();
        assert_eq!(err.class, ErrorClass::Transient);
    }
}
