//! Module: schema::sniffer
//! Responsibility: classify an incoming blob (schema JSON vs opaque bytes),
//! verify its digest, and record size and MIME.
//! Does not own: per-type schema validation or row emission.

use crate::{
    blobref::BlobRef,
    error::{ErrorClass, ErrorOrigin, IndexError},
    schema::superset::Superset,
};

/// Schema blobs and MIME sniffing only consider a bounded prefix; anything
/// larger than this cannot be a schema blob.
pub const MAX_SCHEMA_BLOB_BYTES: usize = 1 << 20;

///
/// SniffedBlob
///

#[derive(Debug)]
pub struct SniffedBlob {
    pub blob_ref: BlobRef,
    pub size: u64,
    /// Sniffed MIME of opaque bytes; `None` when nothing matched. Schema
    /// blobs report their `application/json; camliType=...` MIME via
    /// [`SniffedBlob::meta_mime`] instead.
    pub mime: Option<String>,
    pub schema: Option<Superset>,
    pub bytes: Vec<u8>,
}

impl SniffedBlob {
    /// The MIME string recorded in the blob's `meta` row.
    #[must_use]
    pub fn meta_mime(&self) -> String {
        if let Some(t) = self.schema.as_ref().and_then(Superset::recognized_type) {
            return t.meta_mime();
        }
        self.mime.clone().unwrap_or_default()
    }
}

/// Classify `bytes` as `blob_ref`'s content.
///
/// The ref is recomputed over the bytes first; a mismatch means the store
/// handed us corrupt content and nothing downstream may run.
pub fn sniff_blob(blob_ref: &BlobRef, bytes: Vec<u8>) -> Result<SniffedBlob, IndexError> {
    if !blob_ref.matches(&bytes) {
        return Err(IndexError::new(
            ErrorClass::Corruption,
            ErrorOrigin::Sniffer,
            format!("content does not hash to {blob_ref}"),
        ));
    }

    let schema = if bytes.len() <= MAX_SCHEMA_BLOB_BYTES {
        Superset::decode(&bytes).ok()
    } else {
        None
    };

    let mime = if schema.is_some() {
        None
    } else {
        sniff_mime(&bytes, None).map(str::to_string)
    };

    Ok(SniffedBlob {
        blob_ref: blob_ref.clone(),
        size: bytes.len() as u64,
        mime,
        schema,
        bytes,
    })
}

/// MIME by magic signature, falling back to the extension of `file_name`.
#[must_use]
pub fn sniff_mime(data: &[u8], file_name: Option<&str>) -> Option<&'static str> {
    if let Some(mime) = mime_by_signature(data) {
        return Some(mime);
    }
    file_name.and_then(mime_by_extension)
}

fn mime_by_signature(data: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"II*\x00", "image/tiff"),
        (b"MM\x00*", "image/tiff"),
        (b"%PDF", "application/pdf"),
        (b"ID3", "audio/mpeg"),
        (b"\xff\xfb", "audio/mpeg"),
        (b"fLaC", "audio/flac"),
        (b"OggS", "audio/ogg"),
    ];

    for (magic, mime) in SIGNATURES {
        if data.starts_with(magic) {
            return Some(mime);
        }
    }

    // RIFF containers need the format tag at offset 8.
    if data.len() >= 12 && &data[..4] == b"RIFF" {
        match &data[8..12] {
            b"WEBP" => return Some("image/webp"),
            b"WAVE" => return Some("audio/wav"),
            _ => {}
        }
    }

    let head = &data[..data.len().min(256)];
    let lowered = head.to_ascii_lowercase();
    if lowered.starts_with(b"<!doctype html") || lowered.starts_with(b"<html") {
        return Some("text/html");
    }

    None
}

fn mime_by_extension(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        _ => return None,
    };
    Some(mime)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CamliType;

    #[test]
    fn rejects_digest_mismatch() {
        let wrong = BlobRef::from_sha224(b"other content");
        let err = sniff_blob(&wrong, b"real content".to_vec()).unwrap_err();
        assert_eq!(err.class, crate::error::ErrorClass::Corruption);
    }

    #[test]
    fn classifies_schema_blob() {
        let json = br#"{"camliVersion": 1, "camliType": "permanode", "random": "r"}"#.to_vec();
        let r = BlobRef::from_sha224(&json);

        let sniffed = sniff_blob(&r, json).unwrap();
        assert_eq!(
            sniffed.schema.as_ref().and_then(Superset::recognized_type),
            Some(CamliType::Permanode)
        );
        assert_eq!(sniffed.meta_mime(), "application/json; camliType=permanode");
    }

    #[test]
    fn classifies_opaque_bytes_with_magic() {
        let jpeg = b"\xff\xd8\xff\xe0rest-of-jpeg".to_vec();
        let r = BlobRef::from_sha224(&jpeg);

        let sniffed = sniff_blob(&r, jpeg).unwrap();
        assert!(sniffed.schema.is_none());
        assert_eq!(sniffed.meta_mime(), "image/jpeg");
    }

    #[test]
    fn plain_bytes_have_empty_mime() {
        let data = b"not json, not magic".to_vec();
        let r = BlobRef::from_sha224(&data);

        let sniffed = sniff_blob(&r, data).unwrap();
        assert_eq!(sniffed.meta_mime(), "");
        assert_eq!(sniffed.size, 19);
    }

    #[test]
    fn extension_fallback() {
        assert_eq!(sniff_mime(b"plain", Some("foo.html")), Some("text/html"));
        assert_eq!(sniff_mime(b"plain", Some("foo.xyz")), None);
        assert_eq!(sniff_mime(b"\xff\xd8\xffX", Some("foo.html")), Some("image/jpeg"));
    }
}
