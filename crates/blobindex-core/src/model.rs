//! Domain model: blob metadata, claims, file info, edges, paths, and the
//! claim-reduction semantics that materialize permanode attributes.

use crate::blobref::{BlobRef, KeyId};
use chrono::{DateTime, Utc};
use std::fmt::{self, Display};
use thiserror::Error as ThisError;

///
/// CamliType
///
/// Recognized schema blob types. Anything else is treated as opaque bytes.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CamliType {
    Permanode,
    Claim,
    File,
    Bytes,
    StaticSet,
    Directory,
}

impl CamliType {
    pub const ALL: [Self; 6] = [
        Self::Permanode,
        Self::Claim,
        Self::File,
        Self::Bytes,
        Self::StaticSet,
        Self::Directory,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanode => "permanode",
            Self::Claim => "claim",
            Self::File => "file",
            Self::Bytes => "bytes",
            Self::StaticSet => "static-set",
            Self::Directory => "directory",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// MIME recorded in the `meta` row for a schema blob of this type.
    #[must_use]
    pub fn meta_mime(self) -> String {
        format!("application/json; camliType={}", self.as_str())
    }

    /// Inverse of [`Self::meta_mime`], for row parsers.
    #[must_use]
    pub fn from_meta_mime(mime: &str) -> Option<Self> {
        let rest = mime.strip_prefix("application/json; camliType=")?;
        Self::from_str_opt(rest)
    }
}

impl Display for CamliType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// BlobMeta
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlobMeta {
    pub blob_ref: BlobRef,
    pub size: u64,
    /// `None` for opaque bytes.
    pub camli_type: Option<CamliType>,
}

///
/// ClaimType
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClaimType {
    SetAttribute,
    AddAttribute,
    DelAttribute,
    Delete,
}

#[derive(Debug, ThisError)]
#[error("unknown claim type '{0}'")]
pub struct ClaimTypeParseError(pub String);

impl ClaimType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetAttribute => "set-attribute",
            Self::AddAttribute => "add-attribute",
            Self::DelAttribute => "del-attribute",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ClaimTypeParseError> {
        match s {
            "set-attribute" => Ok(Self::SetAttribute),
            "add-attribute" => Ok(Self::AddAttribute),
            "del-attribute" => Ok(Self::DelAttribute),
            "delete" => Ok(Self::Delete),
            other => Err(ClaimTypeParseError(other.to_string())),
        }
    }
}

impl Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// Claim
///
/// A verified, signed mutation. Attribute and value are stored unescaped;
/// escaping happens only at the key-schema boundary.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Claim {
    pub blob_ref: BlobRef,
    pub signer: BlobRef,
    pub key_id: KeyId,
    pub permanode: BlobRef,
    pub date: DateTime<Utc>,
    pub claim_type: ClaimType,
    pub attr: String,
    pub value: String,
    /// Deletion target; set only for `ClaimType::Delete`.
    pub target: Option<BlobRef>,
}

///
/// FileInfo
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfo {
    pub size: u64,
    pub file_name: String,
    pub mime_type: String,
    /// Hash of the concatenated data chunks; distinct from the file schema's
    /// own ref. Absent for directories.
    pub whole_ref: Option<BlobRef>,
    pub creation_time: Option<DateTime<Utc>>,
    pub mod_time: Option<DateTime<Utc>>,
}

///
/// ImageInfo
///
/// Pixel dimensions after any EXIF rotation is resolved.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, derive_more::Display)]
#[display("{width}x{height}")]
pub struct ImageInfo {
    pub width: u16,
    pub height: u16,
}

///
/// EdgeType
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeType {
    Permanode,
    Directory,
}

impl EdgeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanode => "permanode",
            Self::Directory => "directory",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "permanode" => Some(Self::Permanode),
            "directory" => Some(Self::Directory),
            _ => None,
        }
    }
}

///
/// EdgeTo
///
/// One inbound reference: `from` (a permanode or directory) points at `to`
/// through `blob_ref` (the claim blob or the directory schema blob).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeTo {
    pub from: BlobRef,
    pub from_type: EdgeType,
    pub from_name: String,
    pub to: BlobRef,
    pub blob_ref: BlobRef,
}

///
/// PathClaim
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathClaim {
    pub claim_ref: BlobRef,
    pub claim_date: DateTime<Utc>,
    pub base: BlobRef,
    pub suffix: String,
    pub target: BlobRef,
    /// `true` while the path is live; a delete claim retracts it.
    pub active: bool,
}

///
/// RecentPermanode
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecentPermanode {
    pub permanode: BlobRef,
    pub key_id: KeyId,
    pub last_modified: DateTime<Utc>,
}

///
/// DeletionRecord
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeletionRecord {
    pub deleter: BlobRef,
    pub when: DateTime<Utc>,
}

/// Materialize the values of `attr` on a permanode at instant `at`.
///
/// `claims` must be in nondecreasing date order. The reduction:
/// set-attribute replaces the list, add-attribute appends, del-attribute
/// with an empty value clears, del-attribute with a value removes every
/// matching occurrence (stable). Both the on-disk walk and the corpus fast
/// path call this one function so their answers cannot diverge.
pub fn reduce_claims<'a>(
    claims: impl IntoIterator<Item = &'a Claim>,
    attr: &str,
    at: DateTime<Utc>,
    signer_filter: Option<&KeyId>,
) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();

    for claim in claims {
        if claim.date > at {
            break;
        }
        if claim.attr != attr {
            continue;
        }
        if let Some(filter) = signer_filter
            && claim.key_id != *filter
        {
            continue;
        }

        match claim.claim_type {
            ClaimType::SetAttribute => {
                values.clear();
                values.push(claim.value.clone());
            }
            ClaimType::AddAttribute => values.push(claim.value.clone()),
            ClaimType::DelAttribute if claim.value.is_empty() => values.clear(),
            ClaimType::DelAttribute => values.retain(|v| *v != claim.value),
            ClaimType::Delete => {}
        }
    }

    values
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn claim(n: i64, claim_type: ClaimType, attr: &str, value: &str) -> Claim {
        let date = Utc.timestamp_opt(1_300_000_000 + n, 0).unwrap();
        Claim {
            blob_ref: BlobRef::from_sha224(format!("claim-{n}").as_bytes()),
            signer: BlobRef::from_sha224(b"signer"),
            key_id: KeyId::parse("2931A67C26F5ABDA").unwrap(),
            permanode: BlobRef::from_sha224(b"permanode"),
            date,
            claim_type,
            attr: attr.to_string(),
            value: value.to_string(),
            target: None,
        }
    }

    fn at(n: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_300_000_000 + n, 0).unwrap()
    }

    #[test]
    fn tag_editing_sequence() {
        let claims = vec![
            claim(0, ClaimType::SetAttribute, "tag", "foov"),
            claim(1, ClaimType::AddAttribute, "tag", "a"),
            claim(2, ClaimType::AddAttribute, "tag", "b"),
            claim(3, ClaimType::DelAttribute, "tag", ""),
            claim(4, ClaimType::AddAttribute, "tag", "c"),
            claim(5, ClaimType::AddAttribute, "tag", "d"),
            claim(6, ClaimType::AddAttribute, "tag", "e"),
            claim(7, ClaimType::DelAttribute, "tag", "d"),
        ];

        assert_eq!(reduce_claims(&claims, "tag", at(100), None), ["c", "e"]);
        // Mid-history: everything through the second add applies.
        assert_eq!(reduce_claims(&claims, "tag", at(2), None), ["foov", "a", "b"]);
    }

    #[test]
    fn attributes_reduce_independently() {
        let claims = vec![
            claim(0, ClaimType::SetAttribute, "title", "foov"),
            claim(1, ClaimType::AddAttribute, "tag", "a"),
            claim(2, ClaimType::AddAttribute, "tag", "b"),
        ];

        assert_eq!(reduce_claims(&claims, "tag", at(2), None), ["a", "b"]);
        assert_eq!(reduce_claims(&claims, "title", at(2), None), ["foov"]);
    }

    #[test]
    fn set_after_add_replaces() {
        let claims = vec![
            claim(0, ClaimType::AddAttribute, "x", "a"),
            claim(1, ClaimType::AddAttribute, "x", "b"),
            claim(2, ClaimType::SetAttribute, "x", "setv"),
        ];

        assert_eq!(reduce_claims(&claims, "x", at(100), None), ["setv"]);
    }

    #[test]
    fn del_with_value_removes_all_occurrences() {
        let claims = vec![
            claim(0, ClaimType::AddAttribute, "x", "dup"),
            claim(1, ClaimType::AddAttribute, "x", "keep"),
            claim(2, ClaimType::AddAttribute, "x", "dup"),
            claim(3, ClaimType::DelAttribute, "x", "dup"),
        ];

        assert_eq!(reduce_claims(&claims, "x", at(100), None), ["keep"]);
    }

    #[test]
    fn signer_filter_skips_other_signers() {
        let mut other = claim(1, ClaimType::SetAttribute, "x", "theirs");
        other.key_id = KeyId::parse("AAAA1111BBBB2222").unwrap();

        let mine = claim(0, ClaimType::SetAttribute, "x", "mine");
        let filter = mine.key_id.clone();
        let claims = vec![mine, other];

        assert_eq!(
            reduce_claims(&claims, "x", at(100), Some(&filter)),
            ["mine"]
        );
        assert_eq!(reduce_claims(&claims, "x", at(100), None), ["theirs"]);
    }

    #[test]
    fn camli_type_meta_mime_round_trip() {
        for t in CamliType::ALL {
            assert_eq!(CamliType::from_meta_mime(&t.meta_mime()), Some(t));
        }
        assert_eq!(CamliType::from_meta_mime("image/jpeg"), None);
    }
}
