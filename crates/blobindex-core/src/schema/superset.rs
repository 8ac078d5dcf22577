//! Permissive decoding of schema-blob JSON.
//!
//! A schema blob is any JSON object with a recognized `camliType`. The
//! superset carries every field any schema type can use; unknown fields are
//! ignored and missing fields default, so decoding never rejects a blob
//! merely for being from a newer writer. Per-type validation happens at the
//! ingest boundary, not here.

use crate::{
    blobref::BlobRef,
    keys::parse_rfc3339,
    model::{CamliType, ClaimType},
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error as ThisError;

///
/// SchemaDecodeError
///

#[derive(Debug, ThisError)]
pub enum SchemaDecodeError {
    #[error("not a JSON object")]
    NotJson,

    #[error("no recognized camliType")]
    NoCamliType,
}

///
/// BytesPart
///
/// One chunk of a file or bytes schema: exactly one of `blob_ref` (raw
/// bytes) or `bytes_ref` (nested bytes schema) is set.
///

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BytesPart {
    #[serde(default)]
    pub blob_ref: String,

    #[serde(default)]
    pub bytes_ref: String,

    #[serde(default)]
    pub size: u64,
}

impl BytesPart {
    #[must_use]
    pub fn chunk_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.blob_ref)
    }

    #[must_use]
    pub fn nested_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.bytes_ref)
    }
}

///
/// Superset
///

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Superset {
    #[serde(default)]
    pub camli_version: Option<u64>,

    #[serde(default)]
    pub camli_type: String,

    #[serde(default)]
    pub camli_signer: String,

    #[serde(default)]
    pub claim_type: String,

    #[serde(default)]
    pub claim_date: String,

    #[serde(default)]
    pub attribute: String,

    #[serde(default)]
    pub value: String,

    #[serde(default)]
    pub permanode: String,

    #[serde(default)]
    pub target: String,

    #[serde(default)]
    pub parts: Vec<BytesPart>,

    #[serde(default)]
    pub file_name: String,

    #[serde(default)]
    pub unix_mtime: Option<i64>,

    #[serde(default)]
    pub mod_time: String,

    /// Directory schema: ref of the static-set blob listing the members.
    #[serde(default)]
    pub entries: String,

    /// Static-set schema: member refs.
    #[serde(default)]
    pub members: Vec<String>,
}

impl Superset {
    /// Decode schema JSON. The first non-whitespace byte must open an
    /// object and a recognized `camliType` must be present; anything else
    /// is "not a schema blob", which callers treat as opaque bytes.
    pub fn decode(json: &[u8]) -> Result<Self, SchemaDecodeError> {
        let first = json
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .copied()
            .ok_or(SchemaDecodeError::NotJson)?;
        if first != b'{' {
            return Err(SchemaDecodeError::NotJson);
        }

        let superset: Self =
            serde_json::from_slice(json).map_err(|_| SchemaDecodeError::NotJson)?;

        if superset.recognized_type().is_none() {
            return Err(SchemaDecodeError::NoCamliType);
        }

        Ok(superset)
    }

    #[must_use]
    pub fn recognized_type(&self) -> Option<CamliType> {
        CamliType::from_str_opt(&self.camli_type)
    }

    #[must_use]
    pub fn claim_type_parsed(&self) -> Option<ClaimType> {
        ClaimType::parse(&self.claim_type).ok()
    }

    #[must_use]
    pub fn claim_date_parsed(&self) -> Option<DateTime<Utc>> {
        parse_rfc3339(&self.claim_date).ok()
    }

    #[must_use]
    pub fn permanode_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.permanode)
    }

    #[must_use]
    pub fn target_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.target)
    }

    #[must_use]
    pub fn signer_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.camli_signer)
    }

    #[must_use]
    pub fn entries_ref(&self) -> Option<BlobRef> {
        BlobRef::parse_opt(&self.entries)
    }

    /// Member refs of a static-set, skipping unparseable entries.
    #[must_use]
    pub fn member_refs(&self) -> Vec<BlobRef> {
        self.members
            .iter()
            .filter_map(|m| BlobRef::parse_opt(m))
            .collect()
    }

    /// The file's explicit modification time: `modTime` when present and
    /// well-formed, else the `unixMtime` seconds.
    #[must_use]
    pub fn explicit_mod_time(&self) -> Option<DateTime<Utc>> {
        if let Ok(t) = parse_rfc3339(&self.mod_time) {
            return Some(t);
        }
        self.unix_mtime
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_claim() {
        let json = br#"{
            "camliVersion": 1,
            "camliType": "claim",
            "camliSigner": "sha224-deadbeef",
            "claimType": "set-attribute",
            "claimDate": "2011-11-27T01:23:45Z",
            "attribute": "tag",
            "value": "foo",
            "permanode": "sha224-cafe"
        }"#;

        let ss = Superset::decode(json).unwrap();
        assert_eq!(ss.recognized_type(), Some(CamliType::Claim));
        assert_eq!(ss.claim_type_parsed(), Some(ClaimType::SetAttribute));
        assert!(ss.claim_date_parsed().is_some());
        // Bad-width refs parse as absent, not as errors.
        assert!(ss.permanode_ref().is_none());
    }

    #[test]
    fn rejects_non_schema_json() {
        assert!(Superset::decode(b"[1,2,3]").is_err());
        assert!(Superset::decode(b"   \n plain text").is_err());
        assert!(Superset::decode(b"{\"camliType\":\"wibble\"}").is_err());
        assert!(Superset::decode(b"").is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let json = br#"{"camliType": "permanode", "random": {"nested": true}}"#;
        let ss = Superset::decode(json).unwrap();
        assert_eq!(ss.recognized_type(), Some(CamliType::Permanode));
    }

    #[test]
    fn mod_time_prefers_rfc3339_over_unix() {
        let json = br#"{
            "camliType": "file",
            "modTime": "2012-01-01T00:00:00Z",
            "unixMtime": 0
        }"#;
        let ss = Superset::decode(json).unwrap();
        assert_eq!(
            ss.explicit_mod_time().unwrap(),
            parse_rfc3339("2012-01-01T00:00:00Z").unwrap()
        );
    }
}
