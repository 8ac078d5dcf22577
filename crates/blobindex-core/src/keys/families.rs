//! Module: keys::families
//! Responsibility: typed builders and parsers for every index row family.
//! Does not own: which rows a blob produces (ingest policy) or how rows are
//! merged into the corpus.
//! Boundary: ingest/query/corpus depend on families; families depend only on
//! primitives and the escape/revtime codecs.
//!
//! All rows are UTF-8 strings of the form `family|part|part|...`. Freeform
//! parts are percent-escaped; blobrefs, key ids, and RFC-3339 dates are
//! `|`-free by construction and stored raw. On-disk compatibility requires
//! these encodings to stay byte-exact.

use crate::{
    blobref::{BlobRef, KeyId},
    error::{ErrorClass, ErrorOrigin, IndexError},
    keys::{
        escape::{escape, unescape},
        revtime::{format_rfc3339, parse_rfc3339, reverse_time, unreverse_time},
    },
    model::{Claim, ClaimType, EdgeType},
};
use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;

/// Version of the row schema. Bumped whenever any family changes semantics;
/// startup compares it against the stored `schemaversion` row.
pub const SCHEMA_VERSION: u32 = 1;

///
/// RowParseError
/// (decode / corruption boundary)
///

#[derive(Debug, ThisError)]
pub enum RowParseError {
    #[error("row is not in family '{0}'")]
    WrongFamily(&'static str),

    #[error("wrong part count in row key/value: {0:?}")]
    BadArity(String),

    #[error("bad blobref part: {0:?}")]
    BadRef(String),

    #[error("bad key id part: {0:?}")]
    BadKeyId(String),

    #[error("bad date part: {0:?}")]
    BadDate(String),

    #[error("bad escaped token: {0:?}")]
    BadEscape(String),

    #[error("bad numeric part: {0:?}")]
    BadNumber(String),

    #[error("bad value part: {0:?}")]
    BadValue(String),
}

impl From<RowParseError> for IndexError {
    fn from(err: RowParseError) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Query, err.to_string())
    }
}

type RowResult<T> = Result<T, RowParseError>;

fn part_ref(s: &str) -> RowResult<BlobRef> {
    BlobRef::parse(s).map_err(|_| RowParseError::BadRef(s.to_string()))
}

fn part_keyid(s: &str) -> RowResult<KeyId> {
    KeyId::parse(s).map_err(|_| RowParseError::BadKeyId(s.to_string()))
}

fn part_date(s: &str) -> RowResult<DateTime<Utc>> {
    parse_rfc3339(s).map_err(|_| RowParseError::BadDate(s.to_string()))
}

fn part_revdate(s: &str) -> RowResult<DateTime<Utc>> {
    unreverse_time(s).map_err(|_| RowParseError::BadDate(s.to_string()))
}

fn part_token(s: &str) -> RowResult<String> {
    unescape(s).ok_or_else(|| RowParseError::BadEscape(s.to_string()))
}

fn part_u64(s: &str) -> RowResult<u64> {
    s.parse().map_err(|_| RowParseError::BadNumber(s.to_string()))
}

fn key_parts<'a, const N: usize>(family: &'static str, key: &'a str) -> RowResult<[&'a str; N]> {
    let mut parts = key.split('|');
    if parts.next() != Some(family) {
        return Err(RowParseError::WrongFamily(family));
    }

    let rest: Vec<&str> = parts.collect();
    rest.try_into()
        .map_err(|_| RowParseError::BadArity(key.to_string()))
}

fn val_parts<const N: usize>(value: &str) -> RowResult<[&str; N]> {
    let parts: Vec<&str> = value.split('|').collect();
    parts
        .try_into()
        .map_err(|_| RowParseError::BadArity(value.to_string()))
}

///
/// RowFamily
///
/// Registry of every family. The corpus uses `of_key` to dispatch replayed
/// mutations; adding a family means adding a variant here plus its typed
/// row struct below.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RowFamily {
    Meta,
    Have,
    SignerKeyId,
    Claim,
    RecentPermanode,
    SignerAttrValue,
    SignerTargetPath,
    Path,
    WholeToFile,
    FileInfo,
    FileTimes,
    ImageSize,
    ExifGps,
    ExifTag,
    MediaTag,
    DirChild,
    EdgeBack,
    Deleted,
    Missing,
    SchemaVersion,
}

impl RowFamily {
    pub const ALL: [Self; 20] = [
        Self::Meta,
        Self::Have,
        Self::SignerKeyId,
        Self::Claim,
        Self::RecentPermanode,
        Self::SignerAttrValue,
        Self::SignerTargetPath,
        Self::Path,
        Self::WholeToFile,
        Self::FileInfo,
        Self::FileTimes,
        Self::ImageSize,
        Self::ExifGps,
        Self::ExifTag,
        Self::MediaTag,
        Self::DirChild,
        Self::EdgeBack,
        Self::Deleted,
        Self::Missing,
        Self::SchemaVersion,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Have => "have",
            Self::SignerKeyId => "signerkeyid",
            Self::Claim => "claim",
            Self::RecentPermanode => "recpn",
            Self::SignerAttrValue => "signerattrvalue",
            Self::SignerTargetPath => "signertargetpath",
            Self::Path => "path",
            Self::WholeToFile => "wholetofile",
            Self::FileInfo => "fileinfo",
            Self::FileTimes => "filetimes",
            Self::ImageSize => "imagesize",
            Self::ExifGps => "exifgps",
            Self::ExifTag => "exiftag",
            Self::MediaTag => "mediatag",
            Self::DirChild => "dirchild",
            Self::EdgeBack => "edgeback",
            Self::Deleted => "deleted",
            Self::Missing => "missing",
            Self::SchemaVersion => "schemaversion",
        }
    }

    /// Scan prefix covering the whole family.
    #[must_use]
    pub fn prefix(self) -> String {
        format!("{}|", self.name())
    }

    /// Classify a full row key by its family segment.
    #[must_use]
    pub fn of_key(key: &str) -> Option<Self> {
        let family = key.split('|').next().unwrap_or(key);
        Self::ALL.into_iter().find(|f| f.name() == family)
    }
}

///
/// MetaRow
/// `meta|<ref>` → `<size>|<mime>`. The first row written for any accepted
/// blob; every other family refers back to it.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetaRow {
    pub blob_ref: BlobRef,
    pub size: u64,
    /// Empty when nothing was sniffed. Schema blobs carry
    /// `application/json; camliType=<type>`.
    pub mime: String,
}

impl MetaRow {
    pub const FAMILY: &'static str = "meta";

    #[must_use]
    pub fn key(blob_ref: &BlobRef) -> String {
        format!("{}|{blob_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(size: u64, mime: &str) -> String {
        format!("{size}|{mime}")
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [r] = key_parts::<1>(Self::FAMILY, key)?;
        let (size, mime) = value
            .split_once('|')
            .ok_or_else(|| RowParseError::BadValue(value.to_string()))?;

        Ok(Self {
            blob_ref: part_ref(r)?,
            size: part_u64(size)?,
            mime: mime.to_string(),
        })
    }
}

///
/// HaveRow
/// `have|<ref>` → `<size>` or `<size>|indexed`. The `|indexed` suffix marks
/// a blob whose mutation set was produced without missing dependencies.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HaveRow {
    pub blob_ref: BlobRef,
    pub size: u64,
    pub indexed: bool,
}

impl HaveRow {
    pub const FAMILY: &'static str = "have";
    const INDEXED_SUFFIX: &'static str = "|indexed";

    #[must_use]
    pub fn key(blob_ref: &BlobRef) -> String {
        format!("{}|{blob_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(size: u64, indexed: bool) -> String {
        if indexed {
            format!("{size}{}", Self::INDEXED_SUFFIX)
        } else {
            size.to_string()
        }
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [r] = key_parts::<1>(Self::FAMILY, key)?;
        let (size, indexed) = match value.strip_suffix(Self::INDEXED_SUFFIX) {
            Some(size) => (size, true),
            None => (value, false),
        };

        Ok(Self {
            blob_ref: part_ref(r)?,
            size: part_u64(size)?,
            indexed,
        })
    }
}

///
/// SignerKeyIdRow
/// `signerkeyid|<signerBlobRef>` → `<keyId>`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerKeyIdRow {
    pub signer: BlobRef,
    pub key_id: KeyId,
}

impl SignerKeyIdRow {
    pub const FAMILY: &'static str = "signerkeyid";

    #[must_use]
    pub fn key(signer: &BlobRef) -> String {
        format!("{}|{signer}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(key_id: &KeyId) -> String {
        key_id.to_string()
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [signer] = key_parts::<1>(Self::FAMILY, key)?;

        Ok(Self {
            signer: part_ref(signer)?,
            key_id: part_keyid(value)?,
        })
    }
}

///
/// ClaimRow
/// `claim|<permanode>|<keyId>|<date>|<claimRef>` →
/// `<claimType>|<attr>|<value>|<signerBlobRef>`.
///
/// The authoritative per-permanode claim history, date-ascending under a
/// `claim|<permanode>|` prefix scan. Delete claims store empty attr/value.
///

pub struct ClaimRow;

impl ClaimRow {
    pub const FAMILY: &'static str = "claim";

    #[must_use]
    pub fn key(
        permanode: &BlobRef,
        key_id: &KeyId,
        date: DateTime<Utc>,
        claim_ref: &BlobRef,
    ) -> String {
        format!(
            "{}|{permanode}|{key_id}|{}|{claim_ref}",
            Self::FAMILY,
            format_rfc3339(date)
        )
    }

    #[must_use]
    pub fn value(claim_type: ClaimType, attr: &str, value: &str, signer: &BlobRef) -> String {
        format!("{claim_type}|{}|{}|{signer}", escape(attr), escape(value))
    }

    #[must_use]
    pub fn prefix(permanode: &BlobRef) -> String {
        format!("{}|{permanode}|", Self::FAMILY)
    }

    /// Parse one claim row back into its runtime form.
    pub fn parse(key: &str, value: &str) -> RowResult<Claim> {
        let [permanode, key_id, date, claim_ref] = key_parts::<4>(Self::FAMILY, key)?;
        let [claim_type, attr, val, signer] = val_parts::<4>(value)?;

        Ok(Claim {
            blob_ref: part_ref(claim_ref)?,
            signer: part_ref(signer)?,
            key_id: part_keyid(key_id)?,
            permanode: part_ref(permanode)?,
            date: part_date(date)?,
            claim_type: ClaimType::parse(claim_type)
                .map_err(|_| RowParseError::BadValue(claim_type.to_string()))?,
            attr: part_token(attr)?,
            value: part_token(val)?,
            target: None,
        })
    }
}

///
/// RecpnRow
/// `recpn|<keyId>|<reverse-date>|<claimRef>` → `<permanode>`. Drives
/// newest-first enumeration of a signer's touched permanodes.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecpnRow {
    pub key_id: KeyId,
    pub date: DateTime<Utc>,
    pub claim_ref: BlobRef,
    pub permanode: BlobRef,
}

impl RecpnRow {
    pub const FAMILY: &'static str = "recpn";

    #[must_use]
    pub fn key(key_id: &KeyId, date: DateTime<Utc>, claim_ref: &BlobRef) -> String {
        format!("{}|{key_id}|{}|{claim_ref}", Self::FAMILY, reverse_time(date))
    }

    #[must_use]
    pub fn prefix(key_id: &KeyId) -> String {
        format!("{}|{key_id}|", Self::FAMILY)
    }

    /// Scan start that skips every claim newer than `before`.
    #[must_use]
    pub fn start_at(key_id: &KeyId, before: DateTime<Utc>) -> String {
        format!("{}|{key_id}|{}", Self::FAMILY, reverse_time(before))
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [key_id, revdate, claim_ref] = key_parts::<3>(Self::FAMILY, key)?;

        Ok(Self {
            key_id: part_keyid(key_id)?,
            date: part_revdate(revdate)?,
            claim_ref: part_ref(claim_ref)?,
            permanode: part_ref(value)?,
        })
    }
}

///
/// SignerAttrValueRow
/// `signerattrvalue|<keyId>|<attr>|<value>|<reverse-date>|<claimRef>` →
/// `<permanode>`. Only whitelisted attributes are indexed this way.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerAttrValueRow {
    pub key_id: KeyId,
    pub attr: String,
    pub value: String,
    pub date: DateTime<Utc>,
    pub claim_ref: BlobRef,
    pub permanode: BlobRef,
}

impl SignerAttrValueRow {
    pub const FAMILY: &'static str = "signerattrvalue";

    #[must_use]
    pub fn key(
        key_id: &KeyId,
        attr: &str,
        value: &str,
        date: DateTime<Utc>,
        claim_ref: &BlobRef,
    ) -> String {
        format!(
            "{}|{key_id}|{}|{}|{}|{claim_ref}",
            Self::FAMILY,
            escape(attr),
            escape(value),
            reverse_time(date)
        )
    }

    #[must_use]
    pub fn prefix(key_id: &KeyId, attr: &str, value: &str) -> String {
        format!("{}|{key_id}|{}|{}|", Self::FAMILY, escape(attr), escape(value))
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [key_id, attr, attr_value, revdate, claim_ref] = key_parts::<5>(Self::FAMILY, key)?;

        Ok(Self {
            key_id: part_keyid(key_id)?,
            attr: part_token(attr)?,
            value: part_token(attr_value)?,
            date: part_revdate(revdate)?,
            claim_ref: part_ref(claim_ref)?,
            permanode: part_ref(value)?,
        })
    }
}

///
/// SignerTargetPathRow
/// `signertargetpath|<keyId>|<targetRef>|<claimRef>` →
/// `<date>|<baseRef>|<active Y/N>|<suffix>`. Backward direction of a
/// `camliPath:` claim: "which paths point at this target".
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerTargetPathRow {
    pub key_id: KeyId,
    pub target: BlobRef,
    pub claim_ref: BlobRef,
    pub date: DateTime<Utc>,
    pub base: BlobRef,
    pub active: bool,
    pub suffix: String,
}

impl SignerTargetPathRow {
    pub const FAMILY: &'static str = "signertargetpath";

    #[must_use]
    pub fn key(key_id: &KeyId, target: &BlobRef, claim_ref: &BlobRef) -> String {
        format!("{}|{key_id}|{target}|{claim_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(date: DateTime<Utc>, base: &BlobRef, active: bool, suffix: &str) -> String {
        format!(
            "{}|{base}|{}|{}",
            format_rfc3339(date),
            if active { 'Y' } else { 'N' },
            escape(suffix)
        )
    }

    #[must_use]
    pub fn prefix(key_id: &KeyId, target: &BlobRef) -> String {
        format!("{}|{key_id}|{target}|", Self::FAMILY)
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [key_id, target, claim_ref] = key_parts::<3>(Self::FAMILY, key)?;
        let [date, base, active, suffix] = val_parts::<4>(value)?;

        Ok(Self {
            key_id: part_keyid(key_id)?,
            target: part_ref(target)?,
            claim_ref: part_ref(claim_ref)?,
            date: part_date(date)?,
            base: part_ref(base)?,
            active: parse_active(active)?,
            suffix: part_token(suffix)?,
        })
    }
}

///
/// PathRow
/// `path|<keyId>|<baseRef>|<suffix>|<reverse-date>|<claimRef>` →
/// `<active Y/N>|<targetRef>`. Forward direction: newest-first per
/// (base, suffix).
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathRow {
    pub key_id: KeyId,
    pub base: BlobRef,
    pub suffix: String,
    pub date: DateTime<Utc>,
    pub claim_ref: BlobRef,
    pub active: bool,
    pub target: BlobRef,
}

impl PathRow {
    pub const FAMILY: &'static str = "path";

    #[must_use]
    pub fn key(
        key_id: &KeyId,
        base: &BlobRef,
        suffix: &str,
        date: DateTime<Utc>,
        claim_ref: &BlobRef,
    ) -> String {
        format!(
            "{}|{key_id}|{base}|{}|{}|{claim_ref}",
            Self::FAMILY,
            escape(suffix),
            reverse_time(date)
        )
    }

    #[must_use]
    pub fn value(active: bool, target: &BlobRef) -> String {
        format!("{}|{target}", if active { 'Y' } else { 'N' })
    }

    #[must_use]
    pub fn prefix(key_id: &KeyId, base: &BlobRef, suffix: &str) -> String {
        format!("{}|{key_id}|{base}|{}|", Self::FAMILY, escape(suffix))
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [key_id, base, suffix, revdate, claim_ref] = key_parts::<5>(Self::FAMILY, key)?;
        let [active, target] = val_parts::<2>(value)?;

        Ok(Self {
            key_id: part_keyid(key_id)?,
            base: part_ref(base)?,
            suffix: part_token(suffix)?,
            date: part_revdate(revdate)?,
            claim_ref: part_ref(claim_ref)?,
            active: parse_active(active)?,
            target: part_ref(target)?,
        })
    }
}

fn parse_active(s: &str) -> RowResult<bool> {
    match s {
        "Y" => Ok(true),
        "N" => Ok(false),
        other => Err(RowParseError::BadValue(other.to_string())),
    }
}

///
/// WholeToFileRow
/// `wholetofile|<wholeRef>|<fileSchemaRef>` → `1`. Maps whole-file content
/// hashes to the file schemas describing them.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WholeToFileRow {
    pub whole_ref: BlobRef,
    pub file_ref: BlobRef,
}

impl WholeToFileRow {
    pub const FAMILY: &'static str = "wholetofile";

    #[must_use]
    pub fn key(whole_ref: &BlobRef, file_ref: &BlobRef) -> String {
        format!("{}|{whole_ref}|{file_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn prefix(whole_ref: &BlobRef) -> String {
        format!("{}|{whole_ref}|", Self::FAMILY)
    }

    pub fn parse(key: &str) -> RowResult<Self> {
        let [whole_ref, file_ref] = key_parts::<2>(Self::FAMILY, key)?;

        Ok(Self {
            whole_ref: part_ref(whole_ref)?,
            file_ref: part_ref(file_ref)?,
        })
    }
}

///
/// FileInfoRow
/// `fileinfo|<fileRef>` → `<size>|<fileName>|<mime>|<wholeRef>`.
/// Directories reuse the family with size = member count and no wholeRef.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileInfoRow {
    pub file_ref: BlobRef,
    pub size: u64,
    pub file_name: String,
    pub mime: String,
    pub whole_ref: Option<BlobRef>,
}

impl FileInfoRow {
    pub const FAMILY: &'static str = "fileinfo";

    #[must_use]
    pub fn key(file_ref: &BlobRef) -> String {
        format!("{}|{file_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(size: u64, file_name: &str, mime: &str, whole_ref: Option<&BlobRef>) -> String {
        let whole = whole_ref.map(ToString::to_string).unwrap_or_default();
        format!("{size}|{}|{}|{whole}", escape(file_name), escape(mime))
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [file_ref] = key_parts::<1>(Self::FAMILY, key)?;
        let [size, file_name, mime, whole] = val_parts::<4>(value)?;

        let whole_ref = if whole.is_empty() {
            None
        } else {
            Some(part_ref(whole)?)
        };

        Ok(Self {
            file_ref: part_ref(file_ref)?,
            size: part_u64(size)?,
            file_name: part_token(file_name)?,
            mime: part_token(mime)?,
            whole_ref,
        })
    }
}

///
/// FileTimesRow
/// `filetimes|<fileRef>` → up to two escaped RFC-3339 times, oldest first,
/// comma-separated. Empty value when no usable time exists.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileTimesRow {
    pub file_ref: BlobRef,
    pub times: Vec<DateTime<Utc>>,
}

impl FileTimesRow {
    pub const FAMILY: &'static str = "filetimes";

    #[must_use]
    pub fn key(file_ref: &BlobRef) -> String {
        format!("{}|{file_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(times: &[DateTime<Utc>]) -> String {
        times
            .iter()
            .map(|t| escape(&format_rfc3339(*t)))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [file_ref] = key_parts::<1>(Self::FAMILY, key)?;

        let mut times = Vec::new();
        if !value.is_empty() {
            for part in value.split(',') {
                times.push(part_date(&part_token(part)?)?);
            }
        }

        Ok(Self {
            file_ref: part_ref(file_ref)?,
            times,
        })
    }
}

///
/// ImageSizeRow
/// `imagesize|<fileRef>` → `<width>|<height>`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSizeRow {
    pub file_ref: BlobRef,
    pub width: u16,
    pub height: u16,
}

impl ImageSizeRow {
    pub const FAMILY: &'static str = "imagesize";

    #[must_use]
    pub fn key(file_ref: &BlobRef) -> String {
        format!("{}|{file_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(width: u16, height: u16) -> String {
        format!("{width}|{height}")
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [file_ref] = key_parts::<1>(Self::FAMILY, key)?;
        let [width, height] = val_parts::<2>(value)?;

        let dim = |s: &str| {
            s.parse::<u16>()
                .map_err(|_| RowParseError::BadNumber(s.to_string()))
        };

        Ok(Self {
            file_ref: part_ref(file_ref)?,
            width: dim(width)?,
            height: dim(height)?,
        })
    }
}

///
/// ExifGpsRow
/// `exifgps|<wholeRef>` → `<lat>|<long>`, both at 7 decimal places.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ExifGpsRow {
    pub whole_ref: BlobRef,
    pub lat: f64,
    pub long: f64,
}

impl ExifGpsRow {
    pub const FAMILY: &'static str = "exifgps";

    #[must_use]
    pub fn key(whole_ref: &BlobRef) -> String {
        format!("{}|{whole_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(lat: f64, long: f64) -> String {
        format!("{lat:.7}|{long:.7}")
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [whole_ref] = key_parts::<1>(Self::FAMILY, key)?;
        let [lat, long] = val_parts::<2>(value)?;

        let coord = |s: &str| {
            s.parse::<f64>()
                .map_err(|_| RowParseError::BadNumber(s.to_string()))
        };

        Ok(Self {
            whole_ref: part_ref(whole_ref)?,
            lat: coord(lat)?,
            long: coord(long)?,
        })
    }
}

///
/// ExifTagRow
/// `exiftag|<wholeRef>|<tagHex>` → `<format>|<count>|<values>`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExifTagRow {
    pub whole_ref: BlobRef,
    pub tag: u16,
    pub format: u16,
    pub count: u32,
    pub values: String,
}

impl ExifTagRow {
    pub const FAMILY: &'static str = "exiftag";

    #[must_use]
    pub fn key(whole_ref: &BlobRef, tag: u16) -> String {
        format!("{}|{whole_ref}|{tag:04x}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(format: u16, count: u32, values: &str) -> String {
        format!("{format}|{count}|{}", escape(values))
    }

    #[must_use]
    pub fn prefix(whole_ref: &BlobRef) -> String {
        format!("{}|{whole_ref}|", Self::FAMILY)
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [whole_ref, tag] = key_parts::<2>(Self::FAMILY, key)?;
        let [format, count, values] = val_parts::<3>(value)?;

        Ok(Self {
            whole_ref: part_ref(whole_ref)?,
            tag: u16::from_str_radix(tag, 16)
                .map_err(|_| RowParseError::BadNumber(tag.to_string()))?,
            format: format
                .parse()
                .map_err(|_| RowParseError::BadNumber(format.to_string()))?,
            count: count
                .parse()
                .map_err(|_| RowParseError::BadNumber(count.to_string()))?,
            values: part_token(values)?,
        })
    }
}

///
/// MediaTagRow
/// `mediatag|<wholeRef>|<tagName>` → `<value>`. Audio tag metadata keyed by
/// whole-file hash so every copy of the track shares rows.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaTagRow {
    pub whole_ref: BlobRef,
    pub tag: String,
    pub value: String,
}

impl MediaTagRow {
    pub const FAMILY: &'static str = "mediatag";

    #[must_use]
    pub fn key(whole_ref: &BlobRef, tag: &str) -> String {
        format!("{}|{whole_ref}|{tag}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(value: &str) -> String {
        escape(value)
    }

    #[must_use]
    pub fn prefix(whole_ref: &BlobRef) -> String {
        format!("{}|{whole_ref}|", Self::FAMILY)
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [whole_ref, tag] = key_parts::<2>(Self::FAMILY, key)?;

        Ok(Self {
            whole_ref: part_ref(whole_ref)?,
            tag: tag.to_string(),
            value: part_token(value)?,
        })
    }
}

///
/// DirChildRow
/// `dirchild|<dirRef>|<childRef>` → `1`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirChildRow {
    pub dir_ref: BlobRef,
    pub child_ref: BlobRef,
}

impl DirChildRow {
    pub const FAMILY: &'static str = "dirchild";

    #[must_use]
    pub fn key(dir_ref: &BlobRef, child_ref: &BlobRef) -> String {
        format!("{}|{dir_ref}|{child_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn prefix(dir_ref: &BlobRef) -> String {
        format!("{}|{dir_ref}|", Self::FAMILY)
    }

    pub fn parse(key: &str) -> RowResult<Self> {
        let [dir_ref, child_ref] = key_parts::<2>(Self::FAMILY, key)?;

        Ok(Self {
            dir_ref: part_ref(dir_ref)?,
            child_ref: part_ref(child_ref)?,
        })
    }
}

///
/// EdgeBackRow
/// `edgeback|<childRef>|<parentRef>|<blobRef>` → `<parentType>|<parentName>`.
/// `blobRef` is the claim blob for permanode edges and the directory schema
/// blob for directory containment.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeBackRow {
    pub child: BlobRef,
    pub parent: BlobRef,
    pub blob_ref: BlobRef,
    pub parent_type: EdgeType,
    pub parent_name: String,
}

impl EdgeBackRow {
    pub const FAMILY: &'static str = "edgeback";

    #[must_use]
    pub fn key(child: &BlobRef, parent: &BlobRef, blob_ref: &BlobRef) -> String {
        format!("{}|{child}|{parent}|{blob_ref}", Self::FAMILY)
    }

    #[must_use]
    pub fn value(parent_type: EdgeType, parent_name: &str) -> String {
        format!("{}|{}", parent_type.as_str(), escape(parent_name))
    }

    #[must_use]
    pub fn prefix(child: &BlobRef) -> String {
        format!("{}|{child}|", Self::FAMILY)
    }

    pub fn parse(key: &str, value: &str) -> RowResult<Self> {
        let [child, parent, blob_ref] = key_parts::<3>(Self::FAMILY, key)?;
        let [parent_type, parent_name] = val_parts::<2>(value)?;

        Ok(Self {
            child: part_ref(child)?,
            parent: part_ref(parent)?,
            blob_ref: part_ref(blob_ref)?,
            parent_type: EdgeType::from_str_opt(parent_type)
                .ok_or_else(|| RowParseError::BadValue(parent_type.to_string()))?,
            parent_name: part_token(parent_name)?,
        })
    }
}

///
/// DeletedRow
/// `deleted|<targetRef>|<reverse-date>|<deleterRef>` → empty value.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeletedRow {
    pub target: BlobRef,
    pub when: DateTime<Utc>,
    pub deleter: BlobRef,
}

impl DeletedRow {
    pub const FAMILY: &'static str = "deleted";

    #[must_use]
    pub fn key(target: &BlobRef, when: DateTime<Utc>, deleter: &BlobRef) -> String {
        format!("{}|{target}|{}|{deleter}", Self::FAMILY, reverse_time(when))
    }

    #[must_use]
    pub fn prefix(target: &BlobRef) -> String {
        format!("{}|{target}|", Self::FAMILY)
    }

    pub fn parse(key: &str) -> RowResult<Self> {
        let [target, revdate, deleter] = key_parts::<3>(Self::FAMILY, key)?;

        Ok(Self {
            target: part_ref(target)?,
            when: part_revdate(revdate)?,
            deleter: part_ref(deleter)?,
        })
    }
}

///
/// MissingRow
/// `missing|<haveRef>|<missingRef>` → `1`. One row per unmet dependency of
/// a partially indexed blob; removed as each dependency arrives.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingRow {
    pub have: BlobRef,
    pub missing: BlobRef,
}

impl MissingRow {
    pub const FAMILY: &'static str = "missing";

    #[must_use]
    pub fn key(have: &BlobRef, missing: &BlobRef) -> String {
        format!("{}|{have}|{missing}", Self::FAMILY)
    }

    #[must_use]
    pub fn prefix(have: &BlobRef) -> String {
        format!("{}|{have}|", Self::FAMILY)
    }

    pub fn parse(key: &str) -> RowResult<Self> {
        let [have, missing] = key_parts::<2>(Self::FAMILY, key)?;

        Ok(Self {
            have: part_ref(have)?,
            missing: part_ref(missing)?,
        })
    }
}

///
/// SchemaVersionRow
/// `schemaversion` → the integer schema version.
///

pub struct SchemaVersionRow;

impl SchemaVersionRow {
    pub const KEY: &'static str = "schemaversion";

    #[must_use]
    pub fn value(version: u32) -> String {
        version.to_string()
    }

    pub fn parse(value: &str) -> RowResult<u32> {
        value
            .parse()
            .map_err(|_| RowParseError::BadNumber(value.to_string()))
    }
}

// Attribute policy shared by ingest and query.

/// Attributes indexed into `signerattrvalue` rows.
#[must_use]
pub fn is_indexed_attr(attr: &str) -> bool {
    matches!(attr, "camliRoot" | "camliImportRoot" | "tag" | "title")
}

/// Attributes whose value is a blobref, producing `edgeback` rows.
#[must_use]
pub fn is_blobref_attr(attr: &str) -> bool {
    matches!(attr, "camliMember" | "camliContent")
}

/// The suffix of a `camliPath:<suffix>` attribute, if this is one.
#[must_use]
pub fn path_claim_suffix(attr: &str) -> Option<&str> {
    attr.strip_prefix("camliPath:")
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn some_ref(tag: &str) -> BlobRef {
        BlobRef::from_sha224(tag.as_bytes())
    }

    fn some_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 11, 27, 1, 23, 45).unwrap()
    }

    #[test]
    fn file_info_row_matches_wire_format() {
        let file_ref = some_ref("file");
        let whole_ref = some_ref("whole");

        let key = FileInfoRow::key(&file_ref);
        let value = FileInfoRow::value(31, "foo.html", "text/html", Some(&whole_ref));

        assert_eq!(key, format!("fileinfo|{file_ref}"));
        assert_eq!(value, format!("31|foo.html|text%2Fhtml|{whole_ref}"));

        let parsed = FileInfoRow::parse(&key, &value).unwrap();
        assert_eq!(parsed.size, 31);
        assert_eq!(parsed.file_name, "foo.html");
        assert_eq!(parsed.mime, "text/html");
        assert_eq!(parsed.whole_ref, Some(whole_ref));
    }

    #[test]
    fn claim_row_round_trips() {
        let permanode = some_ref("pn");
        let claim_ref = some_ref("claim");
        let signer = some_ref("signer");
        let key_id = KeyId::parse("2931A67C26F5ABDA").unwrap();

        let key = ClaimRow::key(&permanode, &key_id, some_date(), &claim_ref);
        let value = ClaimRow::value(ClaimType::SetAttribute, "tag", "a|b value", &signer);

        let claim = ClaimRow::parse(&key, &value).unwrap();
        assert_eq!(claim.permanode, permanode);
        assert_eq!(claim.blob_ref, claim_ref);
        assert_eq!(claim.signer, signer);
        assert_eq!(claim.key_id, key_id);
        assert_eq!(claim.date, some_date());
        assert_eq!(claim.claim_type, ClaimType::SetAttribute);
        assert_eq!(claim.attr, "tag");
        assert_eq!(claim.value, "a|b value");
    }

    #[test]
    fn claim_prefix_scans_by_date_order() {
        let permanode = some_ref("pn");
        let key_id = KeyId::parse("2931A67C26F5ABDA").unwrap();
        let early = ClaimRow::key(&permanode, &key_id, some_date(), &some_ref("c1"));
        let late = ClaimRow::key(
            &permanode,
            &key_id,
            some_date() + chrono::Duration::seconds(1),
            &some_ref("c2"),
        );

        assert!(early.starts_with(&ClaimRow::prefix(&permanode)));
        assert!(early < late);
    }

    #[test]
    fn recpn_rows_scan_newest_first() {
        let key_id = KeyId::parse("2931A67C26F5ABDA").unwrap();
        let older = RecpnRow::key(&key_id, some_date(), &some_ref("c1"));
        let newer = RecpnRow::key(
            &key_id,
            some_date() + chrono::Duration::hours(1),
            &some_ref("c2"),
        );

        assert!(newer < older);

        let parsed = RecpnRow::parse(&older, &some_ref("pn").to_string()).unwrap();
        assert_eq!(parsed.date, some_date());
        assert_eq!(parsed.permanode, some_ref("pn"));
    }

    #[test]
    fn have_row_indexed_suffix() {
        let r = some_ref("b");
        assert_eq!(HaveRow::value(17, false), "17");
        assert_eq!(HaveRow::value(17, true), "17|indexed");

        let parsed = HaveRow::parse(&HaveRow::key(&r), "17|indexed").unwrap();
        assert!(parsed.indexed);
        assert_eq!(parsed.size, 17);
    }

    #[test]
    fn exif_gps_seven_decimal_places() {
        assert_eq!(ExifGpsRow::value(37.7749295, -122.4194155), "37.7749295|-122.4194155");
        assert_eq!(ExifGpsRow::value(1.0, 2.0), "1.0000000|2.0000000");
    }

    #[test]
    fn deleted_row_round_trips() {
        let target = some_ref("target");
        let deleter = some_ref("deleter");
        let key = DeletedRow::key(&target, some_date(), &deleter);

        let parsed = DeletedRow::parse(&key).unwrap();
        assert_eq!(parsed.target, target);
        assert_eq!(parsed.deleter, deleter);
        assert_eq!(parsed.when, some_date());
    }

    #[test]
    fn family_registry_classifies_keys() {
        assert_eq!(RowFamily::of_key("meta|sha224-x"), Some(RowFamily::Meta));
        assert_eq!(RowFamily::of_key("schemaversion"), Some(RowFamily::SchemaVersion));
        assert_eq!(RowFamily::of_key("unknown|x"), None);
    }

    #[test]
    fn malformed_rows_are_corruption_class() {
        let err: IndexError = ClaimRow::parse("claim|bogus", "x").unwrap_err().into();
        assert_eq!(err.class, ErrorClass::Corruption);
    }

    #[test]
    fn attr_policy() {
        assert!(is_indexed_attr("tag"));
        assert!(is_indexed_attr("camliRoot"));
        assert!(!is_indexed_attr("camliContent"));
        assert!(is_blobref_attr("camliMember"));
        assert_eq!(path_claim_suffix("camliPath:foo/bar"), Some("foo/bar"));
        assert_eq!(path_claim_suffix("tag"), None);
    }
}
