use crate::error::{ErrorClass, ErrorOrigin, IndexError};
use sha2::{Digest, Sha224, Sha256};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error as ThisError;

///
/// BlobRefParseError
/// (decode / corruption boundary)
///

#[derive(Debug, ThisError)]
pub enum BlobRefParseError {
    #[error("missing '-' separator in blobref")]
    MissingSeparator,

    #[error("unknown hash algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("digest is not lowercase hex")]
    BadHex,

    #[error("digest length {got} does not match algorithm width {want}")]
    BadLength { got: usize, want: usize },
}

impl From<BlobRefParseError> for IndexError {
    fn from(err: BlobRefParseError) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Ingest, err.to_string())
    }
}

///
/// HashAlg
///
/// Variant order matches the lexical order of the algorithm names, so the
/// derived `Ord` on `BlobRef` agrees with canonical-string order.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HashAlg {
    Sha224,
    Sha256,
}

impl HashAlg {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
        }
    }

    /// Digest width in bytes.
    #[must_use]
    pub const fn digest_bytes(self) -> usize {
        match self {
            Self::Sha224 => 28,
            Self::Sha256 => 32,
        }
    }

    fn from_name(name: &str) -> Result<Self, BlobRefParseError> {
        match name {
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            other => Err(BlobRefParseError::UnknownAlgorithm(other.to_string())),
        }
    }

    fn digest_of(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha224 => Sha224::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
        }
    }
}

impl Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// BlobRef
///
/// Content address of an immutable blob: hash algorithm plus digest.
/// Equality is byte equality; ordering matches the canonical string form.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlobRef {
    alg: HashAlg,
    digest: Box<[u8]>,
}

impl BlobRef {
    /// Hash `data` with `alg` and return its ref.
    #[must_use]
    pub fn hash_of(alg: HashAlg, data: &[u8]) -> Self {
        Self {
            alg,
            digest: alg.digest_of(data).into_boxed_slice(),
        }
    }

    /// Wrap a precomputed digest. `None` when the width does not match the
    /// algorithm.
    #[must_use]
    pub fn from_digest(alg: HashAlg, digest: Vec<u8>) -> Option<Self> {
        (digest.len() == alg.digest_bytes()).then(|| Self {
            alg,
            digest: digest.into_boxed_slice(),
        })
    }

    #[must_use]
    pub fn from_sha224(data: &[u8]) -> Self {
        Self::hash_of(HashAlg::Sha224, data)
    }

    #[must_use]
    pub fn from_sha256(data: &[u8]) -> Self {
        Self::hash_of(HashAlg::Sha256, data)
    }

    pub fn parse(s: &str) -> Result<Self, BlobRefParseError> {
        let (name, hex) = s.split_once('-').ok_or(BlobRefParseError::MissingSeparator)?;
        let alg = HashAlg::from_name(name)?;

        let want = alg.digest_bytes() * 2;
        if hex.len() != want {
            return Err(BlobRefParseError::BadLength {
                got: hex.len(),
                want,
            });
        }

        let digest = decode_hex(hex)?;
        Ok(Self {
            alg,
            digest: digest.into_boxed_slice(),
        })
    }

    /// Parse, returning `None` on any malformation. Schema walking treats
    /// unparseable refs as absent rather than fatal.
    #[must_use]
    pub fn parse_opt(s: &str) -> Option<Self> {
        Self::parse(s).ok()
    }

    /// Whether `data` hashes to this ref under its own algorithm.
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        self.alg.digest_of(data).as_slice() == self.digest.as_ref()
    }

    #[must_use]
    pub const fn algorithm(&self) -> HashAlg {
        self.alg
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.alg)?;
        for byte in self.digest.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for BlobRef {
    type Err = BlobRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn decode_hex(hex: &str) -> Result<Vec<u8>, BlobRefParseError> {
    if hex.len() % 2 != 0 {
        return Err(BlobRefParseError::BadHex);
    }

    let nibble = |c: u8| -> Result<u8, BlobRefParseError> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            // Canonical form is lowercase; uppercase digests are rejected so
            // that parse/display round-trips are byte-exact.
            b'a'..=b'f' => Ok(c - b'a' + 10),
            _ => Err(BlobRefParseError::BadHex),
        }
    };

    hex.as_bytes()
        .chunks(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

///
/// KeyIdError
///

#[derive(Debug, ThisError)]
pub enum KeyIdError {
    #[error("key id length {0} outside 8..=40")]
    BadLength(usize),

    #[error("key id is not uppercase hex")]
    BadHex,
}

impl From<KeyIdError> for IndexError {
    fn from(err: KeyIdError) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Claim, err.to_string())
    }
}

///
/// KeyId
///
/// Verified GPG key identifier: uppercase hex, 8 to 40 characters.
/// One key id may be presented under several signer blob hashes; the
/// corpus tracks the set per id.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, derive_more::Deref)]
pub struct KeyId(String);

impl KeyId {
    pub fn parse(s: &str) -> Result<Self, KeyIdError> {
        if !(8..=40).contains(&s.len()) {
            return Err(KeyIdError::BadLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase() && b <= b'F') {
            return Err(KeyIdError::BadHex);
        }
        Ok(Self(s.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for KeyId {
    type Err = KeyIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_round_trip() {
        let r = BlobRef::from_sha224(b"hello");
        let s = r.to_string();
        assert!(s.starts_with("sha224-"));
        assert_eq!(s.len(), "sha224-".len() + 56);
        assert_eq!(BlobRef::parse(&s).unwrap(), r);
    }

    #[test]
    fn matches_checks_content() {
        let r = BlobRef::from_sha256(b"content");
        assert!(r.matches(b"content"));
        assert!(!r.matches(b"tampered"));
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(BlobRef::parse("sha224").is_err());
        assert!(BlobRef::parse("md5-abcd").is_err());
        assert!(BlobRef::parse("sha224-zz").is_err());

        // Uppercase hex is non-canonical.
        let upper = BlobRef::from_sha224(b"x").to_string().to_uppercase();
        assert!(BlobRef::parse(&upper).is_err());
    }

    #[test]
    fn ord_matches_canonical_string_order() {
        let mut refs = vec![
            BlobRef::from_sha256(b"1"),
            BlobRef::from_sha224(b"2"),
            BlobRef::from_sha224(b"3"),
            BlobRef::from_sha256(b"4"),
        ];

        let mut by_string = refs.clone();
        by_string.sort_by_key(ToString::to_string);
        refs.sort();

        assert_eq!(refs, by_string);
    }

    #[test]
    fn key_id_validation() {
        assert!(KeyId::parse("2931A67C26F5ABDA").is_ok());
        assert!(KeyId::parse("abcd").is_err());
        assert!(KeyId::parse("lowercase00").is_err());
    }
}
