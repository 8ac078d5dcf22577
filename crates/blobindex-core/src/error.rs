use crate::blobref::BlobRef;
use std::fmt;
use thiserror::Error as ThisError;

///
/// IndexError
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct IndexError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
    /// Populated only for `MissingDependency`: the refs the blob being
    /// indexed needs before indexing can complete.
    pub missing: Vec<BlobRef>,
}

impl IndexError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            missing: Vec::new(),
        }
    }

    pub fn not_found(origin: ErrorOrigin, what: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, origin, what)
    }

    pub fn corruption(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, origin, message)
    }

    #[must_use]
    pub fn missing_dependency(origin: ErrorOrigin, missing: Vec<BlobRef>) -> Self {
        let message = match missing.as_slice() {
            [one] => format!("missing dependency: {one}"),
            many => format!("missing {} dependencies", many.len()),
        };
        Self {
            class: ErrorClass::MissingDependency,
            origin,
            message,
            missing,
        }
    }

    #[must_use]
    pub fn canceled(origin: ErrorOrigin) -> Self {
        Self::new(ErrorClass::Canceled, origin, "operation canceled")
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_missing_dependency(&self) -> bool {
        matches!(self.class, ErrorClass::MissingDependency)
    }

    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self.class, ErrorClass::Canceled)
    }

    /// The refs that must arrive before the failed blob can index.
    /// Empty unless `is_missing_dependency`.
    #[must_use]
    pub fn missing_refs(&self) -> &[BlobRef] {
        &self.missing
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Corruption,
    MissingDependency,
    BadSignature,
    SchemaVersion,
    Transient,
    Canceled,
    Unsupported,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Corruption => "corruption",
            Self::MissingDependency => "missing_dependency",
            Self::BadSignature => "bad_signature",
            Self::SchemaVersion => "schema_version",
            Self::Transient => "transient",
            Self::Canceled => "canceled",
            Self::Unsupported => "unsupported",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Kv,
    Sniffer,
    Ingest,
    Claim,
    File,
    Verify,
    Fetch,
    Query,
    Corpus,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Kv => "kv",
            Self::Sniffer => "sniffer",
            Self::Ingest => "ingest",
            Self::Claim => "claim",
            Self::File => "file",
            Self::Verify => "verify",
            Self::Fetch => "fetch",
            Self::Query => "query",
            Self::Corpus => "corpus",
        };
        write!(f, "{label}")
    }
}

impl From<blobindex_kv::KvError> for IndexError {
    fn from(err: blobindex_kv::KvError) -> Self {
        let class = if err.is_not_found() {
            ErrorClass::NotFound
        } else {
            ErrorClass::Internal
        };
        Self::new(class, ErrorOrigin::Kv, err.to_string())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobref::BlobRef;

    #[test]
    fn missing_dependency_carries_refs() {
        let r = BlobRef::from_sha256(b"x");
        let err = IndexError::missing_dependency(ErrorOrigin::Ingest, vec![r.clone()]);
        assert!(err.is_missing_dependency());
        assert_eq!(err.missing_refs(), &[r]);
    }

    #[test]
    fn kv_not_found_maps_to_not_found_class() {
        let err: IndexError = blobindex_kv::KvError::NotFound.into();
        assert!(err.is_not_found());
        assert_eq!(err.display_with_class(), "kv:not_found: key not found");
    }
}
