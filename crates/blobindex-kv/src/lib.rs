//! Sorted key/value contract consumed by the blob indexer, plus the
//! in-memory engine used for tests and small deployments.
//!
//! Keys and values are UTF-8 strings; iteration order is byte-lexicographic.
//! Engines are the single writer authority: every index mutation goes through
//! [`Batch`] / [`SortedKv::commit_batch`], which is atomic with respect to
//! concurrent readers.

mod mem;

pub use mem::MemKv;

use thiserror::Error as ThisError;

///
/// KvError
///
/// NotFound is a distinct condition, never folded into engine failures:
/// callers branch on it for missing-dependency handling.
///

#[derive(Debug, ThisError)]
pub enum KvError {
    #[error("key not found")]
    NotFound,

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("storage engine failure: {0}")]
    Engine(String),
}

impl KvError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// One key/value row yielded by iteration.
pub type KvPair = (String, String);

///
/// Mutation
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    Set { key: String, value: String },
    Delete { key: String },
}

impl Mutation {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key } => key,
        }
    }
}

///
/// Batch
///
/// Ordered mutation list. Application order is declaration order, so a
/// later mutation on the same key wins.
///

#[derive(Clone, Debug, Default)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mutations: Vec::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.mutations.push(Mutation::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.mutations.push(Mutation::Delete { key: key.into() });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Borrow the ordered mutation list.
    #[must_use]
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Consume into the ordered mutation list.
    #[must_use]
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }
}

/// Iterator over `[start, end)` in byte-lex order.
pub type KvIter = Box<dyn Iterator<Item = KvResult<KvPair>> + Send>;

///
/// SortedKv
///
/// Minimal surface the indexer consumes: point reads/writes, half-open
/// range iteration, atomic batch commit, and an optional full wipe for
/// rebuilds.
///

pub trait SortedKv: Send + Sync {
    /// Point lookup. Missing keys are `KvError::NotFound`.
    fn get(&self, key: &str) -> KvResult<String>;

    fn set(&self, key: &str, value: &str) -> KvResult<()>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> KvResult<()>;

    /// Iterate keys in `[start, end)` in byte-lex order.
    fn find(&self, start: &str, end: &str) -> KvResult<KvIter>;

    /// Apply every mutation in one atomic step w.r.t. concurrent readers.
    fn commit_batch(&self, batch: Batch) -> KvResult<()>;

    /// Drop every row. Engines that cannot rebuild may refuse.
    fn wipe(&self) -> KvResult<()>;

    /// Start an empty batch. Engine-neutral; provided for call-site symmetry
    /// with `commit_batch`.
    fn begin_batch(&self) -> Batch {
        Batch::new()
    }

    /// Iterate every row whose key starts with `prefix`.
    fn find_prefix(&self, prefix: &str) -> KvResult<KvIter> {
        let end = prefix_end(prefix)?;
        self.find(prefix, &end)
    }
}

/// Exclusive upper bound for a prefix scan: the prefix with its final byte
/// incremented. Prefixes ending in `0xff` have no such bound and are
/// rejected; the key schema never produces them.
pub fn prefix_end(prefix: &str) -> KvResult<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    match bytes.last_mut() {
        None => Err(KvError::InvalidRange("empty prefix".to_string())),
        Some(last) if *last == 0xff => Err(KvError::InvalidRange(format!(
            "prefix ends in 0xff: {prefix:?}"
        ))),
        Some(last) => {
            *last += 1;
            // Incrementing one byte of valid UTF-8 yields valid UTF-8 unless
            // the byte was a continuation-sequence member; key prefixes are
            // ASCII so the unwrap never fires in practice.
            String::from_utf8(bytes)
                .map_err(|_| KvError::InvalidRange(format!("prefix not ASCII-safe: {prefix:?}")))
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_end_increments_final_byte() {
        assert_eq!(prefix_end("claim|").unwrap(), "claim}");
        assert_eq!(prefix_end("a").unwrap(), "b");
    }

    #[test]
    fn prefix_end_rejects_empty() {
        assert!(prefix_end("").is_err());
    }

    #[test]
    fn prefix_end_rejects_non_ascii_increment() {
        // 0x7f + 1 = 0x80, which is not a valid UTF-8 lead byte.
        assert!(prefix_end("\u{7f}").is_err());
    }

    #[test]
    fn batch_preserves_declaration_order() {
        let mut batch = Batch::new();
        batch.set("k", "1");
        batch.delete("k");
        batch.set("k", "2");

        let muts = batch.into_mutations();
        assert_eq!(muts.len(), 3);
        assert_eq!(
            muts[2],
            Mutation::Set {
                key: "k".to_string(),
                value: "2".to_string()
            }
        );
    }
}
