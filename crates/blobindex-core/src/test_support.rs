//! Shared test fixtures: an in-memory blob source, a fixture signature
//! verifier, and builders for signed schema blobs.

use crate::{
    blobref::{BlobRef, KeyId},
    contracts::{
        BlobSource, FetchError, Fetcher, SignatureVerifier, VerifiedSignature, VerifyError,
    },
    index::{Index, IndexConfig, ReceiveOutcome},
    model::ClaimType,
    schema::Superset,
    settings::IndexSettings,
};
use blobindex_kv::MemKv;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Arc;

/// Key id used by the default fixture signer.
pub(crate) const FIXTURE_KEY_ID: &str = "2931A67C26F5ABDA";

///
/// MemorySource
///
/// Blob store fixture: refs to bytes, enumerable in canonical order.
///

#[derive(Default)]
pub(crate) struct MemorySource {
    blobs: RwLock<BTreeMap<BlobRef, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store bytes under their sha224 ref.
    pub fn add(&self, bytes: &[u8]) -> BlobRef {
        let blob_ref = BlobRef::from_sha224(bytes);
        self.blobs.write().insert(blob_ref.clone(), bytes.to_vec());
        blob_ref
    }
}

impl Fetcher for MemorySource {
    fn fetch(&self, blob_ref: &BlobRef) -> Result<(Box<dyn Read + Send>, u64), FetchError> {
        let blobs = self.blobs.read();
        let bytes = blobs.get(blob_ref).ok_or(FetchError::NotFound)?.clone();
        let size = bytes.len() as u64;
        Ok((Box::new(Cursor::new(bytes)), size))
    }
}

impl BlobSource for MemorySource {
    fn enumerate(
        &self,
        start: Option<&BlobRef>,
        f: &mut dyn FnMut(&BlobRef) -> bool,
    ) -> Result<(), FetchError> {
        let refs: Vec<BlobRef> = self.blobs.read().keys().cloned().collect();
        for blob_ref in refs {
            if let Some(start) = start
                && blob_ref < *start
            {
                continue;
            }
            if !f(&blob_ref) {
                break;
            }
        }
        Ok(())
    }
}

///
/// FixtureVerifier
///
/// Resolves the claimed signer blob through the fetcher and reads the key
/// id out of the fixture key blob, mirroring the real verifier's contract:
/// an absent key blob is a missing dependency, not a bad signature.
///

#[derive(Default)]
pub(crate) struct FixtureVerifier {
    reject: RwLock<HashSet<BlobRef>>,
}

impl FixtureVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every blob signed by `signer` fail verification.
    pub fn reject_signer(&self, signer: BlobRef) {
        self.reject.write().insert(signer);
    }
}

impl SignatureVerifier for FixtureVerifier {
    fn verify(
        &self,
        schema_json: &[u8],
        signer_blobs: &dyn Fetcher,
    ) -> Result<VerifiedSignature, VerifyError> {
        let superset = Superset::decode(schema_json)
            .map_err(|err| VerifyError::BadSignature(err.to_string()))?;
        let signer = superset
            .signer_ref()
            .ok_or_else(|| VerifyError::BadSignature("no camliSigner".to_string()))?;

        if self.reject.read().contains(&signer) {
            return Err(VerifyError::BadSignature("fixture rejection".to_string()));
        }

        let key_bytes = match signer_blobs.fetch_bytes(&signer) {
            Ok(bytes) => bytes,
            Err(FetchError::NotFound) => return Err(VerifyError::MissingKeyBlob(signer)),
            Err(err) => return Err(VerifyError::Transport(err.to_string())),
        };

        let text = String::from_utf8_lossy(&key_bytes);
        let key_id = text
            .lines()
            .find_map(|line| line.strip_prefix("keyId: "))
            .and_then(|id| KeyId::parse(id).ok())
            .ok_or_else(|| VerifyError::BadSignature("signer blob has no key id".to_string()))?;

        Ok(VerifiedSignature { key_id, signer })
    }
}

pub(crate) fn fixture_key_blob(key_id: &str) -> Vec<u8> {
    format!("-----BEGIN FIXTURE KEY-----\nkeyId: {key_id}\n-----END FIXTURE KEY-----\n")
        .into_bytes()
}

///
/// TestWorld
///
/// A fully wired index over MemKv with one registered signer. The
/// out-of-order pool is disabled by default so dependency resolution runs
/// synchronously and deterministically.
///

pub(crate) struct TestWorld {
    pub kv: Arc<MemKv>,
    pub source: Arc<MemorySource>,
    pub verifier: Arc<FixtureVerifier>,
    pub index: Arc<Index>,
    pub key_id: KeyId,
    pub signer: BlobRef,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_config(
            IndexSettings {
                disable_ooo_pool: true,
                ..IndexSettings::default()
            },
            false,
        )
    }

    pub fn with_corpus() -> Self {
        Self::with_config(
            IndexSettings {
                disable_ooo_pool: true,
                ..IndexSettings::default()
            },
            true,
        )
    }

    pub fn with_config(settings: IndexSettings, enable_corpus: bool) -> Self {
        let kv = Arc::new(MemKv::new());
        let source = Arc::new(MemorySource::new());
        let verifier = Arc::new(FixtureVerifier::new());

        let signer = source.add(&fixture_key_blob(FIXTURE_KEY_ID));
        let key_id = KeyId::parse(FIXTURE_KEY_ID).unwrap();

        let index = Index::open(
            Arc::clone(&kv) as Arc<dyn blobindex_kv::SortedKv>,
            Arc::clone(&source) as Arc<dyn BlobSource>,
            Arc::clone(&verifier) as Arc<dyn SignatureVerifier>,
            IndexConfig {
                settings,
                enable_corpus,
                ..IndexConfig::default()
            },
        )
        .expect("opening index");

        Self {
            kv,
            source,
            verifier,
            index,
            key_id,
            signer,
        }
    }

    pub fn date(n: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_322_357_025 + n, 0).unwrap()
    }

    /// Store bytes in the source without indexing them.
    pub fn store(&self, bytes: &[u8]) -> BlobRef {
        self.source.add(bytes)
    }

    /// Store and ingest bytes.
    pub fn ingest(&self, bytes: &[u8]) -> (BlobRef, ReceiveOutcome) {
        let blob_ref = self.source.add(bytes);
        let outcome = self
            .index
            .receive_blob_bytes(&blob_ref, bytes.to_vec())
            .expect("receive");
        (blob_ref, outcome)
    }

    /// Ingest a blob already present in the source.
    pub fn ingest_stored(&self, blob_ref: &BlobRef) -> ReceiveOutcome {
        let bytes = self.source.fetch_bytes(blob_ref).expect("stored blob");
        self.index
            .receive_blob_bytes(blob_ref, bytes)
            .expect("receive")
    }

    pub fn permanode_bytes(&self, seed: &str) -> Vec<u8> {
        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "permanode",
            "camliSigner": self.signer.to_string(),
            "random": seed,
        }))
        .unwrap()
    }

    /// Create and ingest a permanode.
    pub fn permanode(&self, seed: &str) -> BlobRef {
        let (blob_ref, outcome) = self.ingest(&self.permanode_bytes(seed));
        assert_eq!(outcome, ReceiveOutcome::Indexed);
        blob_ref
    }

    pub fn claim_bytes(
        &self,
        permanode: &BlobRef,
        n: i64,
        claim_type: ClaimType,
        attr: &str,
        value: &str,
    ) -> Vec<u8> {
        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "claim",
            "camliSigner": self.signer.to_string(),
            "claimDate": crate::keys::format_rfc3339(Self::date(n)),
            "claimType": claim_type.as_str(),
            "attribute": attr,
            "value": value,
            "permanode": permanode.to_string(),
        }))
        .unwrap()
    }

    /// Create and ingest an attribute claim dated `date(n)`.
    pub fn claim(
        &self,
        permanode: &BlobRef,
        n: i64,
        claim_type: ClaimType,
        attr: &str,
        value: &str,
    ) -> BlobRef {
        let (blob_ref, outcome) =
            self.ingest(&self.claim_bytes(permanode, n, claim_type, attr, value));
        assert_eq!(outcome, ReceiveOutcome::Indexed);
        blob_ref
    }

    pub fn delete_claim_bytes(&self, target: &BlobRef, n: i64) -> Vec<u8> {
        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "claim",
            "camliSigner": self.signer.to_string(),
            "claimDate": crate::keys::format_rfc3339(Self::date(n)),
            "claimType": "delete",
            "target": target.to_string(),
        }))
        .unwrap()
    }

    /// Create and ingest a delete claim dated `date(n)`.
    pub fn delete_claim(&self, target: &BlobRef, n: i64) -> BlobRef {
        let (blob_ref, outcome) = self.ingest(&self.delete_claim_bytes(target, n));
        assert_eq!(outcome, ReceiveOutcome::Indexed);
        blob_ref
    }

    /// A file schema referencing chunks that may or may not be stored yet.
    pub fn file_bytes(&self, file_name: &str, chunks: &[(&BlobRef, u64)]) -> Vec<u8> {
        let parts: Vec<_> = chunks
            .iter()
            .map(|(blob_ref, size)| json!({"blobRef": blob_ref.to_string(), "size": size}))
            .collect();

        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "file",
            "fileName": file_name,
            "parts": parts,
        }))
        .unwrap()
    }

    pub fn static_set_bytes(&self, members: &[&BlobRef]) -> Vec<u8> {
        let members: Vec<String> = members.iter().map(ToString::to_string).collect();
        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "static-set",
            "members": members,
        }))
        .unwrap()
    }

    pub fn directory_bytes(&self, file_name: &str, entries: &BlobRef) -> Vec<u8> {
        serde_json::to_vec_pretty(&json!({
            "camliVersion": 1,
            "camliType": "directory",
            "fileName": file_name,
            "entries": entries.to_string(),
        }))
        .unwrap()
    }
}
