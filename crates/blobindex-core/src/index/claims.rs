//! Module: index::claims
//! Responsibility: turn one verified claim blob into its row mutations.
//! Does not own: signature verification (injected), batch commit, or the
//! delete cache (deletes are handed back for post-commit merge).

use crate::{
    blobref::BlobRef,
    contracts::{Fetcher, SignatureVerifier},
    error::{ErrorClass, ErrorOrigin, IndexError},
    index::PendingDelete,
    keys::{
        ClaimRow, DeletedRow, EdgeBackRow, MetaRow, PathRow, RecpnRow, SignerAttrValueRow,
        SignerKeyIdRow, SignerTargetPathRow, is_blobref_attr, is_indexed_attr, path_claim_suffix,
    },
    model::{CamliType, ClaimType, EdgeType},
    schema::SniffedBlob,
};
use blobindex_kv::{Batch, SortedKv};

fn bad_claim(message: impl Into<String>) -> IndexError {
    IndexError::new(ErrorClass::Corruption, ErrorOrigin::Claim, message)
}

/// Emit every row for a claim blob.
///
/// Verification runs first; a missing signer public key surfaces as a
/// missing-dependency error so the claim parks in the tracker instead of
/// being rejected. Delete claims additionally require the target's `meta`
/// row to already exist.
pub(in crate::index) fn claim_mutations(
    sniffed: &SniffedBlob,
    verifier: &dyn SignatureVerifier,
    fetcher: &dyn Fetcher,
    kv: &dyn SortedKv,
    batch: &mut Batch,
    deletes: &mut Vec<PendingDelete>,
) -> Result<(), IndexError> {
    let superset = sniffed
        .schema
        .as_ref()
        .ok_or_else(|| bad_claim("claim dispatch on non-schema blob"))?;

    let verified = verifier.verify(&sniffed.bytes, fetcher)?;

    let date = superset
        .claim_date_parsed()
        .ok_or_else(|| bad_claim(format!("claim {} has no claimDate", sniffed.blob_ref)))?;
    let claim_type = superset
        .claim_type_parsed()
        .ok_or_else(|| bad_claim(format!("claim {} has no claimType", sniffed.blob_ref)))?;

    batch.set(
        SignerKeyIdRow::key(&verified.signer),
        SignerKeyIdRow::value(&verified.key_id),
    );

    let claim_ref = &sniffed.blob_ref;

    if claim_type == ClaimType::Delete {
        let target = superset
            .target_ref()
            .ok_or_else(|| bad_claim(format!("delete claim {claim_ref} has no target")))?;

        // The target must be indexed first so we know what is being
        // deleted; otherwise this claim waits for it.
        let target_meta = match kv.get(&MetaRow::key(&target)) {
            Ok(value) => value,
            Err(err) if err.is_not_found() => {
                return Err(IndexError::missing_dependency(
                    ErrorOrigin::Claim,
                    vec![target],
                ));
            }
            Err(err) => return Err(err.into()),
        };

        batch.set(DeletedRow::key(&target, date, claim_ref), "");

        // Deleting a permanode is itself a modification of it, so the
        // deletion participates in recency ordering.
        let target_type = target_meta
            .split_once('|')
            .and_then(|(_, mime)| CamliType::from_meta_mime(mime));
        if target_type == Some(CamliType::Permanode) {
            batch.set(
                RecpnRow::key(&verified.key_id, date, claim_ref),
                target.to_string(),
            );
            batch.set(
                ClaimRow::key(&target, &verified.key_id, date, claim_ref),
                ClaimRow::value(ClaimType::Delete, "", "", &verified.signer),
            );
        }

        deletes.push(PendingDelete {
            target,
            deleter: claim_ref.clone(),
            when: date,
        });

        return Ok(());
    }

    let permanode = superset
        .permanode_ref()
        .ok_or_else(|| bad_claim(format!("claim {claim_ref} has no permanode")))?;
    let attr = superset.attribute.as_str();
    let value = superset.value.as_str();

    batch.set(
        RecpnRow::key(&verified.key_id, date, claim_ref),
        permanode.to_string(),
    );
    batch.set(
        ClaimRow::key(&permanode, &verified.key_id, date, claim_ref),
        ClaimRow::value(claim_type, attr, value, &verified.signer),
    );

    if is_indexed_attr(attr) && claim_type != ClaimType::DelAttribute {
        batch.set(
            SignerAttrValueRow::key(&verified.key_id, attr, value, date, claim_ref),
            permanode.to_string(),
        );
    }

    if let Some(suffix) = path_claim_suffix(attr)
        && let Some(target) = BlobRef::parse_opt(value)
    {
        let active = claim_type != ClaimType::DelAttribute;
        batch.set(
            SignerTargetPathRow::key(&verified.key_id, &target, claim_ref),
            SignerTargetPathRow::value(date, &permanode, active, suffix),
        );
        batch.set(
            PathRow::key(&verified.key_id, &permanode, suffix, date, claim_ref),
            PathRow::value(active, &target),
        );
    }

    if is_blobref_attr(attr)
        && matches!(claim_type, ClaimType::SetAttribute | ClaimType::AddAttribute)
        && let Some(target) = BlobRef::parse_opt(value)
    {
        batch.set(
            EdgeBackRow::key(&target, &permanode, claim_ref),
            EdgeBackRow::value(EdgeType::Permanode, ""),
        );
    }

    Ok(())
}
