//! End-to-end scenarios over a fully wired index: ingest, out-of-order
//! arrival, deletion chains, edges, paths, schema versioning.

use crate::{
    blobref::BlobRef,
    contracts::Cancel,
    error::ErrorClass,
    index::{Index, IndexConfig, ReceiveOutcome},
    keys::{FileInfoRow, HaveRow, SCHEMA_VERSION, SchemaVersionRow},
    model::{CamliType, ClaimType, EdgeType},
    settings::IndexSettings,
    test_support::TestWorld,
};
use blobindex_kv::SortedKv;
use std::sync::Arc;

fn missing_row_keys(world: &TestWorld) -> Vec<String> {
    world
        .kv
        .find_prefix("missing|")
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect()
}

#[test]
fn opaque_blob_writes_meta_and_have() {
    let world = TestWorld::new();
    let (blob_ref, outcome) = world.ingest(b"some plain bytes");

    assert_eq!(outcome, ReceiveOutcome::Indexed);
    assert_eq!(
        world.kv.get(&format!("meta|{blob_ref}")).unwrap(),
        "16|"
    );
    assert_eq!(
        world.kv.get(&format!("have|{blob_ref}")).unwrap(),
        "16|indexed"
    );

    let meta = world.index.get_blob_meta(&blob_ref).unwrap();
    assert_eq!(meta.size, 16);
    assert_eq!(meta.camli_type, None);
    assert_eq!(world.index.have_blob(&blob_ref).unwrap(), Some((16, true)));
}

#[test]
fn permanode_records_its_type() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-1");

    let meta = world.index.get_blob_meta(&pn).unwrap();
    assert_eq!(meta.camli_type, Some(CamliType::Permanode));
}

#[test]
fn duplicate_ingest_is_a_no_op() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-1");
    world.claim(&pn, 1, ClaimType::SetAttribute, "tag", "x");

    let before = world.kv.snapshot();
    assert_eq!(world.ingest_stored(&pn), ReceiveOutcome::AlreadyIndexed);
    assert_eq!(world.kv.snapshot(), before);
}

#[test]
fn tag_editing_sequence_end_to_end() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-tags");

    world.claim(&pn, 0, ClaimType::SetAttribute, "tag", "foov");
    world.claim(&pn, 1, ClaimType::AddAttribute, "tag", "a");
    world.claim(&pn, 2, ClaimType::AddAttribute, "tag", "b");
    world.claim(&pn, 3, ClaimType::DelAttribute, "tag", "");
    world.claim(&pn, 4, ClaimType::AddAttribute, "tag", "c");
    world.claim(&pn, 5, ClaimType::AddAttribute, "tag", "d");
    world.claim(&pn, 6, ClaimType::AddAttribute, "tag", "e");
    world.claim(&pn, 7, ClaimType::DelAttribute, "tag", "d");

    let values = world
        .index
        .permanode_attr_values(&pn, "tag", None, None)
        .unwrap();
    assert_eq!(values, ["c", "e"]);

    let mid = world
        .index
        .permanode_attr_values(&pn, "tag", Some(TestWorld::date(2)), None)
        .unwrap();
    assert_eq!(mid, ["foov", "a", "b"]);
}

#[test]
fn set_after_add_replaces_end_to_end() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-set");

    world.claim(&pn, 0, ClaimType::AddAttribute, "x", "a");
    world.claim(&pn, 1, ClaimType::AddAttribute, "x", "b");
    world.claim(&pn, 2, ClaimType::SetAttribute, "x", "setv");

    let values = world
        .index
        .permanode_attr_values(&pn, "x", None, None)
        .unwrap();
    assert_eq!(values, ["setv"]);
}

#[test]
fn del_attribute_removes_duplicate_occurrences() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-dups");

    world.claim(&pn, 0, ClaimType::SetAttribute, "x", "dup");
    world.claim(&pn, 1, ClaimType::AddAttribute, "x", "keep");
    world.claim(&pn, 2, ClaimType::AddAttribute, "x", "dup");
    world.claim(&pn, 3, ClaimType::DelAttribute, "x", "dup");

    let values = world
        .index
        .permanode_attr_values(&pn, "x", None, None)
        .unwrap();
    assert_eq!(values, ["keep"]);
}

#[test]
fn delete_undelete_redelete() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-del");

    let d1 = world.delete_claim(&pn, 1);
    assert!(world.index.is_deleted(&pn));

    let d2 = world.delete_claim(&d1, 2);
    assert!(!world.index.is_deleted(&pn));

    world.delete_claim(&d2, 3);
    assert!(world.index.is_deleted(&pn));

    let (deleted, when) = world.index.deleted_at(&pn);
    assert!(deleted);
    assert_eq!(when, Some(TestWorld::date(1)));
}

#[test]
fn delete_of_unknown_target_parks() {
    let world = TestWorld::new();
    let ghost = BlobRef::from_sha224(b"never stored");

    let bytes = world.delete_claim_bytes(&ghost, 1);
    let claim_ref = world.store(&bytes);
    let outcome = world
        .index
        .receive_blob_bytes(&claim_ref, bytes)
        .unwrap();

    assert_eq!(
        outcome,
        ReceiveOutcome::Parked {
            missing: vec![ghost]
        }
    );
    assert!(!world.index.is_deleted(&claim_ref));
}

#[test]
fn out_of_order_file_chunks() {
    let world = TestWorld::new();

    let chunks: [&[u8]; 3] = [b"chunk one ", b"chunk two ", b"chunk three"];
    let chunk_refs: Vec<BlobRef> = chunks.iter().map(|c| BlobRef::from_sha224(c)).collect();

    let file_bytes = world.file_bytes(
        "song.txt",
        &chunk_refs
            .iter()
            .zip(chunks)
            .map(|(r, c)| (r, c.len() as u64))
            .collect::<Vec<_>>(),
    );
    let file_ref = world.store(&file_bytes);

    let outcome = world
        .index
        .receive_blob_bytes(&file_ref, file_bytes)
        .unwrap();
    match outcome {
        ReceiveOutcome::Parked { missing } => assert_eq!(missing.len(), 3),
        other => panic!("expected parked, got {other:?}"),
    }

    assert_eq!(missing_row_keys(&world).len(), 3);
    let have = world.kv.get(&HaveRow::key(&file_ref)).unwrap();
    assert!(!have.ends_with("|indexed"));

    // Chunks arrive; the synchronous dependency path re-drives the file.
    for chunk in chunks {
        world.ingest(chunk);
    }

    assert!(missing_row_keys(&world).is_empty());
    let have = world.kv.get(&HaveRow::key(&file_ref)).unwrap();
    assert!(have.ends_with("|indexed"));

    let whole = [chunks[0], chunks[1], chunks[2]].concat();
    let info = world.index.get_file_info(&file_ref).unwrap();
    assert_eq!(info.size, whole.len() as u64);
    assert_eq!(info.whole_ref, Some(BlobRef::from_sha224(&whole)));
    assert_eq!(
        world.index.existing_file_schemas(&BlobRef::from_sha224(&whole)).unwrap(),
        vec![file_ref]
    );
}

#[test]
fn out_of_order_resolution_on_worker_pool() {
    let world = TestWorld::with_config(IndexSettings::default(), false);

    let chunk: &[u8] = b"pooled chunk";
    let chunk_ref = BlobRef::from_sha224(chunk);
    let file_bytes = world.file_bytes("f.bin", &[(&chunk_ref, chunk.len() as u64)]);
    let file_ref = world.store(&file_bytes);

    let outcome = world
        .index
        .receive_blob_bytes(&file_ref, file_bytes)
        .unwrap();
    assert!(matches!(outcome, ReceiveOutcome::Parked { .. }));

    world.ingest(chunk);
    world.index.flush_reindex_queue();

    let have = world.kv.get(&HaveRow::key(&file_ref)).unwrap();
    assert!(have.ends_with("|indexed"));
}

#[test]
fn file_info_row_wire_format() {
    let world = TestWorld::new();

    let content: &[u8] = b"<html>hello camli world</html>\n";
    assert_eq!(content.len(), 31);
    let chunk_ref = world.store(content);
    world.ingest(content);

    let file_bytes = world.file_bytes("foo.html", &[(&chunk_ref, 31)]);
    let (file_ref, outcome) = world.ingest(&file_bytes);
    assert_eq!(outcome, ReceiveOutcome::Indexed);

    let whole_ref = BlobRef::from_sha224(content);
    let value = world.kv.get(&FileInfoRow::key(&file_ref)).unwrap();
    assert_eq!(value, format!("31|foo.html|text%2Fhtml|{whole_ref}"));

    let info = world.index.get_file_info(&file_ref).unwrap();
    assert_eq!(info.file_name, "foo.html");
    assert_eq!(info.mime_type, "text/html");
}

#[test]
fn file_times_from_explicit_mod_time() {
    let world = TestWorld::new();
    let content: &[u8] = b"dated content";
    let chunk_ref = world.store(content);
    world.ingest(content);

    let file_json = serde_json::to_vec_pretty(&serde_json::json!({
        "camliVersion": 1,
        "camliType": "file",
        "fileName": "dated.txt",
        "modTime": "2012-06-01T10:00:00Z",
        "parts": [{"blobRef": chunk_ref.to_string(), "size": 13}],
    }))
    .unwrap();
    let (file_ref, outcome) = world.ingest(&file_json);
    assert_eq!(outcome, ReceiveOutcome::Indexed);

    let times = world.index.get_file_times(&file_ref).unwrap();
    assert_eq!(
        times,
        vec![crate::keys::parse_rfc3339("2012-06-01T10:00:00Z").unwrap()]
    );

    let info = world.index.get_file_info(&file_ref).unwrap();
    assert_eq!(info.mod_time, times.first().copied());
    assert_eq!(info.creation_time, times.first().copied());
}

#[test]
fn edges_follow_member_claims_through_deletion() {
    let world = TestWorld::new();
    let a = world.permanode("pn-a");
    let b = world.permanode("pn-b");

    let add = world.claim(&a, 1, ClaimType::AddAttribute, "camliMember", &b.to_string());

    let edges = world.index.edges_to(&b, &Cancel::new()).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, a);
    assert_eq!(edges[0].from_type, EdgeType::Permanode);
    assert_eq!(edges[0].to, b);

    // Deleting the add-claim drops the edge; deleting the delete restores it.
    let del = world.delete_claim(&add, 2);
    assert!(world.index.edges_to(&b, &Cancel::new()).unwrap().is_empty());

    world.delete_claim(&del, 3);
    assert_eq!(world.index.edges_to(&b, &Cancel::new()).unwrap().len(), 1);
}

#[test]
fn directory_membership_rows_and_edges() {
    let world = TestWorld::new();

    let child: &[u8] = b"file contents";
    let chunk_ref = world.store(child);
    world.ingest(child);
    let (file_ref, _) = world.ingest(&world.file_bytes("leaf.txt", &[(&chunk_ref, 13)]));

    let set_bytes = world.static_set_bytes(&[&file_ref]);
    let set_ref = world.store(&set_bytes);
    let dir_bytes = world.directory_bytes("photos", &set_ref);

    // The static-set is a dependency of the directory.
    let dir_ref = world.store(&dir_bytes);
    let parked = world
        .index
        .receive_blob_bytes(&dir_ref, dir_bytes)
        .unwrap();
    assert_eq!(
        parked,
        ReceiveOutcome::Parked {
            missing: vec![set_ref.clone()]
        }
    );

    world.ingest_stored(&set_ref);

    let members = world
        .index
        .get_dir_members(&dir_ref, 100, &Cancel::new())
        .unwrap();
    assert_eq!(members, vec![file_ref.clone()]);

    let info = world.index.get_file_info(&dir_ref).unwrap();
    assert_eq!(info.size, 1);
    assert_eq!(info.file_name, "photos");

    let edges = world.index.edges_to(&file_ref, &Cancel::new()).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_type, EdgeType::Directory);
    assert_eq!(edges[0].from_name, "photos");
}

#[test]
fn recent_permanodes_newest_first_skipping_deleted() {
    let world = TestWorld::new();
    let p1 = world.permanode("pn-1");
    let p2 = world.permanode("pn-2");
    let p3 = world.permanode("pn-3");

    world.claim(&p1, 1, ClaimType::SetAttribute, "title", "one");
    world.claim(&p2, 2, ClaimType::SetAttribute, "title", "two");
    world.claim(&p3, 3, ClaimType::SetAttribute, "title", "three");
    world.delete_claim(&p2, 4);

    let recent = world
        .index
        .enumerate_recent_permanodes(&world.key_id, None, 10, &Cancel::new())
        .unwrap();
    let refs: Vec<&BlobRef> = recent.iter().map(|r| &r.permanode).collect();
    assert_eq!(refs, vec![&p3, &p1]);

    let limited = world
        .index
        .enumerate_recent_permanodes(&world.key_id, None, 1, &Cancel::new())
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].permanode, p3);

    let before = world
        .index
        .enumerate_recent_permanodes(&world.key_id, Some(TestWorld::date(1)), 10, &Cancel::new())
        .unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].permanode, p1);
}

#[test]
fn recent_permanodes_fall_back_when_newest_claim_is_deleted() {
    // Deleting the newest claim (a claim blob, not the permanode) must not
    // hide the permanode; it falls back to its older surviving claim. Both
    // read paths must give the same list.
    let run = |world: TestWorld| {
        let p1 = world.permanode("pn-fallback");
        let p2 = world.permanode("pn-other");

        world.claim(&p1, 1, ClaimType::SetAttribute, "title", "first");
        world.claim(&p2, 2, ClaimType::SetAttribute, "title", "other");
        let newest = world.claim(&p1, 4, ClaimType::SetAttribute, "title", "newest");
        world.delete_claim(&newest, 5);

        let recent = world
            .index
            .enumerate_recent_permanodes(&world.key_id, None, 10, &Cancel::new())
            .unwrap();
        (recent, p1, p2)
    };

    let (kv_list, p1, p2) = run(TestWorld::new());
    let (corpus_list, ..) = run(TestWorld::with_corpus());

    assert_eq!(kv_list, corpus_list);

    let got: Vec<_> = kv_list
        .iter()
        .map(|r| (&r.permanode, r.last_modified))
        .collect();
    assert_eq!(
        got,
        vec![
            (&p2, TestWorld::date(2)),
            (&p1, TestWorld::date(1)),
        ]
    );
}

#[test]
fn permanode_of_signer_attr_value_respects_deletion() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-root");

    let claim = world.claim(&pn, 1, ClaimType::SetAttribute, "camliRoot", "myroot");
    assert_eq!(
        world
            .index
            .permanode_of_signer_attr_value(&world.key_id, "camliRoot", "myroot")
            .unwrap(),
        Some(pn.clone())
    );

    world.delete_claim(&claim, 2);
    assert_eq!(
        world
            .index
            .permanode_of_signer_attr_value(&world.key_id, "camliRoot", "myroot")
            .unwrap(),
        None
    );
}

#[test]
fn unindexed_attrs_are_not_signer_attr_value_rows() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-x");
    world.claim(&pn, 1, ClaimType::SetAttribute, "camliContent", "whatever");

    let rows: Vec<String> = world
        .kv
        .find_prefix("signerattrvalue|")
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert!(rows.is_empty());
}

#[test]
fn path_claims_lookup_and_retraction() {
    let world = TestWorld::new();
    let base = world.permanode("pn-base");
    let target = world.permanode("pn-target");

    world.claim(
        &base,
        1,
        ClaimType::SetAttribute,
        "camliPath:docs/readme",
        &target.to_string(),
    );

    let found = world
        .index
        .path_lookup(&world.key_id, &base, "docs/readme", None)
        .unwrap()
        .expect("live path");
    assert_eq!(found.target, target);
    assert!(found.active);

    let paths = world
        .index
        .paths_of_signer_target(&world.key_id, &target)
        .unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].suffix, "docs/readme");

    // Retract it; lookups before the retraction still see it.
    world.claim(
        &base,
        5,
        ClaimType::DelAttribute,
        "camliPath:docs/readme",
        &target.to_string(),
    );

    assert!(
        world
            .index
            .path_lookup(&world.key_id, &base, "docs/readme", None)
            .unwrap()
            .is_none()
    );
    assert!(
        world
            .index
            .path_lookup(&world.key_id, &base, "docs/readme", Some(TestWorld::date(3)))
            .unwrap()
            .is_some()
    );
    assert!(
        world
            .index
            .paths_of_signer_target(&world.key_id, &target)
            .unwrap()
            .is_empty()
    );
}

#[test]
fn claim_with_unknown_signer_parks_until_key_arrives() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-1");

    let other_key = crate::test_support::fixture_key_blob("AAAA1111BBBB2222");
    let other_signer = BlobRef::from_sha224(&other_key);

    let claim_json = serde_json::to_vec_pretty(&serde_json::json!({
        "camliVersion": 1,
        "camliType": "claim",
        "camliSigner": other_signer.to_string(),
        "claimDate": crate::keys::format_rfc3339(TestWorld::date(1)),
        "claimType": "set-attribute",
        "attribute": "tag",
        "value": "theirs",
        "permanode": pn.to_string(),
    }))
    .unwrap();

    let claim_ref = world.store(&claim_json);
    let outcome = world
        .index
        .receive_blob_bytes(&claim_ref, claim_json)
        .unwrap();
    assert_eq!(
        outcome,
        ReceiveOutcome::Parked {
            missing: vec![other_signer.clone()]
        }
    );

    // No claim rows may exist while the signature is unverified.
    assert!(
        world
            .index
            .permanode_attr_values(&pn, "tag", None, None)
            .unwrap()
            .is_empty()
    );

    // The key blob arrives; the parked claim completes.
    world.ingest(&other_key);
    assert_eq!(
        world
            .index
            .permanode_attr_values(&pn, "tag", None, None)
            .unwrap(),
        ["theirs"]
    );
    assert_eq!(
        world.index.key_id_of_signer(&other_signer).unwrap().as_str(),
        "AAAA1111BBBB2222"
    );
}

#[test]
fn bad_signature_is_fatal_for_the_blob() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-1");
    world.verifier.reject_signer(world.signer.clone());

    let bytes = world.claim_bytes(&pn, 1, ClaimType::SetAttribute, "tag", "x");
    let claim_ref = world.store(&bytes);
    let err = world
        .index
        .receive_blob_bytes(&claim_ref, bytes)
        .unwrap_err();
    assert_eq!(err.class, ErrorClass::BadSignature);
}

#[test]
fn corrupt_content_is_rejected() {
    let world = TestWorld::new();
    let wrong_ref = BlobRef::from_sha224(b"expected content");
    let err = world
        .index
        .receive_blob_bytes(&wrong_ref, b"different content".to_vec())
        .unwrap_err();
    assert_eq!(err.class, ErrorClass::Corruption);
}

#[test]
fn parked_ingest_is_idempotent() {
    let world = TestWorld::new();
    let ghost = BlobRef::from_sha224(b"ghost chunk");
    let file_bytes = world.file_bytes("f.txt", &[(&ghost, 11)]);
    let file_ref = world.store(&file_bytes);

    world
        .index
        .receive_blob_bytes(&file_ref, file_bytes.clone())
        .unwrap();
    let before = world.kv.snapshot();

    world
        .index
        .receive_blob_bytes(&file_ref, file_bytes)
        .unwrap();
    assert_eq!(world.kv.snapshot(), before);
}

#[test]
fn ingest_order_does_not_change_final_rows() {
    // One chunk, a file over it, a permanode, and a claim pointing the
    // permanode at the file: every arrival order converges.
    let build = |order: &[usize]| {
        let world = TestWorld::new();

        let chunk: &[u8] = b"shared chunk bytes";
        let chunk_ref = BlobRef::from_sha224(chunk);
        let file_bytes = world.file_bytes("f.dat", &[(&chunk_ref, chunk.len() as u64)]);
        let file_ref = BlobRef::from_sha224(&file_bytes);
        let pn_bytes = world.permanode_bytes("pn-closure");
        let pn_ref = BlobRef::from_sha224(&pn_bytes);
        let claim_bytes = world.claim_bytes(
            &pn_ref,
            1,
            ClaimType::SetAttribute,
            "camliContent",
            &file_ref.to_string(),
        );

        let blobs: Vec<(BlobRef, Vec<u8>)> = vec![
            (chunk_ref, chunk.to_vec()),
            (file_ref, file_bytes),
            (pn_ref, pn_bytes),
            (BlobRef::from_sha224(&claim_bytes), claim_bytes),
        ];

        for &i in order {
            let (blob_ref, bytes) = &blobs[i];
            world.store(bytes);
            world
                .index
                .receive_blob_bytes(blob_ref, bytes.clone())
                .unwrap();
        }
        world.kv.snapshot()
    };

    let forward = build(&[0, 1, 2, 3]);
    let backward = build(&[3, 2, 1, 0]);
    let shuffled = build(&[1, 3, 0, 2]);

    assert_eq!(forward, backward);
    assert_eq!(forward, shuffled);
    assert!(forward.keys().all(|k| !k.starts_with("missing|")));
}

#[test]
fn schema_version_gates_open() {
    let world = TestWorld::new();
    let pn = world.permanode("pn-1");

    // Tear down the first index so the KV is free.
    let TestWorld {
        kv, source, verifier, index, ..
    } = world;
    drop(index);

    kv.set(SchemaVersionRow::KEY, "999").unwrap();

    let settings = || IndexSettings {
        disable_ooo_pool: true,
        ..IndexSettings::default()
    };

    let reopen = Index::open(
        Arc::clone(&kv) as Arc<dyn SortedKv>,
        Arc::clone(&source) as Arc<dyn crate::contracts::BlobSource>,
        Arc::clone(&verifier) as Arc<dyn crate::contracts::SignatureVerifier>,
        IndexConfig {
            settings: settings(),
            ..IndexConfig::default()
        },
    );
    let Err(err) = reopen else {
        panic!("expected a schema version refusal");
    };
    assert_eq!(err.class, ErrorClass::SchemaVersion);

    // With an explicit reindex grant the KV is wiped and rebuilt from the
    // blob source.
    let index = Index::open(
        Arc::clone(&kv) as Arc<dyn SortedKv>,
        Arc::clone(&source) as Arc<dyn crate::contracts::BlobSource>,
        Arc::clone(&verifier) as Arc<dyn crate::contracts::SignatureVerifier>,
        IndexConfig {
            settings: settings(),
            allow_reindex: true,
            ..IndexConfig::default()
        },
    )
    .unwrap();

    assert_eq!(
        kv.get(SchemaVersionRow::KEY).unwrap(),
        SCHEMA_VERSION.to_string()
    );
    let meta = index.get_blob_meta(&pn).unwrap();
    assert_eq!(meta.camli_type, Some(CamliType::Permanode));
}

#[test]
fn canceled_enumeration_stops() {
    let world = TestWorld::new();
    world.permanode("pn-1");

    let cancel = Cancel::new();
    cancel.cancel();
    let err = world
        .index
        .enumerate_recent_permanodes(&world.key_id, None, 10, &cancel)
        .unwrap_err();
    assert!(err.is_canceled());
}

#[test]
fn concurrent_receive_of_same_blob_is_single_flight() {
    let world = TestWorld::new();
    let bytes = b"contended blob".to_vec();
    let blob_ref = world.store(&bytes);

    let index = Arc::clone(&world.index);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                let bytes = bytes.clone();
                let blob_ref = blob_ref.clone();
                scope.spawn(move || index.receive_blob_bytes(&blob_ref, bytes).unwrap())
            })
            .collect();

        let outcomes: Vec<ReceiveOutcome> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Exactly one caller does the work; the rest hit the fast path.
        let indexed = outcomes
            .iter()
            .filter(|o| **o == ReceiveOutcome::Indexed)
            .count();
        assert_eq!(indexed, 1);
    });

    assert_eq!(world.index.have_blob(&blob_ref).unwrap(), Some((14, true)));
}
