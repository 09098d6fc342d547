//! End-to-end triage scenarios against the public API.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crashtriage_core::codec::key_value;
use crashtriage_core::error::{ProviderError, TaskError};
use crashtriage_core::pipeline::{process_batch, BatchContext};
use crashtriage_core::providers::{ProviderRegistry, RepositoryProvider};
use crashtriage_core::signature::CompiledSignature;
use crashtriage_core::storage::{
    Bucket, Client, Collection, CrashEntry, InMemoryStore, Os, Platform, Product, RecordStore,
    Repository,
};
use crashtriage_core::tasks::{check_revision_update, SyncOutcome};

/// Repository double that never knows a revision and records calls.
#[derive(Default)]
struct StaleMirror {
    tested: AtomicUsize,
    updated: AtomicUsize,
}

impl RepositoryProvider for StaleMirror {
    fn test_revision(&self, _revision: &str) -> Result<bool, ProviderError> {
        self.tested.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    fn update(&self) -> Result<(), ProviderError> {
        self.updated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn new_entry() -> CrashEntry {
    CrashEntry::new(
        Platform { name: "x86-64".to_string() },
        Product { name: "mozilla-central".to_string(), version: Some("52.0a1".to_string()) },
        Os { name: "linux".to_string(), version: None },
        Client { name: "fuzzer-01".to_string() },
    )
}

#[test]
fn persisted_args_and_env_decode_back() {
    let store = InMemoryStore::new();
    let mut entry = new_entry();
    entry
        .set_args(vec!["--flag".to_string(), "-v".to_string()])
        .unwrap();
    entry
        .set_env(vec!["PATH=/usr/bin".to_string(), "LANG=en_US".to_string()])
        .unwrap();
    let pk = entry.save(&store).unwrap();

    let stored = store.crash_entry(pk).unwrap();
    assert_eq!(
        key_value::decode_args(stored.args_text()).unwrap(),
        vec!["--flag".to_string(), "-v".to_string()]
    );

    let env: BTreeMap<String, String> = serde_json::from_str(stored.env_text()).unwrap();
    assert_eq!(env.len(), 2);
    assert_eq!(env["PATH"], "/usr/bin");
    assert_eq!(env["LANG"], "en_US");
}

#[test]
fn lazy_lists_load_from_persisted_text() {
    let store = InMemoryStore::new();
    let mut entry = new_entry();
    entry.set_metadata(vec!["pathPrefix=/builds/".to_string()]).unwrap();
    let pk = entry.save(&store).unwrap();

    let mut reloaded = store.crash_entry(pk).unwrap();
    assert!(reloaded.metadata_list().is_none());
    assert!(reloaded.args_list().is_none());

    reloaded.deserialize_fields().unwrap();
    reloaded.deserialize_fields().unwrap();
    assert_eq!(
        reloaded.metadata_list().unwrap(),
        &["pathPrefix=/builds/".to_string()]
    );
    assert!(reloaded.args_list().is_none());
    assert_eq!(
        reloaded.configuration().metadata.get("pathPrefix").map(String::as_str),
        Some("/builds/")
    );
}

#[test]
fn crlf_and_lf_signatures_store_identically() {
    let store = InMemoryStore::new();
    let crlf = Bucket::new("CRASH\r\nADDRESS\r\n", "crlf").save(&store).unwrap();
    let lf = Bucket::new("CRASH\nADDRESS\n", "lf").save(&store).unwrap();

    assert_eq!(
        store.bucket(crlf).unwrap().signature.into_bytes(),
        store.bucket(lf).unwrap().signature.into_bytes()
    );
}

#[test]
fn matching_is_deterministic() {
    let signature = CompiledSignature::compile(
        r#"{"symptoms": [{"type": "crashAddress", "address": "< 0x100"}, {"type": "stackFrames", "functionNames": ["js::jit::Invalidate", "?"]}]}"#,
    )
    .unwrap();

    let mut entry = new_entry();
    entry.raw_stderr = "Program received signal SIGSEGV, Segmentation fault.\n\
        #0  0x0000555555 in js::jit::Invalidate ()\n\
        #1  0x0000555566 in js::RunScript ()\n\
        => 0x555555:\tmov    0x8(%rax),%rcx\n\
        rax            0x10\t16\n"
        .to_string();
    let info = entry.crash_info();

    let first = signature.matches(&info);
    for _ in 0..10 {
        assert_eq!(signature.matches(&entry.crash_info()), first);
    }
    assert!(first);
}

#[test]
fn unknown_revision_triggers_single_unverified_update() {
    let mirror = Arc::new(StaleMirror::default());
    let mut registry = ProviderRegistry::new();
    let shared = Arc::clone(&mirror);
    registry
        .register_repository("StaleMirror", move |_| Ok(shared.clone()))
        .unwrap();

    let store = InMemoryStore::new();
    let repository_pk = store
        .save_repository(&Repository {
            pk: None,
            name: "mozilla-central".to_string(),
            classname: "StaleMirror".to_string(),
            location: "/srv/repos/mozilla-central".into(),
        })
        .unwrap();
    let collection_pk = store
        .save_collection(&Collection::new(repository_pk, "abc123"))
        .unwrap();

    let outcome = check_revision_update(&store, &registry, collection_pk, None).unwrap();
    assert_eq!(outcome, SyncOutcome::UpdatedUnverified);
    assert_eq!(mirror.tested.load(Ordering::SeqCst), 1);
    assert_eq!(mirror.updated.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_repository_class_fails() {
    let store = InMemoryStore::new();
    let repository_pk = store
        .save_repository(&Repository {
            pk: None,
            name: "legacy".to_string(),
            classname: "CVSSourceCodeProvider".to_string(),
            location: "/srv/repos/legacy".into(),
        })
        .unwrap();
    let collection_pk = store
        .save_collection(&Collection::new(repository_pk, "abc123"))
        .unwrap();

    let registry = ProviderRegistry::with_builtin_providers();
    assert!(matches!(
        check_revision_update(&store, &registry, collection_pk, None),
        Err(TaskError::Provider(ProviderError::UnknownProvider { .. }))
    ));
}

#[test]
fn batch_ingestion_assigns_buckets() {
    let store = InMemoryStore::new();
    let bucket_pk = Bucket::new(
        r#"{"symptoms": [{"type": "output", "src": "crashdata", "value": "/heap-use-after-free/"}]}"#,
        "UAF",
    )
    .save(&store)
    .unwrap();

    let asan = r#"{
        "rawCrashData": "==1==ERROR: AddressSanitizer: heap-use-after-free on address 0x602000000010 at pc 0x1 bp 0x2 sp 0x3\n    #0 0x4005d4 in js::gc::Mark(JSObject*) /builds/js/src/gc.cpp:12\n",
        "platform": "x86-64",
        "product": "mozilla-central",
        "os": "linux"
    }"#;
    let clean = r#"{"rawStdout": "all good", "platform": "x86-64", "product": "mozilla-central", "os": "linux"}"#;

    let ctx = BatchContext::new(None, Some("fuzzer-02"));
    let result = process_batch(&ctx, &store, vec![asan.to_string(), clean.to_string()]).unwrap();

    assert_eq!(result.accepted, 2);
    assert_eq!(result.bucketed, 1);
    assert_eq!(result.reports[0].bucket_id, Some(bucket_pk));
    assert_eq!(
        result.reports[0].short_signature.as_deref(),
        Some("AddressSanitizer: heap-use-after-free [@ js::gc::Mark]")
    );
    assert_eq!(result.reports[1].bucket_id, None);
    assert_eq!(
        result.reports[1].short_signature.as_deref(),
        Some("No crash detected")
    );

    let stored = store.crash_entry(result.reports[0].entry_id.unwrap()).unwrap();
    assert_eq!(stored.client.name, "fuzzer-02");
    assert_eq!(stored.crash_address, "0x602000000010");
}
