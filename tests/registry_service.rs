use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keyward::registry::service::MAX_ID_ATTEMPTS;
use keyward::registry::{IdGenerator, ManualClock, RegistryError, RegistryService};
use keyward::store::{CredentialRecord, CredentialStore, FileBackend, MemoryBackend, StoreError};

const NOW: u64 = 1_700_000_000;
const DAY: u64 = 86_400;

struct Harness {
    backend: Arc<MemoryBackend>,
    clock: Arc<ManualClock>,
    registry: RegistryService,
}

fn harness(records: Vec<CredentialRecord>) -> Harness {
    let backend = Arc::new(MemoryBackend::with_records(records));
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(CredentialStore::load(backend.clone()).unwrap());
    let registry = RegistryService::with_clock(store, IdGenerator::default(), clock.clone());
    Harness {
        backend,
        clock,
        registry,
    }
}

#[test]
fn test_create_get_toggle_delete() {
    let h = harness(Vec::new());

    let record = h.registry.create("7d", "admin", true).unwrap();
    assert!(record.id().starts_with("WHITE-"));
    assert_eq!(record.created_at(), NOW);
    assert_eq!(record.expires_at(), NOW + 7 * DAY);
    assert_eq!(record.created_by(), "admin");
    assert!(!record.used());

    assert_eq!(h.registry.get(record.id()).unwrap(), record);

    assert!(h.registry.toggle_used(record.id(), true).unwrap());
    assert!(h.registry.get(record.id()).unwrap().used());
    assert!(!h.registry.toggle_used(record.id(), true).unwrap());

    h.registry.delete(record.id(), true).unwrap();
    assert!(matches!(
        h.registry.get(record.id()),
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        h.registry.delete(record.id(), true),
        Err(RegistryError::NotFound { .. })
    ));
    assert!(h.backend.persisted().unwrap().is_empty());
}

#[test]
fn test_duration_units() {
    let h = harness(Vec::new());
    for (token, secs) in [("12h", 12 * 3600), ("30d", 30 * DAY), ("3m", 90 * DAY), ("1a", 365 * DAY)] {
        let record = h.registry.create(token, "admin", true).unwrap();
        assert_eq!(record.expires_at() - record.created_at(), secs, "{token}");
    }
    assert_eq!(h.registry.list(true).unwrap().len(), 4);
}

#[test]
fn test_unprivileged_callers_cannot_mutate() {
    let existing = CredentialRecord::new("WHITE-AAAA-BBBB-CCCC", NOW, NOW + DAY, "admin").unwrap();
    let h = harness(vec![existing.clone()]);

    assert!(matches!(
        h.registry.create("7d", "eve", false),
        Err(RegistryError::PermissionDenied)
    ));
    assert!(matches!(
        h.registry.delete(existing.id(), false),
        Err(RegistryError::PermissionDenied)
    ));
    assert!(matches!(
        h.registry.toggle_used(existing.id(), false),
        Err(RegistryError::PermissionDenied)
    ));
    assert!(matches!(h.registry.clear_all(false), Err(RegistryError::PermissionDenied)));
    assert!(matches!(h.registry.list(false), Err(RegistryError::PermissionDenied)));

    // Permission is checked before validation.
    assert!(matches!(
        h.registry.create("bogus", "eve", false),
        Err(RegistryError::PermissionDenied)
    ));

    assert_eq!(h.backend.write_count(), 0);
    assert_eq!(h.registry.get(existing.id()).unwrap(), existing);
}

#[test]
fn test_invalid_duration_does_not_mutate() {
    let h = harness(Vec::new());
    for token in ["", "x", "7", "7z", "-1d", "0d", "99999999999999999999a"] {
        assert!(
            matches!(
                h.registry.create(token, "admin", true),
                Err(RegistryError::InvalidDuration { .. })
            ),
            "{token:?} must be rejected"
        );
    }
    assert_eq!(h.backend.write_count(), 0);
    assert!(h.registry.list(true).unwrap().is_empty());
}

#[test]
fn test_expired_keys_are_invisible_and_evicted() {
    let expired = CredentialRecord::new("WHITE-AAAA-AAAA-AAAA", NOW - DAY, NOW - 1, "admin").unwrap();
    let boundary = CredentialRecord::new("WHITE-BBBB-BBBB-BBBB", NOW - DAY, NOW, "admin").unwrap();
    let active = CredentialRecord::new("WHITE-CCCC-CCCC-CCCC", NOW - DAY, NOW + 1, "admin").unwrap();
    let h = harness(vec![expired.clone(), boundary.clone(), active.clone()]);

    assert!(matches!(
        h.registry.get(expired.id()),
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        h.registry.get(boundary.id()),
        Err(RegistryError::NotFound { .. })
    ));
    assert_eq!(h.registry.get(active.id()).unwrap(), active);

    // The first call already removed the expired keys from storage.
    assert_eq!(h.backend.persisted().unwrap(), vec![active.clone()]);
    assert_eq!(h.backend.write_count(), 1);

    h.clock.advance(1);
    assert!(h.registry.list(true).unwrap().is_empty());
    assert!(h.backend.persisted().unwrap().is_empty());
}

#[test]
fn test_sweep_is_idempotent() {
    let expired = CredentialRecord::new("WHITE-AAAA-AAAA-AAAA", NOW - DAY, NOW - 1, "admin").unwrap();
    let active = CredentialRecord::new("WHITE-CCCC-CCCC-CCCC", NOW - DAY, NOW + DAY, "admin").unwrap();
    let h = harness(vec![expired, active.clone()]);

    for _ in 0..5 {
        assert_eq!(h.registry.list(true).unwrap(), vec![active.clone()]);
    }
    assert_eq!(h.backend.write_count(), 1);
}

#[test]
fn test_toggle_does_not_affect_validity() {
    let h = harness(Vec::new());
    let record = h.registry.create("1d", "admin", true).unwrap();
    h.registry.toggle_used(record.id(), true).unwrap();
    assert!(h.registry.get(record.id()).is_ok());

    h.clock.advance(DAY);
    assert!(matches!(
        h.registry.toggle_used(record.id(), true),
        Err(RegistryError::NotFound { .. })
    ));
}

#[test]
fn test_ids_are_normalized() {
    let h = harness(Vec::new());
    let record = h.registry.create("7d", "admin", true).unwrap();
    let sloppy = format!("  {}\n", record.id().to_lowercase());

    assert_eq!(h.registry.get(&sloppy).unwrap(), record);
    assert!(h.registry.toggle_used(&sloppy, true).unwrap());
    h.registry.delete(&sloppy, true).unwrap();
    assert!(h.registry.list(true).unwrap().is_empty());
}

#[test]
fn test_clear_all_counts_active_keys() {
    let expired = CredentialRecord::new("WHITE-AAAA-AAAA-AAAA", NOW - DAY, NOW - 1, "admin").unwrap();
    let h = harness(vec![expired]);
    h.registry.create("7d", "admin", true).unwrap();
    h.registry.create("7d", "admin", true).unwrap();

    assert_eq!(h.registry.clear_all(true).unwrap(), 2);
    assert!(h.registry.list(true).unwrap().is_empty());
    assert_eq!(h.backend.persisted().unwrap(), Vec::new());
    assert_eq!(h.registry.clear_all(true).unwrap(), 0);
}

#[test]
fn test_storage_failure_leaves_registry_unchanged() {
    let h = harness(Vec::new());
    let record = h.registry.create("7d", "admin", true).unwrap();

    h.backend.fail_writes(true);
    assert!(matches!(
        h.registry.create("7d", "admin", true),
        Err(RegistryError::Storage(_))
    ));
    assert!(matches!(
        h.registry.toggle_used(record.id(), true),
        Err(RegistryError::Storage(_))
    ));
    assert!(matches!(h.registry.clear_all(true), Err(RegistryError::Storage(_))));

    h.backend.fail_writes(false);
    assert_eq!(h.registry.list(true).unwrap(), vec![record]);
}

#[test]
fn test_concurrent_creates_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = CredentialStore::load(Arc::new(FileBackend::new(dir.path()))).unwrap();
    let registry = Arc::new(RegistryService::new(Arc::new(store), IdGenerator::default()));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.create("30d", "admin", true).unwrap())
        })
        .collect();
    let mut created: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().id().to_string())
        .collect();
    created.sort();
    created.dedup();
    assert_eq!(created.len(), 100);

    // A fresh load sees exactly what was acknowledged.
    let reloaded = CredentialStore::load(Arc::new(FileBackend::new(dir.path()))).unwrap();
    let mut persisted: Vec<String> = reloaded
        .snapshot()
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    persisted.sort();
    assert_eq!(persisted, created);
}

#[test]
fn test_custom_prefix() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(CredentialStore::load(backend).unwrap());
    let registry = RegistryService::new(store, IdGenerator::new("GOLD").unwrap());
    let record = registry.create("12h", "admin", true).unwrap();
    assert!(record.id().starts_with("GOLD-"));
    assert_eq!(record.id().len(), "GOLD-XXXX-XXXX-XXXX".len());
}

/// Registry over one existing key whose id source replays `ids` in order,
/// then repeats the last one. Returns the call counter alongside.
fn scripted(ids: &'static [&'static str]) -> (Arc<MemoryBackend>, RegistryService, Arc<AtomicUsize>) {
    let existing = CredentialRecord::new("WHITE-TAKN-TAKN-TAKN", NOW, NOW + DAY, "admin").unwrap();
    let backend = Arc::new(MemoryBackend::with_records(vec![existing]));
    let store = Arc::new(CredentialStore::load(backend.clone()).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let registry = RegistryService::with_id_source(store, Arc::new(ManualClock::new(NOW)), move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        ids[n.min(ids.len() - 1)].to_string()
    });
    (backend, registry, calls)
}

#[test]
fn test_create_retries_on_id_collision() {
    let (backend, registry, calls) = scripted(&["WHITE-TAKN-TAKN-TAKN", "WHITE-FRSH-0000-0001"]);

    let record = registry.create("7d", "admin", true).unwrap();
    assert_eq!(record.id(), "WHITE-FRSH-0000-0001");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.write_count(), 1);

    // The colliding key is untouched.
    let taken = registry.get("WHITE-TAKN-TAKN-TAKN").unwrap();
    assert_eq!(taken.expires_at(), NOW + DAY);
    assert_eq!(registry.list(true).unwrap().len(), 2);
}

#[test]
fn test_create_gives_up_when_ids_keep_colliding() {
    let (backend, registry, calls) = scripted(&["WHITE-TAKN-TAKN-TAKN"]);

    let err = registry.create("7d", "admin", true).unwrap_err();
    assert!(
        matches!(err, RegistryError::Storage(StoreError::IdSpaceExhausted(n)) if n == MAX_ID_ATTEMPTS),
        "{err:?}"
    );
    assert_eq!(MAX_ID_ATTEMPTS, 8);
    assert_eq!(calls.load(Ordering::SeqCst), MAX_ID_ATTEMPTS);
    assert_eq!(backend.write_count(), 0);
    assert_eq!(registry.list(true).unwrap().len(), 1);
}
