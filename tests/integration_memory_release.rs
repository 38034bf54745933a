/// Memory release integration tests
///
/// These tests verify that scopes do not keep instances alive past the unit
/// of work that created them:
/// 1. Thread-local scopes drop every bound value at `end()`
/// 2. Process scopes drop registered values at `end()` and on eviction
/// 3. Values that outlive the unit of work are held only by the caller

use ferrous_uow::{
    key_of_type, CompoundDestroyStrategy, Lifecycle, Provider, Scope, ScopeError,
    SingletonUnitOfWorkScope, ThreadLocalUnitOfWorkScope, UnitOfWorkScope, UnitOfWorkScopeExt,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug)]
pub struct Payload {
    data: Vec<u8>,
    drops: Arc<AtomicU32>,
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn payloads<S: Scope>(scope: &S, drops: Arc<AtomicU32>) -> Arc<dyn Provider<Payload>> {
    scope.scope(
        key_of_type::<Payload>(),
        move || {
            Ok::<_, ScopeError>(Arc::new(Payload {
                data: vec![0u8; 1024],
                drops: drops.clone(),
            }))
        },
        Lifecycle::none(),
    )
}

#[test]
fn test_thread_local_end_releases_values() {
    let drops = Arc::new(AtomicU32::new(0));
    let scope = ThreadLocalUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
    let provider = payloads(&scope, drops.clone());

    scope.begin().unwrap();
    let weak: Weak<Payload> = Arc::downgrade(&provider.get().unwrap());
    assert!(weak.upgrade().is_some());
    scope.end().unwrap();

    assert!(weak.upgrade().is_none());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_caller_keeps_value_past_end() {
    let drops = Arc::new(AtomicU32::new(0));
    let scope = ThreadLocalUnitOfWorkScope::new();
    let provider = payloads(&scope, drops.clone());

    let kept = scope.unit_of_work(|| provider.get()).unwrap();

    // Only the caller holds it now
    assert_eq!(Arc::strong_count(&kept), 1);
    assert_eq!(kept.data.len(), 1024);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    drop(kept);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_repeated_units_of_work_do_not_accumulate() {
    let drops = Arc::new(AtomicU32::new(0));
    let scope = ThreadLocalUnitOfWorkScope::new();
    let provider = payloads(&scope, drops.clone());

    for _ in 0..100 {
        scope
            .unit_of_work(|| provider.get().map(|_| ()))
            .unwrap();
    }

    assert_eq!(drops.load(Ordering::SeqCst), 100);
}

#[test]
fn test_process_scope_end_releases_registered_values() {
    let drops = Arc::new(AtomicU32::new(0));
    let scope = SingletonUnitOfWorkScope::new();
    let provider = payloads(&scope, drops.clone());

    scope.begin().unwrap();
    let weak = Arc::downgrade(&provider.get().unwrap());
    // The registry still holds it after the caller let go
    assert!(weak.upgrade().is_some());
    assert_eq!(scope.registered_count(), 1);
    scope.end().unwrap();

    assert!(weak.upgrade().is_none());
    assert_eq!(scope.registered_count(), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_process_scope_eviction_releases_unowned_values() {
    let drops = Arc::new(AtomicU32::new(0));
    let scope = SingletonUnitOfWorkScope::new();
    let provider = payloads(&scope, drops.clone());

    scope.begin().unwrap();
    let held = provider.get().unwrap();
    assert_eq!(scope.evict_unowned().unwrap(), 0);

    drop(held);
    assert_eq!(scope.evict_unowned().unwrap(), 1);
    assert_eq!(scope.registered_count(), 0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    scope.end().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
