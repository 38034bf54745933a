/// Property-based tests for unit-of-work scopes
///
/// These tests verify caching and cleanup invariants regardless of how many
/// keys are resolved or which values fail to destroy.

use ferrous_uow::{
    key_of_named, BoxError, CompoundDestroyStrategy, Destroyable, Instance, Key, Lifecycle,
    Provider, Scope, ScopeContext, ScopeError, SingletonUnitOfWorkScope, SupplyingScope,
    ThreadLocalUnitOfWorkScope, UnitOfWorkScope,
};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Value {
    attempts: AtomicUsize,
    fail: bool,
}

impl Destroyable for Value {
    fn destroy(&self) -> Result<(), BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err("refused".into())
        } else {
            Ok(())
        }
    }
}

fn value(fail: bool) -> Arc<Value> {
    Arc::new(Value {
        attempts: AtomicUsize::new(0),
        fail,
    })
}

fn lifecycle() -> Lifecycle<Value> {
    Lifecycle::<Value>::builder().destroyable().build()
}

const NAMES: [&str; 8] = ["k0", "k1", "k2", "k3", "k4", "k5", "k6", "k7"];

// Property: within one unit of work, every key resolves to one instance
proptest! {
    #[test]
    fn resolution_is_cached_per_key(lookups in prop::collection::vec(0usize..NAMES.len(), 1..64)) {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let built = Arc::new(AtomicUsize::new(0));
        let providers: Vec<Arc<dyn Provider<Value>>> = NAMES
            .iter()
            .map(|&name| {
                let built = built.clone();
                scope.scope(
                    key_of_named::<Value>(name),
                    move || {
                        built.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ScopeError>(value(false))
                    },
                    lifecycle(),
                )
            })
            .collect();

        scope.begin().unwrap();
        let mut first_seen: HashMap<usize, Arc<Value>> = HashMap::new();
        for index in &lookups {
            let resolved = providers[*index].get().unwrap();
            let first = first_seen.entry(*index).or_insert_with(|| resolved.clone());
            prop_assert!(Arc::ptr_eq(first, &resolved));
        }
        scope.end().unwrap();

        prop_assert_eq!(built.load(Ordering::SeqCst), first_seen.len());
    }
}

// Property: with N values and M failing, all N are attempted and exactly M reported
proptest! {
    #[test]
    fn thread_local_end_reports_exactly_the_failures(failures in prop::collection::vec(any::<bool>(), 0..24)) {
        let scope = ThreadLocalUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
        let values: Vec<Arc<Value>> = failures.iter().map(|&fail| value(fail)).collect();

        scope.begin().unwrap();
        scope.with_context(|context| {
            for (i, v) in values.iter().enumerate() {
                context.set(
                    Key::attribute(format!("value.{}", i)).unwrap(),
                    Instance::with_lifecycle(v.clone(), &lifecycle()),
                );
            }
        }).unwrap();
        let result = scope.end();

        prop_assert!(!scope.is_active());
        prop_assert!(values.iter().all(|v| v.attempts.load(Ordering::SeqCst) == 1));

        let expected = failures.iter().filter(|&&f| f).count();
        match result {
            Ok(()) => prop_assert_eq!(expected, 0),
            Err(err) => {
                let report = err.destroy_report().unwrap();
                prop_assert_eq!(report.len(), expected);
                for v in &values {
                    let id = Instance::new(v.clone()).id();
                    prop_assert_eq!(report.contains(id), v.fail);
                }
            }
        }
    }
}

proptest! {
    #[test]
    fn singleton_end_reports_exactly_the_failures(failures in prop::collection::vec(any::<bool>(), 0..24)) {
        let scope = SingletonUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
        let values: Vec<Arc<Value>> = failures.iter().map(|&fail| value(fail)).collect();

        scope.begin().unwrap();
        for v in &values {
            scope.register(Instance::with_lifecycle(v.clone(), &lifecycle())).unwrap();
        }
        let result = scope.end();

        prop_assert!(!scope.is_active());
        prop_assert_eq!(scope.registered_count(), 0);
        prop_assert!(values.iter().all(|v| v.attempts.load(Ordering::SeqCst) == 1));

        let expected = failures.iter().filter(|&&f| f).count();
        let reported = result.err().map_or(0, |err| err.destroy_report().map_or(0, |r| r.len()));
        prop_assert_eq!(reported, expected);
    }
}

// Property: a context behaves like a map for set/remove sequences
proptest! {
    #[test]
    fn context_matches_model(ops in prop::collection::vec((0usize..NAMES.len(), any::<bool>(), any::<u32>()), 0..64)) {
        let mut context = ScopeContext::new();
        let mut model: HashMap<usize, u32> = HashMap::new();

        for (index, insert, payload) in ops {
            let key = key_of_named::<u32>(NAMES[index]);
            if insert {
                context.set(key, Arc::new(payload));
                model.insert(index, payload);
            } else {
                let removed = context.remove(&key).and_then(|i| i.downcast::<u32>());
                prop_assert_eq!(removed.map(|v| *v), model.remove(&index));
            }
            prop_assert_eq!(context.len(), model.len());
        }

        for (index, payload) in &model {
            let key = key_of_named::<u32>(NAMES[*index]);
            prop_assert!(context.contains(&key));
            prop_assert_eq!(*context.get_as::<u32>(&key).unwrap().unwrap(), *payload);
        }
    }
}
