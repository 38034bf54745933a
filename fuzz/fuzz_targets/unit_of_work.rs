#![no_main]

use ferrous_uow::{
    key_of_named, CompoundDestroyStrategy, Lifecycle, Provider, Scope, ScopeError,
    SingletonUnitOfWorkScope, ThreadLocalUnitOfWorkScope, UnitOfWorkScope,
};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

const NAMES: [&str; 3] = ["x", "y", "z"];

fn drive<S: Scope + UnitOfWorkScope>(scope: &S, ops: &[u8]) {
    let providers: Vec<Arc<dyn Provider<u32>>> = NAMES
        .iter()
        .enumerate()
        .map(|(i, &name)| {
            scope.scope(
                key_of_named::<u32>(name),
                move || Ok::<_, ScopeError>(Arc::new(i as u32)),
                Lifecycle::none(),
            )
        })
        .collect();

    let mut active = false;
    for &op in ops {
        match op % 4 {
            0 => {
                let result = scope.begin();
                assert_eq!(result.is_ok(), !active);
                active = true;
            }
            1 => {
                let result = scope.end();
                assert_eq!(result.is_ok(), active);
                active = false;
            }
            _ => {
                let index = (op as usize >> 2) % NAMES.len();
                match providers[index].get() {
                    Ok(value) => {
                        assert!(active);
                        assert_eq!(*value, index as u32);
                    }
                    Err(ScopeError::OutOfScope { .. }) => assert!(!active),
                    Err(other) => panic!("unexpected error: {}", other),
                }
            }
        }
        assert_eq!(scope.is_active(), active);
    }

    if active {
        let _ = scope.end();
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, ops)) = data.split_first() else {
        return;
    };
    if selector & 1 == 0 {
        let scope = ThreadLocalUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
        drive(&scope, ops);
    } else {
        let scope = SingletonUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
        drive(&scope, ops);
    }
});
