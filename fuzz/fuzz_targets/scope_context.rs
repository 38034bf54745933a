#![no_main]

use ferrous_uow::{key_of_named, Key, ScopeContext};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use std::sync::Arc;

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

fn key_for(byte: u8) -> Key {
    let name = NAMES[(byte as usize >> 1) % NAMES.len()];
    if byte & 1 == 0 {
        key_of_named::<u8>(name)
    } else {
        Key::Attribute(Arc::from(name))
    }
}

fuzz_target!(|data: &[u8]| {
    let mut context = ScopeContext::new();
    let mut model: HashMap<Key, u8> = HashMap::new();

    for chunk in data.chunks_exact(3) {
        let key = key_for(chunk[1]);
        let payload = chunk[2];
        match chunk[0] % 5 {
            0 => {
                context.set(key.clone(), Arc::new(payload));
                model.insert(key, payload);
            }
            1 => {
                let removed = context.remove(&key).and_then(|i| i.downcast::<u8>());
                assert_eq!(removed.map(|v| *v), model.remove(&key));
            }
            2 => {
                let bound = context.put_if_absent(key.clone(), Arc::new(payload));
                let expected = *model.entry(key).or_insert(payload);
                assert_eq!(bound.downcast::<u8>().map(|v| *v), Some(expected));
            }
            3 => {
                // Stored values are always u8, so any other type is a mismatch
                match context.get_as::<u16>(&key) {
                    Ok(None) => assert!(!model.contains_key(&key)),
                    Ok(Some(_)) => panic!("u8 value read back as u16"),
                    Err(_) => assert!(model.contains_key(&key)),
                }
            }
            _ => {
                context.clear();
                model.clear();
            }
        }
        assert_eq!(context.len(), model.len());
        assert_eq!(context.iter().count(), model.len());
    }
});
