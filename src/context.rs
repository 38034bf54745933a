//! Per-span key → instance storage.

use std::collections::hash_map::{self, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{error, trace};

use crate::destroy::{destroy_silently, DefaultDestroyErrors, DestroyErrors, DestroyStrategy};
use crate::error::{ScopeError, ScopeResult};
use crate::instance::Instance;
use crate::key::Key;

/// The store backing one active unit of work.
///
/// A key is either absent or bound to exactly one [`Instance`]. `set`
/// overwrites silently. The context holds a strong reference to every bound
/// value until it is removed or the context is cleared.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{key_of_type, Key, ScopeContext};
/// use std::sync::Arc;
///
/// struct RequestId(u64);
///
/// let mut context = ScopeContext::new();
/// let key = key_of_type::<RequestId>();
///
/// assert!(!context.contains(&key));
/// context.set(key.clone(), Arc::new(RequestId(7)));
///
/// let id = context.get_as::<RequestId>(&key).unwrap().unwrap();
/// assert_eq!(id.0, 7);
///
/// let removed = context.remove(&key).unwrap();
/// assert!(removed.is::<RequestId>());
/// assert!(context.is_empty());
/// ```
#[derive(Default)]
pub struct ScopeContext {
    entries: HashMap<Key, Instance>,
}

impl ScopeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `value` to `key`, replacing any previous binding.
    pub fn set(&mut self, key: Key, value: impl Into<Instance>) {
        self.entries.insert(key, value.into());
    }

    /// Returns the instance bound to `key`.
    pub fn get(&self, key: &Key) -> Option<&Instance> {
        self.entries.get(key)
    }

    /// Returns the value bound to `key` as a `T`.
    ///
    /// `Ok(None)` when unbound, [`ScopeError::TypeMismatch`] when bound to
    /// something else.
    pub fn get_as<T: Send + Sync + 'static>(&self, key: &Key) -> ScopeResult<Option<Arc<T>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(instance) => instance.downcast::<T>().map(Some).ok_or_else(|| {
                ScopeError::TypeMismatch {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                    found: instance.type_name(),
                }
            }),
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Unbinds `key`, returning what it was bound to.
    ///
    /// The removed instance is not destroyed.
    pub fn remove(&mut self, key: &Key) -> Option<Instance> {
        self.entries.remove(key)
    }

    /// Binds every entry, overwriting existing bindings.
    pub fn put_all<I, V>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (Key, V)>,
        V: Into<Instance>,
    {
        self.entries
            .extend(entries.into_iter().map(|(k, v)| (k, v.into())));
    }

    /// Binds `value` unless `key` is already bound, and returns the binding
    /// that is in place afterwards.
    pub fn put_if_absent(&mut self, key: Key, value: impl Into<Instance>) -> &Instance {
        match self.entries.entry(key) {
            hash_map::Entry::Occupied(entry) => {
                trace!(key = %entry.key(), "Keeping existing binding");
                entry.into_mut()
            }
            hash_map::Entry::Vacant(entry) => entry.insert(value.into()),
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self.entries.iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Destroys every destroyable value and empties the context.
    ///
    /// Failures are logged and never returned, so one bad value cannot stop
    /// the cleanup of the others. Scopes use [`destroy_with`](Self::destroy_with)
    /// instead.
    pub fn clear(&mut self) {
        for (key, instance) in self.entries.drain() {
            trace!(key = %key, "Clearing binding");
            destroy_silently(&instance);
        }
    }

    /// Empties the context and runs `strategy` over every value it held.
    ///
    /// Every value gets a destroy attempt. The context is empty afterwards
    /// whether or not destruction failed; failures are returned as one
    /// [`ScopeError::Destroy`].
    pub fn destroy_with(&mut self, strategy: &dyn DestroyStrategy) -> ScopeResult<()> {
        let drained: Vec<Instance> = self.entries.drain().map(|(_, v)| v).collect();
        destroy_all(drained.iter(), strategy)
    }
}

/// Runs `strategy` over `instances`, collecting every failure.
pub(crate) fn destroy_all<'a, I>(instances: I, strategy: &dyn DestroyStrategy) -> ScopeResult<()>
where
    I: IntoIterator<Item = &'a Instance>,
{
    let mut errors = DefaultDestroyErrors::new();
    let mut aborted = None;
    for instance in instances {
        trace!(instance = %instance, strategy = strategy.name(), "Destroying scoped value");
        // A strategy that bails out must not cost the remaining values their attempt
        if let Err(err) = strategy.destroy(instance, &mut errors) {
            error!(instance = %instance, strategy = strategy.name(), error = %err, "Destroy strategy aborted");
            aborted.get_or_insert(err);
        }
    }
    errors.raise_if_any()?;
    aborted.map_or(Ok(()), Err)
}

impl fmt::Debug for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl Extend<(Key, Instance)> for ScopeContext {
    fn extend<I: IntoIterator<Item = (Key, Instance)>>(&mut self, iter: I) {
        self.put_all(iter);
    }
}

/// Iterator over the bindings of a [`ScopeContext`].
pub struct Iter<'a> {
    inner: hash_map::Iter<'a, Key, Instance>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Key, &'a Instance);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a ScopeContext {
    type Item = (&'a Key, &'a Instance);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destroy::CompoundDestroyStrategy;
    use crate::error::BoxError;
    use crate::instance::Lifecycle;
    use crate::key::{key_of_named, key_of_type};
    use crate::traits::Destroyable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracked {
        destroyed: AtomicUsize,
        fail: bool,
    }

    impl Tracked {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                destroyed: AtomicUsize::new(0),
                fail,
            })
        }

        fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    impl Destroyable for Tracked {
        fn destroy(&self) -> Result<(), BoxError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("tracked failure".into())
            } else {
                Ok(())
            }
        }
    }

    fn tracked(value: &Arc<Tracked>) -> Instance {
        let lifecycle = Lifecycle::<Tracked>::builder().destroyable().build();
        Instance::with_lifecycle(value.clone(), &lifecycle)
    }

    #[test]
    fn set_overwrites() {
        let mut context = ScopeContext::new();
        let key = key_of_type::<u32>();
        context.set(key.clone(), Arc::new(1u32));
        context.set(key.clone(), Arc::new(2u32));
        assert_eq!(context.len(), 1);
        assert_eq!(*context.get_as::<u32>(&key).unwrap().unwrap(), 2);
    }

    #[test]
    fn get_as_reports_mismatch() {
        let mut context = ScopeContext::new();
        let key = key_of_named::<u32>("port");
        context.set(key.clone(), Arc::new("not a number"));
        match context.get_as::<u32>(&key) {
            Err(ScopeError::TypeMismatch { expected, found, .. }) => {
                assert_eq!(expected, "u32");
                assert_eq!(found, "&str");
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(context.get_as::<u32>(&key_of_type::<u32>()).unwrap().is_none());
    }

    #[test]
    fn put_if_absent_keeps_first() {
        let mut context = ScopeContext::new();
        let key = key_of_type::<String>();
        let first = Arc::new(String::from("first"));
        context.put_if_absent(key.clone(), first.clone());
        let bound = context
            .put_if_absent(key.clone(), Arc::new(String::from("second")))
            .clone();
        assert!(Arc::ptr_eq(&bound.downcast::<String>().unwrap(), &first));
    }

    #[test]
    fn put_all_and_iterate() {
        let mut context = ScopeContext::new();
        context.put_all(vec![
            (key_of_named::<u8>("a"), Arc::new(1u8)),
            (key_of_named::<u8>("b"), Arc::new(2u8)),
        ]);
        let mut seen: Vec<u8> = context
            .iter()
            .map(|(_, v)| *v.downcast::<u8>().unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
        assert_eq!((&context).into_iter().len(), 2);
    }

    #[test]
    fn clear_destroys_and_swallows_failures() {
        let good = Tracked::new(false);
        let bad = Tracked::new(true);
        let mut context = ScopeContext::new();
        context.set(key_of_named::<Tracked>("good"), tracked(&good));
        context.set(key_of_named::<Tracked>("bad"), tracked(&bad));
        context.set(key_of_type::<u8>(), Arc::new(0u8));

        context.clear();

        assert!(context.is_empty());
        assert_eq!(good.destroyed(), 1);
        assert_eq!(bad.destroyed(), 1);
    }

    #[test]
    fn destroy_with_reports_every_failure() {
        let values: Vec<_> = (0..4).map(|i| Tracked::new(i % 2 == 0)).collect();
        let mut context = ScopeContext::new();
        for (i, value) in values.iter().enumerate() {
            context.set(Key::attribute(format!("value.{}", i)).unwrap(), tracked(value));
        }

        let err = context
            .destroy_with(&CompoundDestroyStrategy::standard())
            .unwrap_err();

        assert!(context.is_empty());
        assert!(values.iter().all(|v| v.destroyed() == 1));
        assert_eq!(err.destroy_report().unwrap().len(), 2);
    }

    #[test]
    fn remove_does_not_destroy() {
        let value = Tracked::new(false);
        let mut context = ScopeContext::new();
        let key = key_of_type::<Tracked>();
        context.set(key.clone(), tracked(&value));
        assert!(context.remove(&key).is_some());
        assert!(context.remove(&key).is_none());
        assert_eq!(value.destroyed(), 0);
    }
}
