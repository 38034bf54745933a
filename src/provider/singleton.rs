//! Per-key singleton provider registering with a process-wide scope.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::error::{ScopeError, ScopeResult};
use crate::instance::{Instance, Lease, Lifecycle};
use crate::key::Key;
use crate::scope::{SingletonUnitOfWorkScope, UnitOfWorkScope};
use crate::traits::Provider;

/// Singleton provider whose instances belong to a
/// [`SingletonUnitOfWorkScope`].
///
/// The provider caches its instance by weak reference only, so once every
/// caller has dropped it the scope is the sole owner and may evict it. The
/// next `get()` then builds a fresh instance. Every instance handed out is
/// registered with the scope; registering the same instance again is a
/// no-op.
///
/// Before resolving, the provider runs the scope's eviction sweep. Sweep
/// failures are logged, not returned, since they concern other instances.
/// An evicted instance is never handed out again, so it is registered and
/// destroyed only once.
///
/// `end()` destroys registered instances but does not retire the cache. A
/// caller that keeps an instance past `end()` therefore gets that same,
/// already destroyed instance from the next unit of work, which registers
/// and destroys it again when it ends. Drop singletons before `end()` to get
/// fresh ones.
pub struct RegisteringProvider<T, P> {
    key: Key,
    scope: SingletonUnitOfWorkScope,
    unscoped: P,
    lifecycle: Lifecycle<T>,
    cached: Mutex<Option<Cached<T>>>,
}

struct Cached<T> {
    value: Weak<T>,
    lease: Arc<Lease>,
}

impl<T, P> RegisteringProvider<T, P>
where
    T: Send + Sync + 'static,
    P: Provider<T>,
{
    pub fn new(key: Key, scope: SingletonUnitOfWorkScope, unscoped: P) -> Self {
        Self {
            key,
            scope,
            unscoped,
            lifecycle: Lifecycle::none(),
            cached: Mutex::new(None),
        }
    }

    /// Records how instances are cleaned up when evicted or at `end()`.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle<T>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    fn out_of_scope(&self) -> ScopeError {
        ScopeError::OutOfScope {
            key: self.key.to_string(),
            scope: self.scope.name(),
        }
    }

    fn obtain(&self) -> ScopeResult<(Arc<T>, Arc<Lease>)> {
        let mut cached = self.cached.lock();
        if let Some(entry) = cached.as_ref() {
            if let Some(value) = entry.lease.upgrade(&entry.value) {
                trace!(key = %self.key, "Singleton cache hit");
                return Ok((value, entry.lease.clone()));
            }
        }
        trace!(key = %self.key, "Singleton cache miss");
        let value = self.unscoped.get()?;
        let lease = Arc::new(Lease::default());
        *cached = Some(Cached {
            value: Arc::downgrade(&value),
            lease: lease.clone(),
        });
        Ok((value, lease))
    }
}

impl<T, P> Provider<T> for RegisteringProvider<T, P>
where
    T: Send + Sync + 'static,
    P: Provider<T>,
{
    fn get(&self) -> ScopeResult<Arc<T>> {
        if !self.scope.is_active() {
            return Err(self.out_of_scope());
        }
        if let Err(err) = self.scope.evict_unowned() {
            error!(key = %self.key, error = %err, "Failed to destroy evicted instance");
        }

        let (value, lease) = self.obtain()?;
        let instance = Instance::with_lifecycle(value.clone(), &self.lifecycle).with_lease(lease);
        match self.scope.register(instance) {
            Ok(()) => Ok(value),
            // The unit of work ended while the value was being obtained
            Err(ScopeError::NotActive { .. }) => Err(self.out_of_scope()),
            Err(err) => Err(err),
        }
    }
}

impl<T, P> fmt::Debug for RegisteringProvider<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteringProvider")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destroy::DefaultDestroyStrategy;
    use crate::error::BoxError;
    use crate::key::key_of_type;
    use crate::traits::Destroyable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);
    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    struct Cache;

    impl Destroyable for Cache {
        fn destroy(&self) -> Result<(), BoxError> {
            DESTROYED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn provider(scope: &SingletonUnitOfWorkScope) -> RegisteringProvider<Cache, impl Provider<Cache>> {
        RegisteringProvider::new(key_of_type::<Cache>(), scope.clone(), || {
            BUILT.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ScopeError>(Arc::new(Cache))
        })
        .with_lifecycle(Lifecycle::<Cache>::builder().destroyable().build())
    }

    #[test]
    fn rebuilds_after_eviction() {
        let scope = SingletonUnitOfWorkScope::new().with_strategy(DefaultDestroyStrategy);
        let provider = provider(&scope);

        assert!(matches!(provider.get(), Err(ScopeError::OutOfScope { .. })));
        assert_eq!(BUILT.load(Ordering::SeqCst), 0);

        scope.begin().unwrap();
        let first = provider.get().unwrap();
        assert!(Arc::ptr_eq(&first, &provider.get().unwrap()));
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);

        drop(first);
        let second = provider.get().unwrap();
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
        assert_eq!(scope.registered_count(), 1);

        drop(second);
        scope.end().unwrap();
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 2);
    }
}
