//! Process-wide unit-of-work scope.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{trace, warn};

use super::{Scope, ScopeId, UnitOfWorkScope};
use crate::context::destroy_all;
use crate::destroy::{DestroyStrategy, NoopDestroyStrategy, ThrowingDestroyErrors};
use crate::error::{ScopeError, ScopeResult};
use crate::instance::{Instance, InstanceId, Lifecycle};
use crate::key::Key;
use crate::provider::RegisteringProvider;
use crate::traits::Provider;

const NAME: &str = "SingletonUnitOfWorkScope";

/// A unit of work spanning the whole process.
///
/// Singleton bindings already cache by key, so this scope does not map keys
/// to values. It remembers which instances were created while it is active,
/// at most once each, and destroys them at `end()`.
///
/// The registered set holds one strong reference per instance. An instance
/// whose only remaining owner is the set is *unowned*;
/// [`evict_unowned`](Self::evict_unowned) destroys such instances right away
/// with a fail-fast collector, and `end()` never sees them again. Providers
/// created by [`Scope::scope`] sweep before every resolution.
///
/// An instance stays registered while anyone holds it, and once evicted no
/// [`RegisteringProvider`] hands it out again. A caller that obtained it
/// before the sweep may still briefly see it.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{
///     key_of_type, BoxError, CompoundDestroyStrategy, Destroyable, Lifecycle, Scope, ScopeError,
///     SingletonUnitOfWorkScope, UnitOfWorkScope,
/// };
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// static DESTROYED: AtomicUsize = AtomicUsize::new(0);
///
/// struct Pool;
///
/// impl Destroyable for Pool {
///     fn destroy(&self) -> Result<(), BoxError> {
///         DESTROYED.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// let scope = SingletonUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
/// let pools = scope.scope(
///     key_of_type::<Pool>(),
///     || Ok::<_, ScopeError>(Arc::new(Pool)),
///     Lifecycle::<Pool>::builder().destroyable().build(),
/// );
///
/// scope.begin().unwrap();
/// let a = pools.get().unwrap();
/// let b = pools.get().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// assert_eq!(scope.registered_count(), 1);
///
/// scope.end().unwrap();
/// assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
/// assert_eq!(scope.registered_count(), 0);
/// ```
#[derive(Clone)]
pub struct SingletonUnitOfWorkScope {
    inner: Arc<Inner>,
}

struct Inner {
    id: ScopeId,
    active: AtomicBool,
    // Write-locked by begin/end, read-locked while registering
    lifecycle: RwLock<()>,
    registered: DashMap<InstanceId, Instance>,
    strategy: Arc<dyn DestroyStrategy>,
}

impl SingletonUnitOfWorkScope {
    /// Creates a scope that destroys nothing at `end()`.
    pub fn new() -> Self {
        Self::with_shared_strategy(Arc::new(NoopDestroyStrategy))
    }

    /// Creates a scope that applies `strategy` to its instances.
    pub fn with_shared_strategy(strategy: Arc<dyn DestroyStrategy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ScopeId::next(),
                active: AtomicBool::new(false),
                lifecycle: RwLock::new(()),
                registered: DashMap::new(),
                strategy,
            }),
        }
    }

    /// Returns a new, inactive scope using `strategy`.
    pub fn with_strategy<S: DestroyStrategy + 'static>(self, strategy: S) -> Self {
        Self::with_shared_strategy(Arc::new(strategy))
    }

    /// The strategy applied at `end()` and on eviction.
    pub fn strategy(&self) -> &Arc<dyn DestroyStrategy> {
        &self.inner.strategy
    }

    /// Remembers `instance` for destruction at `end()`.
    ///
    /// Idempotent: an instance already registered is kept once. Fails with
    /// [`ScopeError::NotActive`] outside of a unit of work.
    pub fn register(&self, instance: Instance) -> ScopeResult<()> {
        let _lifecycle = self.inner.lifecycle.read();
        if !self.inner.active.load(Ordering::Acquire) {
            return Err(ScopeError::NotActive { scope: NAME });
        }
        self.inner.registered.entry(instance.id()).or_insert_with(|| {
            trace!(scope = %self.inner.id, instance = %instance, "Registered instance");
            instance
        });
        Ok(())
    }

    /// Whether `instance` is currently registered.
    pub fn is_registered(&self, instance: InstanceId) -> bool {
        self.inner.registered.contains_key(&instance)
    }

    pub fn registered_count(&self) -> usize {
        self.inner.registered.len()
    }

    /// Destroys every registered instance that nothing but this scope owns.
    ///
    /// Each evicted instance leaves the set before it is destroyed, so a
    /// later `end()` does not destroy it again. Destruction uses
    /// [`ThrowingDestroyErrors`]: the first failure is returned at once and
    /// unowned instances not yet visited stay registered. Returns the number
    /// of evicted instances.
    pub fn evict_unowned(&self) -> ScopeResult<usize> {
        let candidates: Vec<InstanceId> = self
            .inner
            .registered
            .iter()
            .filter(|entry| entry.value().owners() == 1)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for id in candidates {
            // Re-checked under the shard lock; retiring keeps caches from handing it out again
            let removed = self
                .inner
                .registered
                .remove_if(&id, |_, instance| instance.retire_if_unowned());
            if let Some((_, instance)) = removed {
                trace!(scope = %self.inner.id, instance = %instance, "Evicting unowned instance");
                evicted += 1;
                self.inner
                    .strategy
                    .destroy(&instance, &mut ThrowingDestroyErrors)?;
            }
        }
        Ok(evicted)
    }

    pub(crate) fn name(&self) -> &'static str {
        NAME
    }
}

impl Default for SingletonUnitOfWorkScope {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWorkScope for SingletonUnitOfWorkScope {
    fn begin(&self) -> ScopeResult<()> {
        let _lifecycle = self.inner.lifecycle.write();
        if self.inner.active.load(Ordering::Acquire) {
            return Err(ScopeError::AlreadyActive { scope: NAME });
        }
        self.inner.active.store(true, Ordering::Release);
        trace!(scope = %self.inner.id, "Unit of work started");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    fn end(&self) -> ScopeResult<()> {
        let instances: Vec<Instance> = {
            let _lifecycle = self.inner.lifecycle.write();
            if !self.inner.active.load(Ordering::Acquire) {
                return Err(ScopeError::NotActive { scope: NAME });
            }
            self.inner.active.store(false, Ordering::Release);
            let ids: Vec<InstanceId> = self.inner.registered.iter().map(|e| *e.key()).collect();
            ids.into_iter()
                .filter_map(|id| self.inner.registered.remove(&id).map(|(_, v)| v))
                .collect()
        };
        trace!(scope = %self.inner.id, instances = instances.len(), "Unit of work ending");
        destroy_all(instances.iter(), self.inner.strategy.as_ref())
    }
}

impl Scope for SingletonUnitOfWorkScope {
    fn scope<T, P>(&self, key: Key, unscoped: P, lifecycle: Lifecycle<T>) -> Arc<dyn Provider<T>>
    where
        T: Send + Sync + 'static,
        P: Provider<T> + 'static,
    {
        Arc::new(RegisteringProvider::new(key, self.clone(), unscoped).with_lifecycle(lifecycle))
    }
}

impl fmt::Display for SingletonUnitOfWorkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NAME)
    }
}

impl fmt::Debug for SingletonUnitOfWorkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(NAME)
            .field("id", &self.inner.id)
            .field("strategy", &self.inner.strategy.name())
            .field("active", &self.is_active())
            .field("registered", &self.registered_count())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.registered.is_empty() {
            warn!(
                scope = %self.id,
                instances = self.registered.len(),
                "SingletonUnitOfWorkScope dropped with undestroyed instances. Call end() before dropping."
            );
        }
    }
}
