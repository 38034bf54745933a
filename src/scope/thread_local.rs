//! Thread-affine unit-of-work scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use super::{Scope, ScopeId, SupplyingScope, UnitOfWorkScope};
use crate::context::ScopeContext;
use crate::destroy::{DestroyStrategy, NoopDestroyStrategy};
use crate::error::{ScopeError, ScopeResult};
use crate::instance::Lifecycle;
use crate::key::Key;
use crate::provider::ScopingProvider;
use crate::traits::Provider;

const NAME: &str = "ThreadLocalUnitOfWorkScope";

thread_local! {
    // Contexts of every thread-local scope active on this thread
    static CONTEXTS: RefCell<HashMap<ScopeId, ScopeContext>> = RefCell::new(HashMap::new());
}

/// A unit of work bound to the calling thread.
///
/// Every thread has its own active flag and its own [`ScopeContext`], so one
/// handle can be shared by any number of threads without locking. Cloning
/// the handle yields the same scope.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{
///     key_of_type, DefaultDestroyStrategy, Lifecycle, Scope, ScopeError, ThreadLocalUnitOfWorkScope,
///     UnitOfWorkScope,
/// };
/// use std::sync::Arc;
///
/// struct Connection;
///
/// let scope = ThreadLocalUnitOfWorkScope::new().with_strategy(DefaultDestroyStrategy);
/// let connections = scope.scope(
///     key_of_type::<Connection>(),
///     || Ok::<_, ScopeError>(Arc::new(Connection)),
///     Lifecycle::none(),
/// );
///
/// assert!(matches!(connections.get(), Err(ScopeError::OutOfScope { .. })));
///
/// scope.begin().unwrap();
/// let a = connections.get().unwrap();
/// let b = connections.get().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
/// scope.end().unwrap();
///
/// assert!(!scope.is_active());
/// ```
#[derive(Clone)]
pub struct ThreadLocalUnitOfWorkScope {
    inner: Arc<Inner>,
}

struct Inner {
    id: ScopeId,
    strategy: Arc<dyn DestroyStrategy>,
}

impl ThreadLocalUnitOfWorkScope {
    /// Creates a scope that destroys nothing at `end()`.
    pub fn new() -> Self {
        Self::with_shared_strategy(Arc::new(NoopDestroyStrategy))
    }

    /// Creates a scope that applies `strategy` to its values at `end()`.
    pub fn with_shared_strategy(strategy: Arc<dyn DestroyStrategy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ScopeId::next(),
                strategy,
            }),
        }
    }

    /// Returns a new scope using `strategy`.
    ///
    /// The result is a distinct scope; spans begun on `self` are not shared
    /// with it.
    pub fn with_strategy<S: DestroyStrategy + 'static>(self, strategy: S) -> Self {
        Self::with_shared_strategy(Arc::new(strategy))
    }

    /// The strategy applied at `end()`.
    pub fn strategy(&self) -> &Arc<dyn DestroyStrategy> {
        &self.inner.strategy
    }
}

impl Default for ThreadLocalUnitOfWorkScope {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitOfWorkScope for ThreadLocalUnitOfWorkScope {
    fn begin(&self) -> ScopeResult<()> {
        let id = self.inner.id;
        CONTEXTS.with(|contexts| {
            let mut contexts = contexts.borrow_mut();
            if contexts.contains_key(&id) {
                return Err(ScopeError::AlreadyActive { scope: NAME });
            }
            contexts.insert(id, ScopeContext::new());
            Ok(())
        })?;
        trace!(scope = %id, "Unit of work started");
        Ok(())
    }

    fn is_active(&self) -> bool {
        CONTEXTS.with(|contexts| contexts.borrow().contains_key(&self.inner.id))
    }

    fn end(&self) -> ScopeResult<()> {
        let id = self.inner.id;
        let mut context = CONTEXTS
            .with(|contexts| contexts.borrow_mut().remove(&id))
            .ok_or(ScopeError::NotActive { scope: NAME })?;
        trace!(scope = %id, values = context.len(), "Unit of work ending");
        // Detached before any destroy hook runs; hooks may begin a new span
        context.destroy_with(self.inner.strategy.as_ref())
    }
}

impl SupplyingScope for ThreadLocalUnitOfWorkScope {
    fn name(&self) -> &'static str {
        NAME
    }

    /// Runs `f` against this thread's context.
    ///
    /// The context is taken out of thread-local storage while `f` runs, so
    /// `f` may call back into the scope: it then sees the scope as inactive.
    fn with_context<R>(&self, f: impl FnOnce(&mut ScopeContext) -> R) -> Option<R> {
        let id = self.inner.id;
        let mut context = CONTEXTS.with(|contexts| contexts.borrow_mut().remove(&id))?;
        let result = f(&mut context);
        let stray = CONTEXTS.with(|contexts| contexts.borrow_mut().insert(id, context));
        if let Some(mut stray) = stray {
            warn!(scope = %id, "Unit of work started while its context was in use; discarding it");
            stray.clear();
        }
        Some(result)
    }
}

impl Scope for ThreadLocalUnitOfWorkScope {
    fn scope<T, P>(&self, key: Key, unscoped: P, lifecycle: Lifecycle<T>) -> Arc<dyn Provider<T>>
    where
        T: Send + Sync + 'static,
        P: Provider<T> + 'static,
    {
        Arc::new(ScopingProvider::new(key, self.clone(), unscoped).with_lifecycle(lifecycle))
    }
}

impl fmt::Display for ThreadLocalUnitOfWorkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NAME)
    }
}

impl fmt::Debug for ThreadLocalUnitOfWorkScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(NAME)
            .field("id", &self.inner.id)
            .field("strategy", &self.inner.strategy.name())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Only this thread's context is reachable; others go with their threads
        let leftover = CONTEXTS
            .try_with(|contexts| contexts.borrow_mut().remove(&self.id))
            .ok()
            .flatten();
        if let Some(mut context) = leftover {
            warn!(
                scope = %self.id,
                values = context.len(),
                "ThreadLocalUnitOfWorkScope dropped during a unit of work. Call end() before dropping."
            );
            context.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of_type;

    #[test]
    fn begin_twice_fails_and_stays_active() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        scope.begin().unwrap();
        assert!(matches!(scope.begin(), Err(ScopeError::AlreadyActive { .. })));
        assert!(scope.is_active());
        scope.end().unwrap();
    }

    #[test]
    fn end_without_begin_fails() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let err = scope.end().unwrap_err();
        assert_eq!(err.to_string(), "No ThreadLocalUnitOfWorkScope block in progress");
        assert!(!scope.is_active());
    }

    #[test]
    fn scopes_are_independent() {
        let a = ThreadLocalUnitOfWorkScope::new();
        let b = ThreadLocalUnitOfWorkScope::new();
        a.begin().unwrap();
        assert!(!b.is_active());
        assert!(a.clone().is_active());
        a.end().unwrap();
    }

    #[test]
    fn context_is_reachable_while_active() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        assert!(scope.with_context(|_| ()).is_none());

        scope.begin().unwrap();
        scope
            .with_context(|context| context.set(key_of_type::<u8>(), Arc::new(3u8)))
            .unwrap();
        let len = scope.with_context(|context| context.len()).unwrap();
        assert_eq!(len, 1);
        scope.end().unwrap();
        assert!(scope.with_context(|context| context.len()).is_none());
    }

    #[test]
    fn reentrant_access_sees_inactive_scope() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        scope.begin().unwrap();
        let nested = scope.with_context(|_| scope.is_active()).unwrap();
        assert!(!nested);
        assert!(scope.is_active());
        scope.end().unwrap();
    }

    #[test]
    fn dropping_active_scope_releases_context() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let id = scope.inner.id;
        scope.begin().unwrap();
        drop(scope);
        assert!(CONTEXTS.with(|contexts| !contexts.borrow().contains_key(&id)));
    }
}
