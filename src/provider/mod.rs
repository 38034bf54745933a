//! Scoped providers handed back to the container.
//!
//! [`ScopingProvider`] caches one instance per key in the context of the
//! active unit of work. [`RegisteringProvider`] is the process-wide
//! counterpart: a per-key singleton whose instances are registered with a
//! [`SingletonUnitOfWorkScope`](crate::SingletonUnitOfWorkScope).

mod singleton;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use crate::error::{ScopeError, ScopeResult};
use crate::instance::{Instance, Lifecycle};
use crate::key::{Key, KeyEncoder, NoopKeyEncoder};
use crate::scope::SupplyingScope;
use crate::traits::Provider;

pub use singleton::RegisteringProvider;

/// Provider that shares one instance per key within a unit of work.
///
/// On every `get()` the provider looks up the storage key in the scope's
/// current context. A hit returns the bound value without touching the
/// unscoped provider; a miss invokes it once and binds the result if the key
/// is still unbound. Outside of a unit of work `get()` fails with
/// [`ScopeError::OutOfScope`] and nothing is constructed.
///
/// The provider keeps no per-call state and can be shared across threads.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{
///     key_of_named, Key, Provider, ScopeError, ScopingProvider, ThreadLocalUnitOfWorkScope,
///     UnitOfWorkScope,
/// };
/// use std::sync::Arc;
///
/// let scope = ThreadLocalUnitOfWorkScope::new();
/// let provider = ScopingProvider::new(
///     key_of_named::<String>("tenant"),
///     scope.clone(),
///     || Ok::<_, ScopeError>(Arc::new(String::from("acme"))),
/// )
/// .with_encoder(|key: &Key| Key::attribute(format!("tenant:{}", key)).unwrap());
///
/// scope.begin().unwrap();
/// let tenant = provider.get().unwrap();
/// assert_eq!(tenant.as_str(), "acme");
/// assert!(Arc::ptr_eq(&tenant, &provider.get().unwrap()));
/// scope.end().unwrap();
/// ```
pub struct ScopingProvider<S, T, P> {
    key: Key,
    scope: S,
    unscoped: P,
    lifecycle: Lifecycle<T>,
    encoder: Arc<dyn KeyEncoder>,
    _marker: PhantomData<fn() -> T>,
}

impl<S, T, P> ScopingProvider<S, T, P>
where
    S: SupplyingScope,
    T: Send + Sync + 'static,
    P: Provider<T>,
{
    pub fn new(key: Key, scope: S, unscoped: P) -> Self {
        Self {
            key,
            scope,
            unscoped,
            lifecycle: Lifecycle::none(),
            encoder: Arc::new(NoopKeyEncoder),
            _marker: PhantomData,
        }
    }

    /// Records how instances are cleaned up when the unit of work ends.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle<T>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Stores instances under `encoder(key)` instead of `key`.
    pub fn with_encoder<E: KeyEncoder>(mut self, encoder: E) -> Self {
        self.encoder = Arc::new(encoder);
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

    fn downcast(&self, instance: &Instance) -> ScopeResult<Arc<T>> {
        instance
            .downcast::<T>()
            .ok_or_else(|| ScopeError::TypeMismatch {
                key: self.key.to_string(),
                expected: std::any::type_name::<T>(),
                found: instance.type_name(),
            })
    }
}

impl<S, T, P> Provider<T> for ScopingProvider<S, T, P>
where
    S: SupplyingScope,
    T: Send + Sync + 'static,
    P: Provider<T>,
{
    fn get(&self) -> ScopeResult<Arc<T>> {
        let storage_key = self.encoder.encode(&self.key);

        let cached = self
            .scope
            .with_context(|context| context.get(&storage_key).cloned())
            .ok_or_else(|| self.out_of_scope())?;
        if let Some(instance) = cached {
            trace!(key = %self.key, "Scoped cache hit");
            return self.downcast(&instance);
        }

        // The context is released while the unscoped provider runs
        trace!(key = %self.key, "Scoped cache miss");
        let fresh = Instance::with_lifecycle(self.unscoped.get()?, &self.lifecycle);
        let bound = self
            .scope
            .with_context(|context| context.put_if_absent(storage_key, fresh).clone())
            .ok_or_else(|| self.out_of_scope())?;
        self.downcast(&bound)
    }
}

impl<S, T, P> fmt::Debug for ScopingProvider<S, T, P>
where
    S: SupplyingScope,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopingProvider")
            .field("key", &self.key)
            .field("scope", &self.scope.name())
            .finish()
    }
}
