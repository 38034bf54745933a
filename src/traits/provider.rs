//! Provider trait shared by the container and the scopes.

use std::sync::Arc;

use crate::error::ScopeResult;

/// Supplies instances of `T`.
///
/// The container hands an *unscoped* provider (fresh instance on every call)
/// to a [`Scope`](crate::Scope) and gets a *scoped* provider back. Both sides
/// use this trait. Closures returning `ScopeResult<Arc<T>>` are providers.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{Provider, ScopeError};
/// use std::sync::Arc;
///
/// struct Connection(u32);
///
/// let unscoped = || Ok::<_, ScopeError>(Arc::new(Connection(7)));
/// assert_eq!(unscoped.get().unwrap().0, 7);
///
/// let failing = || -> Result<Arc<Connection>, ScopeError> {
///     Err(ScopeError::provision("Connection", "pool exhausted"))
/// };
/// assert!(failing.get().is_err());
/// ```
pub trait Provider<T>: Send + Sync {
    /// Returns an instance, or the reason none could be supplied.
    fn get(&self) -> ScopeResult<Arc<T>>;
}

impl<T, F> Provider<T> for F
where
    F: Fn() -> ScopeResult<Arc<T>> + Send + Sync,
{
    #[inline]
    fn get(&self) -> ScopeResult<Arc<T>> {
        self()
    }
}
