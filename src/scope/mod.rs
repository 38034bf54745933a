//! Unit-of-work scopes.
//!
//! A [`UnitOfWorkScope`] owns the active/inactive state of one unit of work
//! and the instances created while it is active. Two variants are provided:
//!
//! - [`ThreadLocalUnitOfWorkScope`]: each thread has its own span and its own
//!   [`ScopeContext`]. One handle can be shared by every thread.
//! - [`SingletonUnitOfWorkScope`]: one span for the whole process, tracking
//!   the instances created by per-key singleton providers.
//!
//! Both implement [`Scope`], the capability the container uses to turn an
//! unscoped provider into a scoped one.

mod singleton;
mod thread_local;
mod unit_of_work;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::ScopeContext;
use crate::error::ScopeResult;
use crate::instance::Lifecycle;
use crate::key::Key;
use crate::traits::Provider;

pub use singleton::SingletonUnitOfWorkScope;
pub use thread_local::ThreadLocalUnitOfWorkScope;
pub use unit_of_work::{with_unit_of_work, UnitOfWorkScopeExt};

/// Control surface of a unit of work.
///
/// `begin` and `end` bracket one span. Misuse fails fast: `begin` on an
/// active scope returns [`AlreadyActive`](crate::ScopeError::AlreadyActive)
/// and `end` on an inactive one returns
/// [`NotActive`](crate::ScopeError::NotActive), in both cases without
/// changing state.
pub trait UnitOfWorkScope: Send + Sync {
    /// Starts a unit of work.
    fn begin(&self) -> ScopeResult<()>;

    /// Whether a unit of work is in progress.
    fn is_active(&self) -> bool;

    /// Ends the unit of work, destroying what it holds.
    ///
    /// The scope is inactive and empty afterwards even when this returns a
    /// [`Destroy`](crate::ScopeError::Destroy) error.
    fn end(&self) -> ScopeResult<()>;
}

impl<S: UnitOfWorkScope + ?Sized> UnitOfWorkScope for Arc<S> {
    fn begin(&self) -> ScopeResult<()> {
        (**self).begin()
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn end(&self) -> ScopeResult<()> {
        (**self).end()
    }
}

/// Wraps unscoped providers so that one instance per key is shared within a
/// unit of work.
pub trait Scope {
    /// Returns the scoped provider for `key`.
    ///
    /// `lifecycle` records how instances from `unscoped` are cleaned up when
    /// the unit of work ends.
    fn scope<T, P>(&self, key: Key, unscoped: P, lifecycle: Lifecycle<T>) -> Arc<dyn Provider<T>>
    where
        T: Send + Sync + 'static,
        P: Provider<T> + 'static;
}

/// A scope that exposes the [`ScopeContext`] of the current unit of work.
///
/// Scoping providers are generic over this trait.
pub trait SupplyingScope: Clone + fmt::Display + Send + Sync + 'static {
    /// Name used in misuse errors.
    fn name(&self) -> &'static str;

    /// Runs `f` against the current context, or returns `None` when no unit
    /// of work is active.
    fn with_context<R>(&self, f: impl FnOnce(&mut ScopeContext) -> R) -> Option<R>;
}

/// Process-unique identity of a scope instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(u64);

impl ScopeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ScopeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}
