//! # ferrous-uow
//!
//! Unit-of-work scoping for dependency-injection containers: bind instances
//! to a bracketed span of execution (one request, one job, one task) and
//! release them together when the span ends.
//!
//! ## Features
//!
//! - **Cached per span**: resolving a key twice within one unit of work
//!   yields the same instance
//! - **Released once**: instances are destroyed exactly once when the unit of
//!   work ends, with every failure collected into one aggregate error
//! - **Fails fast**: resolving a scoped key outside of a unit of work is an
//!   error, never a silent fallback to an unscoped instance
//! - **Thread-local or process-wide**: [`ThreadLocalUnitOfWorkScope`] gives
//!   every thread its own span; [`SingletonUnitOfWorkScope`] spans the process
//! - **Pluggable cleanup**: destroy strategies compose per capability
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_uow::{
//!     key_of_type, BoxError, CompoundDestroyStrategy, Destroyable, Lifecycle, Scope, ScopeError,
//!     ThreadLocalUnitOfWorkScope, UnitOfWorkScope,
//! };
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! struct Transaction {
//!     committed: AtomicBool,
//! }
//!
//! impl Destroyable for Transaction {
//!     fn destroy(&self) -> Result<(), BoxError> {
//!         self.committed.store(true, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! let scope = ThreadLocalUnitOfWorkScope::new().with_strategy(CompoundDestroyStrategy::standard());
//!
//! // The container wraps its unscoped factory once, at binding time
//! let transactions = scope.scope(
//!     key_of_type::<Transaction>(),
//!     || Ok::<_, ScopeError>(Arc::new(Transaction { committed: AtomicBool::new(false) })),
//!     Lifecycle::<Transaction>::builder().destroyable().build(),
//! );
//!
//! scope.begin()?;
//! let tx = transactions.get()?;
//! assert!(Arc::ptr_eq(&tx, &transactions.get()?));
//! scope.end()?;
//!
//! assert!(tx.committed.load(Ordering::SeqCst));
//! # Ok::<(), ScopeError>(())
//! ```
//!
//! ## Bracketing Calls
//!
//! ```rust
//! use ferrous_uow::{ScopeError, ThreadLocalUnitOfWorkScope, UnitOfWorkScope, UnitOfWorkScopeExt};
//!
//! let scope = ThreadLocalUnitOfWorkScope::new();
//!
//! let handled = scope.unit_of_work(|| {
//!     // begin() happened here; end() follows even if this fails or panics
//!     Ok::<_, ScopeError>(scope.is_active())
//! })?;
//!
//! assert!(handled);
//! assert!(!scope.is_active());
//! # Ok::<(), ScopeError>(())
//! ```

// Module declarations
pub mod config;
pub mod context;
pub mod destroy;
pub mod error;
pub mod instance;
pub mod key;
pub mod kind;
pub mod provider;
pub mod scope;
pub mod traits;

// Internal modules
mod internal;

// Re-exports
pub use config::{ScopeConfig, StrategyKind, DEFAULT_ENV_PREFIX};
pub use context::ScopeContext;
pub use destroy::{
    destroy_silently, CloseableDestroyStrategy, CompoundDestroyStrategy, DefaultDestroyErrors,
    DefaultDestroyStrategy, DestroyErrors, DestroyStrategy, NoopDestroyStrategy,
    PreDestroyStrategy, ThrowingDestroyErrors,
};
pub use error::{BoxError, DestroyCause, DestroyFailure, DestroyReport, ScopeError, ScopeResult};
pub use instance::{Instance, InstanceId, Lifecycle, LifecycleBuilder};
pub use key::{key_of_named, key_of_type, Key, KeyEncoder, NoopKeyEncoder};
pub use kind::ScopeKind;
pub use provider::{RegisteringProvider, ScopingProvider};
pub use scope::{
    with_unit_of_work, Scope, SingletonUnitOfWorkScope, SupplyingScope,
    ThreadLocalUnitOfWorkScope, UnitOfWorkScope, UnitOfWorkScopeExt,
};
pub use traits::{Close, Destroyable, Provider};
