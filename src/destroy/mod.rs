//! Pluggable cleanup of scoped instances.
//!
//! A [`DestroyStrategy`] looks at the capabilities recorded in an
//! [`Instance`]'s lifecycle and releases what it knows how to release. Each
//! strategy handles one capability; [`CompoundDestroyStrategy`] composes
//! them. Failures go to a [`DestroyErrors`] collector.

mod compound;
mod errors;
mod strategies;

use std::fmt;

use tracing::error;

use crate::error::ScopeResult;
use crate::instance::Instance;

pub use compound::CompoundDestroyStrategy;
pub use errors::{DefaultDestroyErrors, DestroyErrors, ThrowingDestroyErrors};
pub use strategies::{CloseableDestroyStrategy, DefaultDestroyStrategy, PreDestroyStrategy};

/// Cleanup policy for scoped instances.
///
/// Implementations must report failures through `errors` instead of
/// returning them, and return `Err` only when `errors` asks them to stop.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{DestroyErrors, DestroyStrategy, Instance, ScopeResult};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingStrategy(AtomicUsize);
///
/// impl DestroyStrategy for CountingStrategy {
///     fn destroy(&self, _instance: &Instance, _errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
///         self.0.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
/// ```
pub trait DestroyStrategy: Send + Sync {
    /// Releases whatever `instance` exposes that this strategy handles.
    fn destroy(&self, instance: &Instance, errors: &mut dyn DestroyErrors) -> ScopeResult<()>;

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl fmt::Debug for dyn DestroyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy that does nothing.
///
/// Scopes use it until another strategy is bound, so leaving cleanup
/// unconfigured is safe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoopDestroyStrategy;

impl DestroyStrategy for NoopDestroyStrategy {
    #[inline]
    fn destroy(&self, _instance: &Instance, _errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "NoopDestroyStrategy"
    }
}

/// Runs the destroy capability of `instance`, logging instead of returning
/// any failure.
pub fn destroy_silently(instance: &Instance) {
    let mut errors = DefaultDestroyErrors::new();
    // DefaultDestroyErrors never aborts a pass
    let _ = DefaultDestroyStrategy.destroy(instance, &mut errors);
    for failure in errors.take() {
        error!(instance = %instance, error = %failure.cause, "Failed to destroy scoped value");
    }
}
