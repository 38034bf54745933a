//! Failure collectors for destroy passes.

use tracing::trace;

use crate::error::{DestroyCause, DestroyFailure, DestroyReport, ScopeError, ScopeResult};
use crate::instance::Instance;

/// Collects the failures of one destroy pass.
///
/// Strategies report every failure here instead of returning it, so one
/// misbehaving instance cannot stop the cleanup of its siblings. Whether a
/// report aborts the pass is the collector's decision: `destroy_error`
/// returning `Err` stops the calling strategy.
pub trait DestroyErrors {
    /// Records that destroying `instance` failed with `cause`.
    fn destroy_error(&mut self, instance: &Instance, cause: DestroyCause) -> ScopeResult<()>;

    /// Returns the aggregate failure if anything was recorded.
    ///
    /// Recorded failures are drained, so a second call returns `Ok(())`.
    fn raise_if_any(&mut self) -> ScopeResult<()>;
}

/// Accumulating collector used for batch cleanup at scope end.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{DefaultDestroyErrors, DestroyCause, DestroyErrors, Instance, ScopeError};
/// use std::sync::Arc;
///
/// let mut errors = DefaultDestroyErrors::new();
/// assert!(errors.raise_if_any().is_ok());
///
/// let a = Instance::new(Arc::new(1u8));
/// let b = Instance::new(Arc::new(2u8));
/// errors.destroy_error(&a, DestroyCause::Panic("first".into())).unwrap();
/// errors.destroy_error(&b, DestroyCause::Panic("second".into())).unwrap();
///
/// match errors.raise_if_any() {
///     Err(ScopeError::Destroy(report)) => {
///         assert_eq!(report.len(), 2);
///         assert!(report.contains(a.id()));
///         assert!(report.contains(b.id()));
///     }
///     _ => unreachable!(),
/// }
/// assert!(errors.raise_if_any().is_ok());
/// ```
#[derive(Debug, Default)]
pub struct DefaultDestroyErrors {
    failures: Vec<DestroyFailure>,
}

impl DefaultDestroyErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Takes the recorded failures without raising them.
    pub fn take(&mut self) -> Vec<DestroyFailure> {
        std::mem::take(&mut self.failures)
    }
}

impl DestroyErrors for DefaultDestroyErrors {
    fn destroy_error(&mut self, instance: &Instance, cause: DestroyCause) -> ScopeResult<()> {
        trace!(instance = %instance, error = %cause, "Recorded destroy error");
        self.failures.push(DestroyFailure {
            type_name: instance.type_name(),
            instance: instance.id(),
            cause,
        });
        Ok(())
    }

    fn raise_if_any(&mut self) -> ScopeResult<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ScopeError::Destroy(DestroyReport::new(self.take())))
        }
    }
}

/// Fail-fast collector: the first reported failure aborts the pass.
///
/// Used where accumulation is impossible, such as destroying a single
/// evicted instance.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{DestroyCause, DestroyErrors, Instance, ThrowingDestroyErrors};
/// use std::sync::Arc;
///
/// let instance = Instance::new(Arc::new("x"));
/// let err = ThrowingDestroyErrors
///     .destroy_error(&instance, DestroyCause::Panic("boom".into()))
///     .unwrap_err();
/// assert_eq!(err.destroy_report().unwrap().len(), 1);
/// assert!(ThrowingDestroyErrors.raise_if_any().is_ok());
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThrowingDestroyErrors;

impl DestroyErrors for ThrowingDestroyErrors {
    fn destroy_error(&mut self, instance: &Instance, cause: DestroyCause) -> ScopeResult<()> {
        Err(ScopeError::Destroy(DestroyReport::new(vec![DestroyFailure {
            type_name: instance.type_name(),
            instance: instance.id(),
            cause,
        }])))
    }

    fn raise_if_any(&mut self) -> ScopeResult<()> {
        Ok(())
    }
}
