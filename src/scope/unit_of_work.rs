//! Bracketing a call in a unit of work.

use tracing::{error, trace};

use super::UnitOfWorkScope;
use crate::error::ScopeError;

/// Runs `f` inside a unit of work of `scope`.
///
/// If `scope` is already active, `f` joins the unit of work in progress and
/// the scope is left as it is. Otherwise a unit of work is begun for `f` and
/// ended afterwards, also when `f` fails or panics.
///
/// When `f` succeeds, a failing `end()` is returned. When `f` fails, its
/// error is returned and a failing `end()` is only logged.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{with_unit_of_work, ScopeError, ThreadLocalUnitOfWorkScope, UnitOfWorkScope};
///
/// let scope = ThreadLocalUnitOfWorkScope::new();
///
/// let nested = with_unit_of_work(&scope, || {
///     assert!(scope.is_active());
///     // Joins the outer unit of work
///     with_unit_of_work(&scope, || Ok::<_, ScopeError>(scope.is_active()))
/// })
/// .unwrap();
///
/// assert!(nested);
/// assert!(!scope.is_active());
/// ```
pub fn with_unit_of_work<S, F, R, E>(scope: &S, f: F) -> Result<R, E>
where
    S: UnitOfWorkScope + ?Sized,
    F: FnOnce() -> Result<R, E>,
    E: From<ScopeError>,
{
    if scope.is_active() {
        trace!("Joining unit of work in progress");
        return f();
    }

    scope.begin()?;
    let guard = EndOnUnwind { scope };
    let result = f();
    std::mem::forget(guard);

    match (result, scope.end()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(end)) => Err(end.into()),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(end)) => {
            error!(error = %end, "Failed to end unit of work after a failed call");
            Err(err)
        }
    }
}

// Ends the unit of work if the bracketed call unwinds
struct EndOnUnwind<'a, S: UnitOfWorkScope + ?Sized> {
    scope: &'a S,
}

impl<S: UnitOfWorkScope + ?Sized> Drop for EndOnUnwind<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.scope.end() {
            error!(error = %err, "Failed to end unit of work after a panic");
        }
    }
}

/// Method form of [`with_unit_of_work`] for every scope.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{ScopeError, SingletonUnitOfWorkScope, UnitOfWorkScope, UnitOfWorkScopeExt};
///
/// let scope = SingletonUnitOfWorkScope::new();
/// let answer = scope.unit_of_work(|| Ok::<_, ScopeError>(42)).unwrap();
/// assert_eq!(answer, 42);
/// assert!(!scope.is_active());
/// ```
pub trait UnitOfWorkScopeExt: UnitOfWorkScope {
    /// Runs `f` inside a unit of work of this scope.
    fn unit_of_work<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce() -> Result<R, E>,
        E: From<ScopeError>,
    {
        with_unit_of_work(self, f)
    }
}

impl<S: UnitOfWorkScope + ?Sized> UnitOfWorkScopeExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ThreadLocalUnitOfWorkScope;
    use std::panic::{self, AssertUnwindSafe};

    #[derive(Debug)]
    enum AppError {
        Scope(ScopeError),
        Business(&'static str),
    }

    impl From<ScopeError> for AppError {
        fn from(err: ScopeError) -> Self {
            AppError::Scope(err)
        }
    }

    #[test]
    fn ends_after_failure() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let result: Result<(), AppError> =
            with_unit_of_work(&scope, || Err(AppError::Business("rejected")));
        assert!(matches!(result, Err(AppError::Business("rejected"))));
        assert!(!scope.is_active());
    }

    #[test]
    fn ends_after_panic() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: Result<(), ScopeError> = with_unit_of_work(&scope, || panic!("handler bug"));
        }));
        assert!(outcome.is_err());
        assert!(!scope.is_active());
    }

    #[test]
    fn leaves_outer_unit_of_work_open() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        scope.begin().unwrap();
        scope.unit_of_work(|| Ok::<_, AppError>(())).unwrap();
        assert!(scope.is_active());
        scope.end().unwrap();
    }

    #[test]
    fn scope_errors_convert() {
        let scope = ThreadLocalUnitOfWorkScope::new();
        let result: Result<(), AppError> = with_unit_of_work(&scope, || {
            // Ending early makes the closing end() fail
            scope.end()?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(AppError::Scope(ScopeError::NotActive { .. }))
        ));
    }
}
