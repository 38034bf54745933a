//! Single-capability destroy strategies.

use tracing::trace;

use super::{DestroyErrors, DestroyStrategy};
use crate::error::{DestroyCause, ScopeResult};
use crate::instance::Instance;
use crate::internal::guarded;

/// Runs the [`Destroyable`](crate::Destroyable) capability.
///
/// Errors and panics from `destroy()` are reported, not propagated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DefaultDestroyStrategy;

impl DestroyStrategy for DefaultDestroyStrategy {
    fn destroy(&self, instance: &Instance, errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
        if !instance.is_destroyable() {
            return Ok(());
        }
        trace!(instance = %instance, "Destroying destroyable");
        match guarded(|| instance.run_destroy().map(|r| r.map_err(DestroyCause::Destroy))) {
            Some(Err(cause)) => errors.destroy_error(instance, cause),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "DefaultDestroyStrategy"
    }
}

/// Runs the [`Close`](crate::Close) capability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloseableDestroyStrategy;

impl DestroyStrategy for CloseableDestroyStrategy {
    fn destroy(&self, instance: &Instance, errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
        if !instance.is_closeable() {
            return Ok(());
        }
        trace!(instance = %instance, "Closing closeable");
        match guarded(|| instance.run_close().map(|r| r.map_err(DestroyCause::Close))) {
            Some(Err(cause)) => errors.destroy_error(instance, cause),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "CloseableDestroyStrategy"
    }
}

/// Runs the pre-destroy hooks of an instance in registration order.
///
/// Every hook gets an attempt; each failing hook is reported on its own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreDestroyStrategy;

impl DestroyStrategy for PreDestroyStrategy {
    fn destroy(&self, instance: &Instance, errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
        for index in 0..instance.pre_destroy_count() {
            trace!(instance = %instance, index, "Running pre-destroy hook");
            let outcome = guarded(|| {
                instance
                    .run_pre_destroy(index)
                    .map(|r| r.map_err(|source| DestroyCause::PreDestroy { index, source }))
            });
            if let Some(Err(cause)) = outcome {
                errors.destroy_error(instance, cause)?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PreDestroyStrategy"
    }
}
