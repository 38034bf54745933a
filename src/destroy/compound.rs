//! Composition of destroy strategies.

use std::fmt;
use std::sync::Arc;

use super::{
    CloseableDestroyStrategy, DefaultDestroyStrategy, DestroyErrors, DestroyStrategy,
    PreDestroyStrategy,
};
use crate::error::ScopeResult;
use crate::instance::Instance;

/// Applies every contained strategy to each instance.
///
/// Each strategy handles one capability, so an instance that is both
/// destroyable and closeable is released by both. The order in which
/// strategies run is not part of the contract.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{
///     BoxError, Close, CloseableDestroyStrategy, CompoundDestroyStrategy, DefaultDestroyErrors,
///     DestroyErrors, DestroyStrategy, Instance, Lifecycle, PreDestroyStrategy,
/// };
/// use std::io;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Handle {
///     closed: AtomicUsize,
///     flushed: AtomicUsize,
/// }
///
/// impl Close for Handle {
///     fn close(&self) -> io::Result<()> {
///         self.closed.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }
/// }
///
/// let strategy = CompoundDestroyStrategy::new()
///     .with(CloseableDestroyStrategy)
///     .with(PreDestroyStrategy);
///
/// let lifecycle = Lifecycle::<Handle>::builder()
///     .closeable()
///     .pre_destroy(|h: &Handle| {
///         h.flushed.fetch_add(1, Ordering::SeqCst);
///         Ok::<(), BoxError>(())
///     })
///     .build();
///
/// let handle = Arc::new(Handle::default());
/// let mut errors = DefaultDestroyErrors::new();
/// strategy
///     .destroy(&Instance::with_lifecycle(handle.clone(), &lifecycle), &mut errors)
///     .unwrap();
///
/// assert_eq!(handle.closed.load(Ordering::SeqCst), 1);
/// assert_eq!(handle.flushed.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct CompoundDestroyStrategy {
    strategies: Vec<Arc<dyn DestroyStrategy>>,
}

impl CompoundDestroyStrategy {
    /// An empty compound; behaves like the no-op strategy until extended.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default, closeable and pre-destroy strategies combined.
    pub fn standard() -> Self {
        Self::new()
            .with(DefaultDestroyStrategy)
            .with(CloseableDestroyStrategy)
            .with(PreDestroyStrategy)
    }

    /// Builds a compound from shared strategies.
    pub fn from_strategies<I>(strategies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn DestroyStrategy>>,
    {
        Self {
            strategies: strategies.into_iter().collect(),
        }
    }

    pub fn with<S: DestroyStrategy + 'static>(mut self, strategy: S) -> Self {
        self.push(Arc::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Arc<dyn DestroyStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl DestroyStrategy for CompoundDestroyStrategy {
    fn destroy(&self, instance: &Instance, errors: &mut dyn DestroyErrors) -> ScopeResult<()> {
        for strategy in &self.strategies {
            strategy.destroy(instance, errors)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "CompoundDestroyStrategy"
    }
}

impl fmt::Debug for CompoundDestroyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.name()))
            .finish()
    }
}
