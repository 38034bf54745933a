//! Error types for unit-of-work scoping.

use std::fmt;

use crate::instance::InstanceId;

/// Boxed error used for failures that originate outside this crate
/// (unscoped providers, destroy hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Scoping errors
///
/// Misuse errors (`AlreadyActive`, `NotActive`, `OutOfScope`) indicate a
/// programming error in the surrounding system and are returned at the call
/// site. Cleanup failures are aggregated into a single [`DestroyReport`] per
/// cleanup pass.
///
/// # Examples
///
/// ```rust
/// use ferrous_uow::{ScopeError, ThreadLocalUnitOfWorkScope, UnitOfWorkScope};
///
/// let scope = ThreadLocalUnitOfWorkScope::new();
/// match scope.end() {
///     Err(ScopeError::NotActive { scope }) => {
///         assert_eq!(scope, "ThreadLocalUnitOfWorkScope");
///     }
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    /// `begin()` called while the scope is already active
    #[error("{scope} already in progress")]
    AlreadyActive { scope: &'static str },
    /// `end()` called while the scope is not active
    #[error("No {scope} block in progress")]
    NotActive { scope: &'static str },
    /// A scoped key was resolved outside of an active scope
    #[error("Can't access {key} outside of a {scope} block")]
    OutOfScope { key: String, scope: &'static str },
    /// An argument was rejected before any state changed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// A bound value could not be downcast to the requested type
    #[error("Type mismatch for {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    /// An unscoped provider failed
    #[error("Failed to provide {key}: {source}")]
    Provision {
        key: String,
        #[source]
        source: BoxError,
    },
    /// One or more instances failed to destroy
    #[error(transparent)]
    Destroy(#[from] DestroyReport),
}

impl ScopeError {
    /// Wraps a foreign provider failure for the given key.
    pub fn provision(key: impl fmt::Display, source: impl Into<BoxError>) -> Self {
        ScopeError::Provision {
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// Returns the destroy report if this is a cleanup failure.
    pub fn destroy_report(&self) -> Option<&DestroyReport> {
        match self {
            ScopeError::Destroy(report) => Some(report),
            _ => None,
        }
    }
}

/// Result type for scoping operations
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Why a single destroy action failed.
#[derive(Debug, thiserror::Error)]
pub enum DestroyCause {
    /// The explicit destroy capability returned an error
    #[error("destroy failed: {0}")]
    Destroy(#[source] BoxError),
    /// The close capability returned an I/O error
    #[error("close failed: {0}")]
    Close(#[source] std::io::Error),
    /// A pre-destroy hook returned an error
    #[error("pre-destroy hook #{index} failed: {source}")]
    PreDestroy {
        index: usize,
        #[source]
        source: BoxError,
    },
    /// A destroy action panicked
    #[error("panicked: {0}")]
    Panic(String),
}

/// One recorded destroy failure.
#[derive(Debug)]
pub struct DestroyFailure {
    /// Type name of the instance that failed to destroy
    pub type_name: &'static str,
    /// Identity of the instance that failed to destroy
    pub instance: InstanceId,
    /// The failure itself
    pub cause: DestroyCause,
}

impl fmt::Display for DestroyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to destroy {} ({}): {}",
            self.type_name, self.instance, self.cause
        )
    }
}

/// Aggregate failure of one cleanup pass.
///
/// Carries every `(instance, cause)` pair recorded while destroying the
/// contents of a scope, in the order they were reported.
#[derive(Debug)]
pub struct DestroyReport {
    failures: Vec<DestroyFailure>,
}

impl DestroyReport {
    pub(crate) fn new(failures: Vec<DestroyFailure>) -> Self {
        debug_assert!(!failures.is_empty());
        Self { failures }
    }

    /// All recorded failures.
    pub fn failures(&self) -> &[DestroyFailure] {
        &self.failures
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Always false for reports produced by this crate.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the report names the given instance.
    pub fn contains(&self, instance: InstanceId) -> bool {
        self.failures.iter().any(|f| f.instance == instance)
    }
}

impl fmt::Display for DestroyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Destroy errors:")?;
        for (i, failure) in self.failures.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "{}) {}", i + 1, failure)?;
        }
        writeln!(f)?;
        if self.failures.len() == 1 {
            write!(f, "1 error")
        } else {
            write!(f, "{} errors", self.failures.len())
        }
    }
}

impl std::error::Error for DestroyReport {}
