//! Unit-of-work scope kinds.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::ScopeError;

/// Which span a unit of work covers
///
/// # Kind Characteristics
///
/// - **ThreadLocal**: one span per thread; a handle is shared freely and
///   threads never see each other's instances
/// - **Process**: one span for the whole process; instances are tracked by
///   identity and destroyed together
///
/// # Examples
///
/// ```rust
/// use ferrous_uow::ScopeKind;
///
/// let kind: ScopeKind = "process".parse().unwrap();
/// assert_eq!(kind, ScopeKind::Process);
/// assert_eq!(ScopeKind::default().to_string(), "thread-local");
/// assert!("request".parse::<ScopeKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "kebab-case"))]
pub enum ScopeKind {
    /// Span and context private to the calling thread
    ///
    /// Backed by [`ThreadLocalUnitOfWorkScope`](crate::ThreadLocalUnitOfWorkScope).
    #[default]
    ThreadLocal,
    /// One span for the whole process
    ///
    /// Backed by [`SingletonUnitOfWorkScope`](crate::SingletonUnitOfWorkScope).
    /// Instances whose only owner is the scope are evicted and destroyed
    /// before the span ends.
    Process,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::ThreadLocal => "thread-local",
            ScopeKind::Process => "process",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "thread-local" | "thread" => Ok(ScopeKind::ThreadLocal),
            "process" | "singleton" => Ok(ScopeKind::Process),
            other => Err(ScopeError::InvalidArgument(format!(
                "unknown scope kind '{}'",
                other
            ))),
        }
    }
}
