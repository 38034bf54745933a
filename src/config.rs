//! Scope configuration.
//!
//! A [`ScopeConfig`] selects the kind of unit of work and the destroy
//! strategies it applies. It can be built in code, read from the
//! environment, or (with the `config` feature) parsed from JSON.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::destroy::{
    CloseableDestroyStrategy, CompoundDestroyStrategy, DefaultDestroyStrategy, DestroyStrategy,
    NoopDestroyStrategy, PreDestroyStrategy,
};
use crate::error::{ScopeError, ScopeResult};
use crate::kind::ScopeKind;
use crate::scope::{SingletonUnitOfWorkScope, ThreadLocalUnitOfWorkScope, UnitOfWorkScope};

/// Environment prefix read by [`ScopeConfig::from_env`].
pub const DEFAULT_ENV_PREFIX: &str = "FERROUS_UOW";

/// A built-in destroy strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "kebab-case"))]
pub enum StrategyKind {
    /// [`DefaultDestroyStrategy`]
    Default,
    /// [`CloseableDestroyStrategy`]
    Closeable,
    /// [`PreDestroyStrategy`]
    PreDestroy,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Default => "default",
            StrategyKind::Closeable => "closeable",
            StrategyKind::PreDestroy => "pre-destroy",
        }
    }

    /// Instantiates the strategy.
    pub fn build(&self) -> Arc<dyn DestroyStrategy> {
        match self {
            StrategyKind::Default => Arc::new(DefaultDestroyStrategy),
            StrategyKind::Closeable => Arc::new(CloseableDestroyStrategy),
            StrategyKind::PreDestroy => Arc::new(PreDestroyStrategy),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "default" | "destroyable" => Ok(StrategyKind::Default),
            "closeable" | "close" => Ok(StrategyKind::Closeable),
            "pre-destroy" | "predestroy" => Ok(StrategyKind::PreDestroy),
            other => Err(ScopeError::InvalidArgument(format!(
                "unknown destroy strategy '{}'",
                other
            ))),
        }
    }
}

/// Configuration of one unit-of-work scope.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{ScopeConfig, ScopeKind, StrategyKind, UnitOfWorkScope};
///
/// let config = ScopeConfig::default();
/// assert_eq!(config.kind, ScopeKind::ThreadLocal);
/// assert_eq!(config.strategies, vec![StrategyKind::Default]);
///
/// let config = ScopeConfig::new(ScopeKind::Process)
///     .with_strategy(StrategyKind::Closeable)
///     .with_strategy(StrategyKind::PreDestroy);
/// assert_eq!(config.build_strategy().name(), "CompoundDestroyStrategy");
///
/// let scope = config.build();
/// scope.begin().unwrap();
/// assert!(scope.is_active());
/// scope.end().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ScopeConfig {
    /// Which span the unit of work covers
    pub kind: ScopeKind,
    /// Destroy strategies applied at the end of the unit of work
    pub strategies: Vec<StrategyKind>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            kind: ScopeKind::ThreadLocal,
            strategies: vec![StrategyKind::Default],
        }
    }
}

impl ScopeConfig {
    /// A configuration of `kind` without any destroy strategy.
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            strategies: Vec::new(),
        }
    }

    /// Adds `strategy`, ignoring duplicates.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        if !self.strategies.contains(&strategy) {
            self.strategies.push(strategy);
        }
        self
    }

    /// Reads `FERROUS_UOW_KIND` and `FERROUS_UOW_STRATEGIES`.
    pub fn from_env() -> ScopeResult<Self> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Reads `<PREFIX>_KIND` and comma-separated `<PREFIX>_STRATEGIES`.
    ///
    /// Unset variables keep their defaults. An empty strategy list selects
    /// no strategy.
    pub fn from_env_with_prefix(prefix: &str) -> ScopeResult<Self> {
        let prefix = prefix.to_uppercase();
        let mut config = Self::default();

        if let Ok(kind) = env::var(format!("{}_KIND", prefix)) {
            config.kind = kind.parse()?;
        }
        if let Ok(strategies) = env::var(format!("{}_STRATEGIES", prefix)) {
            config.strategies = Vec::new();
            for name in strategies.split(',').filter(|s| !s.trim().is_empty()) {
                config = config.with_strategy(name.parse()?);
            }
        }
        Ok(config)
    }

    /// Parses a JSON document such as
    /// `{"kind": "process", "strategies": ["closeable", "pre-destroy"]}`.
    #[cfg(feature = "config")]
    pub fn from_json(json: &str) -> ScopeResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScopeError::InvalidArgument(format!("invalid scope configuration: {}", e)))
    }

    /// The destroy strategy described by `strategies`.
    ///
    /// No entry yields [`NoopDestroyStrategy`], one entry that strategy, more
    /// a [`CompoundDestroyStrategy`].
    pub fn build_strategy(&self) -> Arc<dyn DestroyStrategy> {
        match self.strategies.as_slice() {
            [] => Arc::new(NoopDestroyStrategy),
            [single] => single.build(),
            many => Arc::new(CompoundDestroyStrategy::from_strategies(
                many.iter().map(StrategyKind::build),
            )),
        }
    }

    /// A thread-local scope with the configured strategy, whatever `kind` is.
    pub fn build_thread_local(&self) -> ThreadLocalUnitOfWorkScope {
        ThreadLocalUnitOfWorkScope::with_shared_strategy(self.build_strategy())
    }

    /// A process-wide scope with the configured strategy, whatever `kind` is.
    pub fn build_singleton(&self) -> SingletonUnitOfWorkScope {
        SingletonUnitOfWorkScope::with_shared_strategy(self.build_strategy())
    }

    /// The scope selected by `kind`.
    pub fn build(&self) -> Arc<dyn UnitOfWorkScope> {
        match self.kind {
            ScopeKind::ThreadLocal => Arc::new(self.build_thread_local()),
            ScopeKind::Process => Arc::new(self.build_singleton()),
        }
    }
}
