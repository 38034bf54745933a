//! Scoped instances and their cleanup capabilities.
//!
//! A value stored in a scope is type-erased, so the capabilities a destroy
//! strategy looks for cannot be probed at cleanup time. Instead they are
//! recorded once, when the binding is registered, in a [`Lifecycle`], and
//! travel with the value as part of its [`Instance`].

use std::any::Any;
use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::BoxError;
use crate::traits::{Close, Destroyable};

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

type ErasedDestroy = fn(&(dyn Any + Send + Sync)) -> Option<Result<(), BoxError>>;
type ErasedClose = fn(&(dyn Any + Send + Sync)) -> Option<io::Result<()>>;
type ErasedHook = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Result<(), BoxError> + Send + Sync>;

fn destroy_erased<T: Destroyable>(value: &(dyn Any + Send + Sync)) -> Option<Result<(), BoxError>> {
    value.downcast_ref::<T>().map(Destroyable::destroy)
}

fn close_erased<T: Close>(value: &(dyn Any + Send + Sync)) -> Option<io::Result<()>> {
    value.downcast_ref::<T>().map(Close::close)
}

#[derive(Default)]
struct Hooks {
    destroy: Option<ErasedDestroy>,
    close: Option<ErasedClose>,
    pre_destroy: Vec<ErasedHook>,
}

impl Hooks {
    fn is_empty(&self) -> bool {
        self.destroy.is_none() && self.close.is_none() && self.pre_destroy.is_empty()
    }
}

/// Cleanup capabilities of a `T`, recorded at registration time.
///
/// Cheap to clone; every instance created from the same binding shares one
/// capability record.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{BoxError, Close, Destroyable, Lifecycle};
/// use std::io;
///
/// struct Session;
///
/// impl Destroyable for Session {
///     fn destroy(&self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// impl Close for Session {
///     fn close(&self) -> io::Result<()> { Ok(()) }
/// }
///
/// let lifecycle = Lifecycle::<Session>::builder()
///     .destroyable()
///     .closeable()
///     .pre_destroy(|_session| Ok(()))
///     .build();
///
/// assert!(lifecycle.is_destroyable());
/// assert!(lifecycle.is_closeable());
/// assert_eq!(lifecycle.pre_destroy_count(), 1);
/// assert!(Lifecycle::<Session>::none().is_none());
/// ```
pub struct Lifecycle<T> {
    hooks: Option<Arc<Hooks>>,
    _marker: PhantomData<fn(&T)>,
}

impl<T> Lifecycle<T> {
    /// A lifecycle without any cleanup capability.
    pub fn none() -> Self {
        Self {
            hooks: None,
            _marker: PhantomData,
        }
    }

    /// Whether no capability is recorded.
    pub fn is_none(&self) -> bool {
        self.hooks.is_none()
    }

    pub fn is_destroyable(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.destroy.is_some())
    }

    pub fn is_closeable(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.close.is_some())
    }

    pub fn pre_destroy_count(&self) -> usize {
        self.hooks.as_ref().map_or(0, |h| h.pre_destroy.len())
    }
}

impl<T: Send + Sync + 'static> Lifecycle<T> {
    /// Starts recording capabilities for `T`.
    pub fn builder() -> LifecycleBuilder<T> {
        LifecycleBuilder {
            hooks: Hooks::default(),
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for Lifecycle<T> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self::none()
    }
}

impl<T> fmt::Debug for Lifecycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("type", &std::any::type_name::<T>())
            .field("destroyable", &self.is_destroyable())
            .field("closeable", &self.is_closeable())
            .field("pre_destroy", &self.pre_destroy_count())
            .finish()
    }
}

/// Builder for [`Lifecycle`].
///
/// Pre-destroy hooks run in the order they are added. Register the hooks of
/// the parts a type is built from before the type's own hooks so that base
/// cleanup runs first.
pub struct LifecycleBuilder<T> {
    hooks: Hooks,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Send + Sync + 'static> LifecycleBuilder<T> {
    /// Records the [`Destroyable`] capability.
    pub fn destroyable(mut self) -> Self
    where
        T: Destroyable,
    {
        self.hooks.destroy = Some(destroy_erased::<T>);
        self
    }

    /// Records the [`Close`] capability.
    pub fn closeable(mut self) -> Self
    where
        T: Close,
    {
        self.hooks.close = Some(close_erased::<T>);
        self
    }

    /// Appends a hook that runs before the instance is destroyed.
    pub fn pre_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.hooks.pre_destroy.push(Arc::new(move |value| {
            match value.downcast_ref::<T>() {
                Some(value) => hook(value),
                None => Ok(()),
            }
        }));
        self
    }

    pub fn build(self) -> Lifecycle<T> {
        Lifecycle {
            hooks: if self.hooks.is_empty() {
                None
            } else {
                Some(Arc::new(self.hooks))
            },
            _marker: PhantomData,
        }
    }
}

/// Identity of a scoped instance (the address of the shared value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(usize);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance@{:#x}", self.0)
    }
}

/// A type-erased scoped value together with its cleanup capabilities.
///
/// Cloning an `Instance` clones the shared reference, not the value.
///
/// # Examples
///
/// ```
/// use ferrous_uow::Instance;
/// use std::sync::Arc;
///
/// let value = Arc::new(String::from("hello"));
/// let instance = Instance::new(value.clone());
///
/// let back = instance.downcast::<String>().unwrap();
/// assert!(Arc::ptr_eq(&value, &back));
/// assert!(instance.downcast::<u32>().is_none());
/// assert!(!instance.is_destroyable());
/// ```
#[derive(Clone)]
pub struct Instance {
    value: AnyArc,
    type_name: &'static str,
    hooks: Option<Arc<Hooks>>,
    lease: Option<Arc<Lease>>,
}

/// Ties a weak cache entry to the registered instance it points at.
///
/// Upgrading through the lease and retiring it are serialized, so once an
/// instance is retired no cache can hand it out again.
#[derive(Debug, Default)]
pub(crate) struct Lease {
    retired: Mutex<bool>,
}

impl Lease {
    /// Upgrades `weak` unless the lease was retired.
    pub(crate) fn upgrade<T>(&self, weak: &Weak<T>) -> Option<Arc<T>> {
        let retired = self.retired.lock();
        if *retired {
            return None;
        }
        weak.upgrade()
    }
}

impl Instance {
    /// Wraps a value without cleanup capabilities.
    pub fn new<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            hooks: None,
            lease: None,
        }
    }

    /// Wraps a value with the capabilities recorded in `lifecycle`.
    pub fn with_lifecycle<T: Send + Sync + 'static>(value: Arc<T>, lifecycle: &Lifecycle<T>) -> Self {
        Self {
            value,
            type_name: std::any::type_name::<T>(),
            hooks: lifecycle.hooks.clone(),
            lease: None,
        }
    }

    pub fn id(&self) -> InstanceId {
        InstanceId(Arc::as_ptr(&self.value) as *const () as usize)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the value as `Arc<T>` if it is a `T`.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Whether both handles share the same value.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.id() == other.id()
    }

    /// Number of strong references to the shared value, this handle included.
    pub(crate) fn owners(&self) -> usize {
        Arc::strong_count(&self.value)
    }

    pub(crate) fn with_lease(mut self, lease: Arc<Lease>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Retires the instance if this handle is its only owner.
    ///
    /// With a lease, the owner count is read under the lease lock, so no
    /// cache can upgrade between the check and the retirement.
    pub(crate) fn retire_if_unowned(&self) -> bool {
        match &self.lease {
            Some(lease) => {
                let mut retired = lease.retired.lock();
                if *retired || self.owners() != 1 {
                    return false;
                }
                *retired = true;
                true
            }
            None => self.owners() == 1,
        }
    }

    pub fn is_destroyable(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.destroy.is_some())
    }

    pub fn is_closeable(&self) -> bool {
        self.hooks.as_ref().is_some_and(|h| h.close.is_some())
    }

    pub fn pre_destroy_count(&self) -> usize {
        self.hooks.as_ref().map_or(0, |h| h.pre_destroy.len())
    }

    /// Runs the destroy capability, or returns `None` if there is none.
    pub fn run_destroy(&self) -> Option<Result<(), BoxError>> {
        let destroy = self.hooks.as_ref()?.destroy?;
        destroy(self.value.as_ref())
    }

    /// Runs the close capability, or returns `None` if there is none.
    pub fn run_close(&self) -> Option<io::Result<()>> {
        let close = self.hooks.as_ref()?.close?;
        close(self.value.as_ref())
    }

    /// Runs the pre-destroy hook at `index`, or returns `None` if there is none.
    pub fn run_pre_destroy(&self, index: usize) -> Option<Result<(), BoxError>> {
        let hook = self.hooks.as_ref()?.pre_destroy.get(index)?;
        Some(hook(self.value.as_ref()))
    }
}

impl<T: Send + Sync + 'static> From<Arc<T>> for Instance {
    fn from(value: Arc<T>) -> Self {
        Instance::new(value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("id", &self.id())
            .field("destroyable", &self.is_destroyable())
            .field("closeable", &self.is_closeable())
            .field("pre_destroy", &self.pre_destroy_count())
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.type_name, self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        destroyed: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                destroyed: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
            }
        }
    }

    impl Destroyable for Probe {
        fn destroy(&self) -> Result<(), BoxError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl Close for Probe {
        fn close(&self) -> io::Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn capabilities_follow_the_instance() {
        let lifecycle = Lifecycle::<Probe>::builder().destroyable().closeable().build();
        let probe = Arc::new(Probe::new());
        let instance = Instance::with_lifecycle(probe.clone(), &lifecycle);

        assert!(instance.run_destroy().unwrap().is_ok());
        assert!(instance.run_close().unwrap().is_err());
        assert!(instance.run_pre_destroy(0).is_none());
        assert_eq!(probe.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(probe.closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_builder_builds_none() {
        let lifecycle = Lifecycle::<Probe>::builder().build();
        assert!(lifecycle.is_none());
        let instance = Instance::with_lifecycle(Arc::new(Probe::new()), &lifecycle);
        assert!(instance.run_destroy().is_none());
        assert!(instance.run_close().is_none());
    }

    #[test]
    fn identity_is_shared_value() {
        let value = Arc::new(5u8);
        let a = Instance::new(value.clone());
        let b = Instance::from(value);
        let c = Instance::new(Arc::new(5u8));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.owners(), 2);
    }

    #[test]
    fn pre_destroy_hooks_keep_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());
        let lifecycle = Lifecycle::<Probe>::builder()
            .pre_destroy(move |_| {
                first.lock().push("base");
                Ok(())
            })
            .pre_destroy(move |_| {
                second.lock().push("derived");
                Ok(())
            })
            .build();
        let instance = Instance::with_lifecycle(Arc::new(Probe::new()), &lifecycle);
        for i in 0..instance.pre_destroy_count() {
            instance.run_pre_destroy(i).unwrap().unwrap();
        }
        assert_eq!(*order.lock(), vec!["base", "derived"]);
    }

    #[test]
    fn retired_lease_blocks_upgrade() {
        let lease = Arc::new(Lease::default());
        let value = Arc::new(Probe::new());
        let weak = Arc::downgrade(&value);
        let instance = Instance::new(value.clone()).with_lease(lease.clone());

        // The caller still owns it
        assert!(!instance.retire_if_unowned());
        assert!(lease.upgrade(&weak).is_some());

        drop(value);
        assert!(instance.retire_if_unowned());
        // Still alive through the instance, but no longer handed out
        assert!(weak.upgrade().is_some());
        assert!(lease.upgrade(&weak).is_none());
        assert!(!instance.retire_if_unowned());
    }
}
