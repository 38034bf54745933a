//! Cleanup capability traits.

use crate::error::BoxError;

/// Explicit destroy lifecycle.
///
/// Implement this trait for scoped services that need structured teardown
/// (flushing caches, returning leases). The capability is recorded when the
/// binding is registered with [`LifecycleBuilder::destroyable`], and
/// [`DefaultDestroyStrategy`](crate::DefaultDestroyStrategy) invokes it when
/// the owning scope ends.
///
/// # Examples
///
/// ```
/// use ferrous_uow::{Destroyable, BoxError, Lifecycle};
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Destroyable for Cache {
///     fn destroy(&self) -> Result<(), BoxError> {
///         println!("Flushing cache: {}", self.name);
///         Ok(())
///     }
/// }
///
/// let lifecycle = Lifecycle::<Cache>::builder().destroyable().build();
/// assert!(lifecycle.is_destroyable());
/// ```
///
/// [`LifecycleBuilder::destroyable`]: crate::LifecycleBuilder::destroyable
pub trait Destroyable: Send + Sync + 'static {
    /// Releases the resources held by this instance.
    fn destroy(&self) -> Result<(), BoxError>;
}

/// Closeable resource handle.
///
/// Released by [`CloseableDestroyStrategy`](crate::CloseableDestroyStrategy).
///
/// # Examples
///
/// ```
/// use ferrous_uow::{Close, Lifecycle};
/// use std::io;
///
/// struct Socket;
///
/// impl Close for Socket {
///     fn close(&self) -> io::Result<()> {
///         Ok(())
///     }
/// }
///
/// let lifecycle = Lifecycle::<Socket>::builder().closeable().build();
/// assert!(lifecycle.is_closeable());
/// ```
pub trait Close: Send + Sync + 'static {
    /// Closes the underlying resource.
    fn close(&self) -> std::io::Result<()>;
}
