//! Capability and provider traits.

mod destroy;
mod provider;

pub use destroy::{Destroyable, Close};
pub use provider::Provider;
