//! Dependency keys and key encoders.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::error::{ScopeError, ScopeResult};

/// Key for scoped storage and lookup.
///
/// Keys identify what is being resolved. The container hands them to a scope
/// together with the unscoped provider; the scope only compares and hashes
/// them. Direct [`ScopeContext`](crate::ScopeContext) users may also store
/// free-form attributes.
///
/// # Key Types
///
/// - **Type**: a concrete type
/// - **TypeNamed**: a concrete type plus a qualifier name
/// - **Attribute**: a named context attribute, not tied to a type
///
/// # Examples
///
/// ```rust
/// use ferrous_uow::{Key, key_of_type, key_of_named};
///
/// struct Database;
///
/// let a = key_of_type::<Database>();
/// let b = key_of_type::<Database>();
/// assert_eq!(a, b);
///
/// let primary = key_of_named::<Database>("primary");
/// assert_ne!(a, primary);
/// assert_eq!(primary.qualifier(), Some("primary"));
///
/// let attr = Key::attribute("request.id").unwrap();
/// assert_eq!(attr.to_string(), "Key[attribute=request.id]");
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    /// Concrete type key with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// Qualified concrete type key with TypeId, type name, and qualifier
    TypeNamed(TypeId, &'static str, &'static str),
    /// Free-form context attribute
    Attribute(Arc<str>),
}

impl Key {
    /// Creates an attribute key.
    ///
    /// Fails with [`ScopeError::InvalidArgument`] for an empty name.
    pub fn attribute(name: impl Into<Arc<str>>) -> ScopeResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ScopeError::InvalidArgument(
                "attribute name must not be empty".to_string(),
            ));
        }
        Ok(Key::Attribute(name))
    }

    /// Get the type name (or attribute name) for display
    pub fn display_name(&self) -> &str {
        match self {
            Key::Type(_, name) => name,
            Key::TypeNamed(_, name, _) => name,
            Key::Attribute(name) => name,
        }
    }

    /// Get the qualifier for qualified keys, or None otherwise
    pub fn qualifier(&self) -> Option<&'static str> {
        match self {
            Key::TypeNamed(_, _, name) => Some(name),
            Key::Type(_, _) | Key::Attribute(_) => None,
        }
    }
}

// TypeId-only comparison for concrete types; the name is for diagnostics
impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::TypeNamed(a, _, name_a), Key::TypeNamed(b, _, name_b)) => {
                a == b && name_a == name_b
            }
            (Key::Attribute(a), Key::Attribute(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::TypeNamed(id, _, name) => {
                1u8.hash(state);
                id.hash(state);
                name.hash(state);
            }
            Key::Attribute(name) => {
                2u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Type(_, name) => write!(f, "Key[type={}]", name),
            Key::TypeNamed(_, name, qualifier) => {
                write!(f, "Key[type={}, name={}]", name, qualifier)
            }
            Key::Attribute(name) => write!(f, "Key[attribute={}]", name),
        }
    }
}

#[inline(always)]
pub fn key_of_type<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

#[inline(always)]
pub fn key_of_named<T: 'static>(name: &'static str) -> Key {
    Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name)
}

/// Maps a dependency key to the key used inside a scope context.
///
/// Closures `Fn(&Key) -> Key` implement this trait.
pub trait KeyEncoder: Send + Sync + 'static {
    /// Returns the storage key for `key`.
    fn encode(&self, key: &Key) -> Key;
}

impl<F> KeyEncoder for F
where
    F: Fn(&Key) -> Key + Send + Sync + 'static,
{
    fn encode(&self, key: &Key) -> Key {
        self(key)
    }
}

/// Identity encoder, the default for every scoping provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoopKeyEncoder;

impl KeyEncoder for NoopKeyEncoder {
    #[inline]
    fn encode(&self, key: &Key) -> Key {
        key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn qualified_keys_differ_by_qualifier() {
        let a = key_of_named::<u32>("a");
        let b = key_of_named::<u32>("b");
        assert_ne!(a, b);
        assert_ne!(a, key_of_type::<u32>());
        assert_eq!(a, key_of_named::<u32>("a"));
    }

    #[test]
    fn keys_hash_consistently() {
        let mut set = HashSet::new();
        set.insert(key_of_type::<String>());
        set.insert(key_of_type::<String>());
        set.insert(Key::attribute("x").unwrap());
        set.insert(Key::attribute("x").unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn empty_attribute_is_rejected() {
        assert!(matches!(
            Key::attribute(""),
            Err(ScopeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn noop_encoder_is_identity() {
        let key = key_of_named::<u8>("port");
        assert_eq!(NoopKeyEncoder.encode(&key), key);
    }

    #[test]
    fn closures_are_encoders() {
        let strip = |key: &Key| match key {
            Key::TypeNamed(id, name, _) => Key::Type(*id, *name),
            other => other.clone(),
        };
        assert_eq!(strip.encode(&key_of_named::<u8>("x")), key_of_type::<u8>());
    }
}
