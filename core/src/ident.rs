//! Type-erased effect identity tokens.
//!
//! Callers correlate directives to running workers with whatever hashable
//! token suits them (a string, an enum case, an integer). The loop stores a
//! single uniform key type internally, so the token is boxed behind
//! [`EffectId`] with equality and hashing delegated to the token itself.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of an identity token.
trait Token: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Token) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> Token for T
where
    T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Token) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        // Tokens of different types never compare equal, so their hashes
        // must diverge too: fold the concrete type into the hash.
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }

    fn dyn_fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An opaque, hashable correlation key for effect directives.
///
/// Two identities are equal iff their underlying tokens have the same type
/// and are equal under the token's own `Eq`. Identities are trusted opaque
/// values: the loop never inspects them beyond equality and hashing, and
/// reusing one token across unrelated effect families is the caller's
/// responsibility to avoid.
///
/// # Examples
///
/// ```
/// use flowstore_core::EffectId;
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// enum RequestId {
///     Search,
///     Profile,
/// }
///
/// let a = EffectId::new(RequestId::Search);
/// let b = EffectId::new(RequestId::Search);
/// assert_eq!(a, b);
/// assert_ne!(a, EffectId::new(RequestId::Profile));
///
/// // Same rendering, different token type: different identity.
/// assert_ne!(EffectId::from("1"), EffectId::new(1_u64));
/// ```
#[derive(Clone)]
pub struct EffectId(Arc<dyn Token>);

impl EffectId {
    /// Wrap an arbitrary hashable token as an identity.
    #[must_use]
    pub fn new<T>(token: T) -> Self
    where
        T: Eq + Hash + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(token))
    }
}

impl PartialEq for EffectId {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for EffectId {}

impl Hash for EffectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectId(")?;
        self.0.dyn_fmt(f)?;
        write!(f, ")")
    }
}

// String-ish tokens are normalized to `String` so that `"x"` and
// `String::from("x")` name the same identity.
impl From<&str> for EffectId {
    fn from(token: &str) -> Self {
        Self::new(token.to_owned())
    }
}

impl From<String> for EffectId {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<u64> for EffectId {
    fn from(token: u64) -> Self {
        Self::new(token)
    }
}
