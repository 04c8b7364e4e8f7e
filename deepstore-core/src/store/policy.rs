//! Equality and clone policies.
//!
//! A store decides two things on every write: whether the incoming value is
//! different from the stored one ([`Equality`]), and how to copy values as
//! they cross the store boundary ([`Cloning`]). The two axes are independent
//! and are injected as a [`Policy`] when the store is built.
//!
//! # Combinations
//!
//! | Preset                  | Equality     | Cloning  |
//! |-------------------------|--------------|----------|
//! | [`Policy::active`]      | `Never`      | Identity |
//! | [`Policy::structural`]  | `Structural` | Identity |
//! | [`Policy::safe`]        | `Structural` | Deep     |
//!
//! Structural equality with identity cloning is vulnerable to silent no-ops
//! when `T` holds shared handles (`Arc<Mutex<_>>` and friends) and a caller
//! mutates through them in `update`: the stored value changes along with the
//! candidate, so the two always compare equal. Deep cloning re-creates those
//! handles and closes the gap, at the price of a copy on every read and write.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Which equality rule a store applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityKind {
    /// Every write is a change.
    Never,
    /// Recursive value equality via `PartialEq`.
    Structural,
    /// Caller-supplied comparison.
    Custom,
}

/// Which copy rule a store applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloningKind {
    /// `Clone::clone`; shared handles stay shared.
    Identity,
    /// Full duplication, including anything behind shared handles.
    Deep,
    /// Caller-supplied copy.
    Custom,
}

/// Decides whether a new value differs from the stored one.
pub struct Equality<T> {
    kind: EqualityKind,
    eq: Arc<dyn Fn(&T, &T) -> bool + Send + Sync>,
}

impl<T: 'static> Equality<T> {
    /// Never equal: subscribers are notified on every write.
    pub fn never() -> Self {
        Self {
            kind: EqualityKind::Never,
            eq: Arc::new(|_: &T, _: &T| false),
        }
    }

    /// Structural equality through `PartialEq`.
    pub fn structural() -> Self
    where
        T: PartialEq,
    {
        Self {
            kind: EqualityKind::Structural,
            eq: Arc::new(|a: &T, b: &T| a == b),
        }
    }

    /// Shallow comparison of a projection of the value.
    ///
    /// Useful when only a key or version field decides whether a change is
    /// worth announcing.
    pub fn by_key<K, F>(key: F) -> Self
    where
        K: PartialEq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            kind: EqualityKind::Custom,
            eq: Arc::new(move |a: &T, b: &T| key(a) == key(b)),
        }
    }

    /// Arbitrary comparison.
    pub fn custom<F>(eq: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: EqualityKind::Custom,
            eq: Arc::new(eq),
        }
    }
}

impl<T> Equality<T> {
    /// Compare two values under this policy.
    pub fn equal(&self, a: &T, b: &T) -> bool {
        (self.eq)(a, b)
    }

    pub fn kind(&self) -> EqualityKind {
        self.kind
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            eq: Arc::clone(&self.eq),
        }
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Equality").field(&self.kind).finish()
    }
}

/// Produces the copies a store hands out and keeps.
pub struct Cloning<T> {
    kind: CloningKind,
    copy: Arc<dyn Fn(&T) -> T + Send + Sync>,
}

impl<T: 'static> Cloning<T> {
    /// Plain `Clone::clone`.
    pub fn identity() -> Self
    where
        T: Clone,
    {
        Self {
            kind: CloningKind::Identity,
            copy: Arc::new(|value: &T| value.clone()),
        }
    }

    /// Duplicate by round-tripping through `serde_json::Value`.
    ///
    /// With serde's `rc` feature this re-creates `Arc`s, and std `Mutex`/
    /// `RwLock` deserialize into fresh locks, so nothing stays aliased.
    pub fn deep() -> Self
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        Self {
            kind: CloningKind::Deep,
            copy: Arc::new(|value: &T| deep_copy(value)),
        }
    }

    /// Arbitrary copy function.
    pub fn custom<F>(copy: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        Self {
            kind: CloningKind::Custom,
            copy: Arc::new(copy),
        }
    }
}

impl<T> Cloning<T> {
    /// Copy a value under this policy.
    pub fn copy(&self, value: &T) -> T {
        (self.copy)(value)
    }

    pub fn kind(&self) -> CloningKind {
        self.kind
    }
}

impl<T> Clone for Cloning<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            copy: Arc::clone(&self.copy),
        }
    }
}

impl<T> fmt::Debug for Cloning<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cloning").field(&self.kind).finish()
    }
}

fn deep_copy<T>(value: &T) -> T
where
    T: Clone + Serialize + DeserializeOwned,
{
    match serde_json::to_value(value).and_then(serde_json::from_value) {
        Ok(copy) => copy,
        Err(error) => {
            tracing::warn!(%error, "deep copy failed; falling back to Clone");
            value.clone()
        }
    }
}

/// An equality rule paired with a clone rule.
#[derive(Debug)]
pub struct Policy<T> {
    pub equality: Equality<T>,
    pub cloning: Cloning<T>,
}

impl<T: Clone + 'static> Policy<T> {
    pub fn new(equality: Equality<T>, cloning: Cloning<T>) -> Self {
        Self { equality, cloning }
    }

    /// Notify on every write, share values as-is.
    pub fn active() -> Self {
        Self::new(Equality::never(), Cloning::identity())
    }

    /// Skip structurally equal writes, share values as-is.
    pub fn structural() -> Self
    where
        T: PartialEq,
    {
        Self::new(Equality::structural(), Cloning::identity())
    }

    /// Skip structurally equal writes and deep-copy at every boundary.
    pub fn safe() -> Self
    where
        T: PartialEq + Serialize + DeserializeOwned,
    {
        Self::new(Equality::structural(), Cloning::deep())
    }
}

impl<T> Clone for Policy<T> {
    fn clone(&self) -> Self {
        Self {
            equality: self.equality.clone(),
            cloning: self.cloning.clone(),
        }
    }
}
