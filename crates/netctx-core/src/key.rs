use std::{
    any::type_name,
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased identity of a [`Key`].
///
/// Only ever compared for equality; never serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u64);

/// Typed identity token for one propagated value.
///
/// Every call to [`Key::new`] yields a distinct identity, so two keys never collide
/// even when they carry the same value type. The value type is fixed by the key,
/// which is what lets a [`crate::RequestContext`] hand back `&T` without runtime guessing.
///
/// Keys are usually kept in a `static`:
/// ```
/// use std::sync::LazyLock;
/// use netctx_core::Key;
///
/// static HOP: LazyLock<Key<i32>> = LazyLock::new(Key::new);
/// assert_eq!(*HOP, *HOP);
/// ```
pub struct Key<T> {
    id: KeyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Key<T> {
    /// Allocate a fresh key.
    pub fn new() -> Self {
        Self {
            id: KeyId(NEXT_KEY_ID.fetch_add(1, Ordering::Relaxed)),
            _marker: PhantomData,
        }
    }
}

impl<T> Key<T> {
    #[inline]
    pub fn id(&self) -> KeyId {
        self.id
    }
}

impl<T: 'static> Default for Key<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Key<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Key<T> {}

impl<T> PartialEq for Key<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Key<T> {}

impl<T> Hash for Key<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id.0)
            .field("type", &type_name::<T>())
            .finish()
    }
}
