use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    entry::{AnyValue, EntryValue},
    key::{Key, KeyId},
};

/// Request-scoped values keyed by [`Key`] identity.
///
/// Copy-on-write: cloning is cheap, and inserting into a clone never changes
/// what other holders of the original see.
#[derive(Clone, Default)]
pub struct ValueSet {
    inner: Arc<HashMap<KeyId, AnyValue>>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, if any.
    pub fn get<T: 'static>(&self, key: &Key<T>) -> Option<&T> {
        self.inner
            .get(&key.id())
            .and_then(|v| (**v).downcast_ref::<T>())
    }

    pub fn insert<T: EntryValue>(&mut self, key: &Key<T>, value: T) {
        self.insert_any(key.id(), Arc::new(value));
    }

    pub fn contains(&self, id: KeyId) -> bool {
        self.inner.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub(crate) fn get_any(&self, id: KeyId) -> Option<&AnyValue> {
        self.inner.get(&id)
    }

    pub(crate) fn insert_any(&mut self, id: KeyId, value: AnyValue) {
        Arc::make_mut(&mut self.inner).insert(id, value);
    }
}

impl fmt::Debug for ValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_absent() {
        let set = ValueSet::new();
        let key: Key<i32> = Key::new();
        assert!(set.get(&key).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn insert_and_get_typed() {
        let mut set = ValueSet::new();
        let hop: Key<i32> = Key::new();
        let user: Key<String> = Key::new();

        set.insert(&hop, 3);
        set.insert(&user, "alice".to_string());

        assert_eq!(set.get(&hop), Some(&3));
        assert_eq!(set.get(&user).map(String::as_str), Some("alice"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn clone_is_isolated_from_later_writes() {
        let hop: Key<i32> = Key::new();
        let mut outer = ValueSet::new();
        outer.insert(&hop, 1);

        let mut inner = outer.clone();
        inner.insert(&hop, 2);

        assert_eq!(outer.get(&hop), Some(&1));
        assert_eq!(inner.get(&hop), Some(&2));
    }
}
