use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use super::container::{StateContainer, SubscriptionId};

/// Identifier -> record map where missing records read as a default value.
///
/// Writes to a missing key start from the default record, so a partial
/// update behaves like `{ ...default, ...existing, ...patch }`.
pub struct KeyedStore<K, V> {
    entries: StateContainer<BTreeMap<K, V>>,
    default: V,
}

impl<K, V: Clone> Clone for KeyedStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            default: self.default.clone(),
        }
    }
}

impl<K, V> KeyedStore<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, default: V) -> Self {
        Self {
            entries: StateContainer::new(name, BTreeMap::new()),
            default,
        }
    }

    pub fn default_record(&self) -> &V {
        &self.default
    }

    /// Record for `key`, or the default when none was written.
    pub fn get<Q>(&self, key: &Q) -> V
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entry(key).unwrap_or_else(|| self.default.clone())
    }

    /// Record for `key` only if one was written.
    pub fn entry<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.read(|entries| entries.get(key).cloned())
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.read(|entries| entries.contains_key(key))
    }

    /// Insert or overwrite the record for `key`.
    pub fn set(&self, key: K, value: V) {
        self.entries.update(move |entries| {
            entries.insert(key, value);
        });
    }

    /// Mutate the record for `key`, starting from the default when absent.
    pub fn update<F, R>(&self, key: K, op: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let default = &self.default;
        self.entries
            .update(move |entries| op(entries.entry(key).or_insert_with(|| default.clone())))
    }

    /// Mutate every stored record in one published change.
    pub fn update_all<F>(&self, mut op: F)
    where
        F: FnMut(&K, &mut V),
    {
        self.entries.update(|entries| {
            for (key, value) in entries.iter_mut() {
                op(key, value);
            }
        });
    }

    /// Put the default record back under `key`.
    pub fn reset(&self, key: K) {
        let default = self.default.clone();
        self.set(key, default);
    }

    /// Drop every record.
    pub fn reset_all(&self) {
        self.entries.reset();
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.read(|entries| entries.keys().cloned().collect())
    }

    pub fn snapshot(&self) -> BTreeMap<K, V> {
        self.entries.get()
    }

    pub fn len(&self) -> usize {
        self.entries.read(BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BTreeMap<K, V>) + Send + Sync + 'static,
    {
        self.entries.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.entries.unsubscribe(id)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for KeyedStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedStore")
            .field("entries", &self.entries)
            .field("default", &self.default)
            .finish()
    }
}
