//! The in-memory key-value map, guarded by a reader/writer lock.
//!
//! Readers (`get`, `scan`) take the shared lock; writers take the exclusive
//! lock. Transactions reach the guards directly so a WAL append can happen
//! inside the exclusive section, before the mutation lands in the map.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Included};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Key, Value};

/// Shared mapping from key to value.
#[derive(Debug, Default)]
pub struct KvStore {
    data: RwLock<BTreeMap<Key, Value>>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `key` under the shared lock.
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.data.read().unwrap().get(key).cloned()
    }

    /// Collect up to `limit` pairs with `start <= key < end`, under the
    /// shared lock. An empty or inverted range yields nothing. Results come
    /// out in ascending key order.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<(Key, Value)> {
        if start >= end {
            return Vec::new();
        }
        self.data
            .read()
            .unwrap()
            .range::<[u8], _>((Included(start), Excluded(end)))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Key, Value>> {
        self.data.read().unwrap()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Key, Value>> {
        self.data.write().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn get_returns_inserted_value() {
        let store = KvStore::new();
        store.write().insert(b"k".to_vec(), b"v".to_vec());
        assert_eq!(store.get(b"k"), Some(b"v".to_vec()));
        assert_eq!(store.get(b"missing"), None);
    }

    #[test]
    fn scan_is_half_open() {
        let store = KvStore::new();
        {
            let mut map = store.write();
            map.insert(b"a".to_vec(), b"1".to_vec());
            map.insert(b"b".to_vec(), b"2".to_vec());
            map.insert(b"c".to_vec(), b"3".to_vec());
        }
        let pairs = store.scan(b"a", b"c", 10);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, b"a".to_vec());
        assert_eq!(pairs[1].0, b"b".to_vec());
    }

    #[test]
    fn scan_respects_limit() {
        let store = KvStore::new();
        {
            let mut map = store.write();
            for i in 0..10u8 {
                map.insert(vec![i], vec![i]);
            }
        }
        assert_eq!(store.scan(&[0], &[10], 3).len(), 3);
    }

    #[test]
    fn inverted_range_is_empty() {
        let store = KvStore::new();
        store.write().insert(b"m".to_vec(), b"1".to_vec());
        assert!(store.scan(b"z", b"a", 10).is_empty());
        assert!(store.scan(b"m", b"m", 10).is_empty());
    }

    #[test]
    fn concurrent_readers_observe_complete_values() {
        let store = Arc::new(KvStore::new());
        let key = b"counter".to_vec();
        store.write().insert(key.clone(), vec![0u8; 64]);

        let mut handles = Vec::new();
        for byte in 1..=4u8 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    store.write().insert(key.clone(), vec![byte; 64]);
                }
            }));
        }
        for _ in 0..4 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let value = store.get(&key).unwrap();
                    // Every observed value is one that some writer stored
                    // whole; a torn read would mix fill bytes.
                    assert_eq!(value.len(), 64);
                    assert!(value.iter().all(|b| *b == value[0]));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
