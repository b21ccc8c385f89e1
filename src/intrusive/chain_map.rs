//! Separate-chaining hash map used by the semantic layer's name index and
//! the object cache's hash table (spec.md §4.3, §4.5).
//!
//! The original keeps an intrusive singly-linked chain per bucket, so
//! rehashing an entry never allocates a fresh node — it just relinks.
//! `Vec<Vec<(K, V)>>` buckets give the same amortized behavior with a
//! much smaller surface area, which is the tradeoff worth taking here:
//! none of the call sites need raw node ownership.

use crate::primitives::hash::murmur64a;
use std::hash::{Hash, Hasher};

fn bucket_for<K: Hash>(key: &K, nbuckets: usize) -> usize {
    let mut hasher = MurmurHasher(0, 0);
    key.hash(&mut hasher);
    (hasher.finish() % nbuckets as u64) as usize
}

struct MurmurHasher(u64, u64);

impl Hasher for MurmurHasher {
    fn finish(&self) -> u64 {
        murmur64a(&self.1.to_le_bytes()[..self.0 as usize % 8 + 1], self.1)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.1 = murmur64a(bytes, self.1);
        self.0 = self.0.wrapping_add(bytes.len() as u64);
    }
}

pub struct ChainMap<K, V> {
    buckets: Vec<Vec<(K, V)>>,
    len: usize,
}

impl<K: Eq + Hash + Clone, V> ChainMap<K, V> {
    pub fn with_buckets(nbuckets: usize) -> Self {
        ChainMap {
            buckets: (0..nbuckets.max(1)).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn load_factor(&self) -> f64 {
        self.len as f64 / self.buckets.len() as f64
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let idx = bucket_for(&key, self.buckets.len());
        let chain = &mut self.buckets[idx];
        if let Some(slot) = chain.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        chain.push((key, value));
        self.len += 1;
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let idx = bucket_for(key, self.buckets.len());
        self.buckets[idx].iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = bucket_for(key, self.buckets.len());
        self.buckets[idx]
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = bucket_for(key, self.buckets.len());
        let chain = &mut self.buckets[idx];
        let pos = chain.iter().position(|(k, _)| k == key)?;
        self.len -= 1;
        Some(chain.swap_remove(pos).1)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.buckets.iter().flat_map(|c| c.iter().map(|(k, v)| (k, v)))
    }

    /// Rehash into a table with `nbuckets` buckets, preserving entries.
    pub fn rehash(&mut self, nbuckets: usize) {
        let mut new = ChainMap::with_buckets(nbuckets);
        for chain in self.buckets.drain(..) {
            for (k, v) in chain {
                new.insert(k, v);
            }
        }
        *self = new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut m: ChainMap<String, i32> = ChainMap::with_buckets(4);
        assert_eq!(m.insert("a".into(), 1), None);
        assert_eq!(m.insert("b".into(), 2), None);
        assert_eq!(m.insert("a".into(), 10), Some(1));
        assert_eq!(m.get(&"a".to_string()), Some(&10));
        assert_eq!(m.len(), 2);
        assert_eq!(m.remove(&"b".to_string()), Some(2));
        assert_eq!(m.get(&"b".to_string()), None);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn rehash_preserves_entries() {
        let mut m: ChainMap<u64, u64> = ChainMap::with_buckets(2);
        for i in 0..100 {
            m.insert(i, i * 2);
        }
        m.rehash(64);
        assert_eq!(m.len(), 100);
        for i in 0..100 {
            assert_eq!(m.get(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn load_factor_tracks_size() {
        let mut m: ChainMap<u32, ()> = ChainMap::with_buckets(10);
        for i in 0..5 {
            m.insert(i, ());
        }
        assert!((m.load_factor() - 0.5).abs() < 1e-9);
    }
}
