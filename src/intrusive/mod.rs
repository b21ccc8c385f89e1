//! Intrusive-style index structures (spec.md §4.2, §4.3): the AVL-16
//! in-place and copy-on-write indexes, the separate-chaining hash map
//! backing the semantic layer and object cache, and the cross-worker
//! SPSC ring used by the task scheduler.

pub mod avl16;
pub mod avl16_cow;
pub mod chain_map;
pub mod spsc;
