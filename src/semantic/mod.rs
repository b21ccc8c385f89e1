//! Semantic layer: the flat namespace plugin (spec.md §4.10) mapping
//! names to object ids. Object identity (oid) allocation is monotonic
//! and never reused within a process lifetime (spec.md §5). The map
//! itself lives in memory, but every mutation is first appended as a
//! record to the device so a fresh process can replay the log and
//! recover the same namespace (spec.md §4.10: "a single map (name →
//! oid) on durable storage via the device interface").

use crate::device::log::{append_record, field_string, field_u64, read_record};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::intrusive::chain_map::ChainMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TAG_CREATE: u8 = 0;
const TAG_UNLINK: u8 = 1;
const TAG_RENAME: u8 = 2;

const FIELD_NAME: u16 = 1;
const FIELD_OID: u16 = 2;
const FIELD_NEW_NAME: u16 = 3;

pub struct SemanticLayer {
    names: RwLock<ChainMap<String, u64>>,
    next_oid: AtomicU64,
    device: Option<Arc<dyn Device>>,
    log_offset: AtomicU64,
}

impl SemanticLayer {
    pub fn new() -> Self {
        SemanticLayer {
            names: RwLock::new(ChainMap::with_buckets(64)),
            next_oid: AtomicU64::new(1),
            device: None,
            log_offset: AtomicU64::new(0),
        }
    }

    /// Opens a layer backed by `device`, replaying its log from offset 0
    /// to rebuild the name map and `next_oid` before returning. An empty
    /// device replays to nothing, equivalent to `new()` but with logging
    /// enabled.
    pub fn open_on(device: Arc<dyn Device>) -> Self {
        let mut names = ChainMap::with_buckets(64);
        let mut next_oid = 1u64;
        let mut offset = 0u64;
        while let Some((tag, fields, consumed)) = read_record(device.as_ref(), offset) {
            match tag {
                TAG_CREATE => {
                    if let (Some(name), Some(oid)) = (field_string(&fields, FIELD_NAME), field_u64(&fields, FIELD_OID)) {
                        names.insert(name, oid);
                        if oid >= next_oid {
                            next_oid = oid + 1;
                        }
                    }
                }
                TAG_UNLINK => {
                    if let Some(name) = field_string(&fields, FIELD_NAME) {
                        names.remove(&name);
                    }
                }
                TAG_RENAME => {
                    if let (Some(old), Some(new)) = (field_string(&fields, FIELD_NAME), field_string(&fields, FIELD_NEW_NAME)) {
                        if let Some(oid) = names.remove(&old) {
                            names.insert(new, oid);
                        }
                    }
                }
                _ => {}
            }
            offset += consumed;
        }
        SemanticLayer {
            names: RwLock::new(names),
            next_oid: AtomicU64::new(next_oid),
            device: Some(device),
            log_offset: AtomicU64::new(offset),
        }
    }

    fn persist(&self, tag: u8, fields: &[(u16, &[u8])]) -> Result<()> {
        match &self.device {
            Some(device) => append_record(device.as_ref(), &self.log_offset, tag, fields),
            None => Ok(()),
        }
    }

    pub fn create(&self, name: &str) -> Result<u64> {
        let mut names = self.names.write();
        if names.contains(&name.to_string()) {
            return Err(Error::ObjectExists);
        }
        let oid = self.next_oid.fetch_add(1, Ordering::Relaxed);
        self.persist(TAG_CREATE, &[(FIELD_NAME, name.as_bytes()), (FIELD_OID, &oid.to_le_bytes())])?;
        names.insert(name.to_string(), oid);
        Ok(oid)
    }

    pub fn open(&self, name: &str) -> Result<u64> {
        self.names
            .read()
            .get(&name.to_string())
            .copied()
            .ok_or(Error::ObjectNotFound)
    }

    pub fn unlink(&self, name: &str) -> Result<u64> {
        let mut names = self.names.write();
        if !names.contains(&name.to_string()) {
            return Err(Error::ObjectNotFound);
        }
        self.persist(TAG_UNLINK, &[(FIELD_NAME, name.as_bytes())])?;
        Ok(names.remove(&name.to_string()).unwrap())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let mut names = self.names.write();
        if !names.contains(&old.to_string()) {
            return Err(Error::ObjectNotFound);
        }
        if names.contains(&new.to_string()) {
            return Err(Error::ObjectExists);
        }
        self.persist(TAG_RENAME, &[(FIELD_NAME, old.as_bytes()), (FIELD_NEW_NAME, new.as_bytes())])?;
        let oid = names.remove(&old.to_string()).unwrap();
        names.insert(new.to_string(), oid);
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.names.read().contains(&name.to_string())
    }
}

impl Default for SemanticLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemDevice;

    #[test]
    fn create_then_open() {
        let sem = SemanticLayer::new();
        let oid = sem.create("a").unwrap();
        assert_eq!(sem.open("a").unwrap(), oid);
    }

    #[test]
    fn create_duplicate_fails() {
        let sem = SemanticLayer::new();
        sem.create("a").unwrap();
        assert!(matches!(sem.create("a"), Err(Error::ObjectExists)));
    }

    #[test]
    fn open_missing_fails() {
        let sem = SemanticLayer::new();
        assert!(matches!(sem.open("missing"), Err(Error::ObjectNotFound)));
    }

    #[test]
    fn rename_moves_oid() {
        let sem = SemanticLayer::new();
        let oid = sem.create("old").unwrap();
        sem.rename("old", "new").unwrap();
        assert!(matches!(sem.open("old"), Err(Error::ObjectNotFound)));
        assert_eq!(sem.open("new").unwrap(), oid);
    }

    #[test]
    fn oids_are_monotonic_across_create_and_unlink() {
        let sem = SemanticLayer::new();
        let a = sem.create("a").unwrap();
        sem.unlink("a").unwrap();
        let b = sem.create("b").unwrap();
        assert!(b > a);
    }

    #[test]
    fn reopen_replays_log_from_device() {
        let device: Arc<dyn Device> = Arc::new(MemDevice::new());
        let oid_a = {
            let sem = SemanticLayer::open_on(device.clone());
            let a = sem.create("a").unwrap();
            sem.create("b").unwrap();
            sem.unlink("b").unwrap();
            a
        };

        let reopened = SemanticLayer::open_on(device.clone());
        assert_eq!(reopened.open("a").unwrap(), oid_a);
        assert!(matches!(reopened.open("b"), Err(Error::ObjectNotFound)));

        // next_oid continues past what was already allocated rather than
        // restarting and colliding with "a".
        let c = reopened.create("c").unwrap();
        assert!(c > oid_a);
    }
}
