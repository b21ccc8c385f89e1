//! `sset`: a sorted set of byte keys, backed directly by the
//! copy-on-write AVL-16 index (SPEC_FULL.md §9) rather than a flat
//! buffer walk, since membership + ordered iteration is exactly what
//! that index already gives for free. The plugin's on-disk buffer holds
//! only the encoded record list used to rebuild the snapshot on load;
//! the snapshot itself is rebuilt per call, mirroring how the real
//! object layer rehydrates a cached index from its backing page on a
//! cache miss.

use super::{decode_records, encode_records};
use crate::error::{Error, Result};
use crate::intrusive::avl16_cow::Snapshot;
use crate::object::{ObjectPlugin, Reply};

fn load(data: &[u8]) -> Snapshot<Vec<u8>, ()> {
    let mut snap = Snapshot::empty();
    for key in decode_records(data) {
        snap = snap.inserted(key, ());
    }
    snap
}

fn store(snap: &Snapshot<Vec<u8>, ()>) -> Vec<u8> {
    let records: Vec<Vec<u8>> = snap.iter().map(|(k, _)| k.clone()).collect();
    encode_records(&records)
}

pub struct SsetPlugin;

impl ObjectPlugin for SsetPlugin {
    fn type_label(&self) -> &'static str {
        "sset"
    }

    fn create(&self) -> Vec<u8> {
        Vec::new()
    }

    fn query(&self, data: &[u8]) -> Result<Reply> {
        let snap = load(data);
        Ok(Reply::Values(snap.iter().map(|(k, _)| k.clone()).collect()))
    }

    /// Adds `payload` as a member; a duplicate insert is a no-op, not an
    /// error, matching set semantics.
    fn insert(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let snap = load(data).inserted(payload, ());
        *data = store(&snap);
        Ok(Reply::None)
    }

    fn update(&self, _data: &mut Vec<u8>, _key: Vec<u8>, _value: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    fn remove(&self, data: &mut Vec<u8>, key: Vec<u8>) -> Result<Reply> {
        let snap = load(data);
        if snap.lookup(&key).is_none() {
            return Err(Error::DataKeyNotFound);
        }
        let snap = snap.removed(&key);
        *data = store(&snap);
        Ok(Reply::None)
    }

    /// `ioctl` payload of `[0]` tests membership; the key follows.
    fn ioctl(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let op = *payload.first().ok_or(Error::NotImplemented)?;
        match op {
            0 => {
                let snap = load(data);
                let present = snap.lookup(&payload[1..].to_vec()).is_some();
                Ok(Reply::Value(vec![present as u8]))
            }
            _ => Err(Error::NotImplemented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_dedups_and_query_is_sorted() {
        let p = SsetPlugin;
        let mut data = p.create();
        for k in [b"c".to_vec(), b"a".to_vec(), b"b".to_vec(), b"a".to_vec()] {
            p.insert(&mut data, k).unwrap();
        }
        let members = match p.query(&data).unwrap() {
            Reply::Values(v) => v,
            _ => panic!(),
        };
        assert_eq!(members, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn remove_missing_key_fails() {
        let p = SsetPlugin;
        let mut data = p.create();
        assert!(matches!(p.remove(&mut data, b"x".to_vec()), Err(Error::DataKeyNotFound)));
    }

    #[test]
    fn membership_ioctl() {
        let p = SsetPlugin;
        let mut data = p.create();
        p.insert(&mut data, b"present".to_vec()).unwrap();
        let reply = p.ioctl(&mut data, [&[0][..], b"present"].concat()).unwrap();
        assert!(matches!(reply, Reply::Value(v) if v == vec![1]));
        let reply = p.ioctl(&mut data, [&[0][..], b"absent"].concat()).unwrap();
        assert!(matches!(reply, Reply::Value(v) if v == vec![0]));
    }
}
