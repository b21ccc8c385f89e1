//! `flow`: an append-only log of byte records (SPEC_FULL.md §9). Only
//! `insert` mutates the buffer; `update`/`remove` are rejected since a
//! flow has no addressable position to rewrite or drop once appended.

use super::{decode_records, encode_records};
use crate::error::{Error, Result};
use crate::object::{ObjectPlugin, Reply};

pub struct FlowPlugin;

impl ObjectPlugin for FlowPlugin {
    fn type_label(&self) -> &'static str {
        "flow"
    }

    fn create(&self) -> Vec<u8> {
        Vec::new()
    }

    fn query(&self, data: &[u8]) -> Result<Reply> {
        Ok(Reply::Values(decode_records(data)))
    }

    fn insert(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let mut records = decode_records(data);
        records.push(payload);
        *data = encode_records(&records);
        Ok(Reply::None)
    }

    fn update(&self, _data: &mut Vec<u8>, _key: Vec<u8>, _value: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    fn remove(&self, _data: &mut Vec<u8>, _key: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    /// `ioctl` payload of `[0]` reports the current record count.
    fn ioctl(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        match payload.first() {
            Some(0) => {
                let count = decode_records(data).len() as u64;
                Ok(Reply::Value(count.to_le_bytes().to_vec()))
            }
            _ => Err(Error::NotImplemented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_accumulate_in_order() {
        let p = FlowPlugin;
        let mut data = p.create();
        p.insert(&mut data, b"first".to_vec()).unwrap();
        p.insert(&mut data, b"second".to_vec()).unwrap();
        let values = match p.query(&data).unwrap() {
            Reply::Values(v) => v,
            _ => panic!(),
        };
        assert_eq!(values, vec![b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn update_and_remove_are_rejected() {
        let p = FlowPlugin;
        let mut data = p.create();
        assert!(matches!(p.update(&mut data, vec![], vec![]), Err(Error::NotImplemented)));
        assert!(matches!(p.remove(&mut data, vec![]), Err(Error::NotImplemented)));
    }

    #[test]
    fn ioctl_reports_record_count() {
        let p = FlowPlugin;
        let mut data = p.create();
        p.insert(&mut data, b"a".to_vec()).unwrap();
        p.insert(&mut data, b"b".to_vec()).unwrap();
        let reply = p.ioctl(&mut data, vec![0]).unwrap();
        match reply {
            Reply::Value(v) => assert_eq!(u64::from_le_bytes(v.try_into().unwrap()), 2),
            _ => panic!(),
        }
    }
}
