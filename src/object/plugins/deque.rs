//! `deque`: a double-ended sequence of byte values (SPEC_FULL.md §9).
//! `insert` pushes at the back; `ioctl` carries front-end operations
//! (push-front/pop-front/pop-back) since the `ObjectPlugin` contract's
//! `insert`/`remove` only have one natural end (`Vec::push`/pop) to bind
//! to directly.

use super::{decode_records, encode_records};
use crate::error::{Error, Result};
use crate::object::{ObjectPlugin, Reply};

const OP_PUSH_FRONT: u8 = 0;
const OP_POP_FRONT: u8 = 1;
const OP_POP_BACK: u8 = 2;

pub struct DequePlugin;

impl ObjectPlugin for DequePlugin {
    fn type_label(&self) -> &'static str {
        "deque"
    }

    fn create(&self) -> Vec<u8> {
        Vec::new()
    }

    fn query(&self, data: &[u8]) -> Result<Reply> {
        Ok(Reply::Values(decode_records(data)))
    }

    /// Pushes `payload` to the back.
    fn insert(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let mut records = decode_records(data);
        records.push(payload);
        *data = encode_records(&records);
        Ok(Reply::None)
    }

    fn update(&self, _data: &mut Vec<u8>, _key: Vec<u8>, _value: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    /// Pops the back; `key` is ignored (a deque has no addressable keys).
    fn remove(&self, data: &mut Vec<u8>, _key: Vec<u8>) -> Result<Reply> {
        let mut records = decode_records(data);
        let popped = records.pop().ok_or(Error::DataNoItems)?;
        *data = encode_records(&records);
        Ok(Reply::Value(popped))
    }

    fn ioctl(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let mut records = decode_records(data);
        let op = *payload.first().ok_or(Error::NotImplemented)?;
        let reply = match op {
            OP_PUSH_FRONT => {
                records.insert(0, payload[1..].to_vec());
                Reply::None
            }
            OP_POP_FRONT => {
                if records.is_empty() {
                    return Err(Error::DataNoItems);
                }
                Reply::Value(records.remove(0))
            }
            OP_POP_BACK => Reply::Value(records.pop().ok_or(Error::DataNoItems)?),
            _ => return Err(Error::NotImplemented),
        };
        *data = encode_records(&records);
        Ok(reply)
    }
}
