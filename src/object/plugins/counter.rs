//! `counter`: a single varint-coded 64-bit value (SPEC_FULL.md §9).
//! `ioctl` carries the operation — get, set, increment, decrement — since
//! a bare scalar has no natural key/value shape for `insert`/`update`.

use crate::error::{Error, Result};
use crate::object::{ObjectPlugin, Reply};
use crate::primitives::varint::{read_varint, write_varint};

const OP_GET: u8 = 0;
const OP_SET: u8 = 1;
const OP_INCR: u8 = 2;
const OP_DECR: u8 = 3;

fn load(data: &[u8]) -> u64 {
    read_varint(data).map(|(v, _)| v).unwrap_or(0)
}

fn store(value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, value);
    buf
}

pub struct CounterPlugin;

impl ObjectPlugin for CounterPlugin {
    fn type_label(&self) -> &'static str {
        "counter"
    }

    fn create(&self) -> Vec<u8> {
        store(0)
    }

    fn query(&self, data: &[u8]) -> Result<Reply> {
        Ok(Reply::Value(store(load(data))))
    }

    fn insert(&self, _data: &mut Vec<u8>, _payload: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    fn update(&self, _data: &mut Vec<u8>, _key: Vec<u8>, _value: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    fn remove(&self, _data: &mut Vec<u8>, _key: Vec<u8>) -> Result<Reply> {
        Err(Error::NotImplemented)
    }

    fn ioctl(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply> {
        let op = *payload.first().ok_or(Error::NotImplemented)?;
        let current = load(data);
        match op {
            OP_GET => Ok(Reply::Value(store(current))),
            OP_SET => {
                let (v, _) = read_varint(&payload[1..]).ok_or(Error::NotImplemented)?;
                *data = store(v);
                Ok(Reply::None)
            }
            OP_INCR => {
                let (delta, _) = read_varint(&payload[1..]).unwrap_or((1, 0));
                let next = current.checked_add(delta).ok_or(Error::NumberDivModOverflow)?;
                *data = store(next);
                Ok(Reply::Value(store(next)))
            }
            OP_DECR => {
                let (delta, _) = read_varint(&payload[1..]).unwrap_or((1, 0));
                let next = current.checked_sub(delta).ok_or(Error::NumberDivModOverflow)?;
                *data = store(next);
                Ok(Reply::Value(store(next)))
            }
            _ => Err(Error::NotImplemented),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_value(r: Reply) -> u64 {
        match r {
            Reply::Value(v) => load(&v),
            _ => panic!("expected value reply"),
        }
    }

    #[test]
    fn create_starts_at_zero() {
        let p = CounterPlugin;
        let data = p.create();
        assert_eq!(load(&data), 0);
    }

    #[test]
    fn incr_decr_round_trip() {
        let p = CounterPlugin;
        let mut data = p.create();
        let r = p.ioctl(&mut data, vec![OP_INCR, 5]).unwrap();
        assert_eq!(reply_value(r), 5);
        let r = p.ioctl(&mut data, vec![OP_DECR, 2]).unwrap();
        assert_eq!(reply_value(r), 3);
    }

    #[test]
    fn decr_below_zero_overflows() {
        let p = CounterPlugin;
        let mut data = p.create();
        let err = p.ioctl(&mut data, vec![OP_DECR, 1]).unwrap_err();
        assert!(matches!(err, Error::NumberDivModOverflow));
    }
}
