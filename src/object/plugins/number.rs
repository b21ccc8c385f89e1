//! `number`: typed arithmetic (add/sub/mul/div/mod) over the same
//! varint-coded scalar representation as `counter` (SPEC_FULL.md §9),
//! surfacing `NUMBER_DIVMOD_BYZERO`/`NUMBER_DIVMOD_OVERFLOW` on the
//! division family.

use crate::error::{Error, Result};
use crate::object::{ObjectPlugin, Reply};
use crate::primitives::varint::{read_varint, write_varint};

const OP_ADD: u8 = 0;
const OP_SUB: u8 = 1;
const OP_MUL: u8 = 2;
const OP_DIV: u8 = 3;
const OP_MOD: u8 = 4;

fn load(data: &[u8]) -> u64 {
    read_varint(data).map(|(v, _)| v).unwrap_or(0)
}

fn store(value: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, value);
    buf
}

pub struct NumberPlugin;

impl ObjectPlugin for NumberPlugin {
    fn type_label(&self) -> &'static str {
        "number"
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
        let (operand, _) = read_varint(&payload[1..]).ok_or(Error::NotImplemented)?;
        let current = load(data);
        let result = match op {
            OP_ADD => current.checked_add(operand).ok_or(Error::NumberDivModOverflow)?,
            OP_SUB => current.checked_sub(operand).ok_or(Error::NumberDivModOverflow)?,
            OP_MUL => current.checked_mul(operand).ok_or(Error::NumberDivModOverflow)?,
            OP_DIV => {
                if operand == 0 {
                    return Err(Error::NumberDivModByZero);
                }
                current / operand
            }
            OP_MOD => {
                if operand == 0 {
                    return Err(Error::NumberDivModByZero);
                }
                current % operand
            }
            _ => return Err(Error::NotImplemented),
        };
        *data = store(result);
        Ok(Reply::Value(store(result)))
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
    fn arithmetic_chain() {
        let p = NumberPlugin;
        let mut data = p.create();
        let mut buf = vec![OP_ADD];
        write_varint(&mut buf, 10);
        assert_eq!(reply_value(p.ioctl(&mut data, buf).unwrap()), 10);

        let mut buf = vec![OP_MUL];
        write_varint(&mut buf, 4);
        assert_eq!(reply_value(p.ioctl(&mut data, buf).unwrap()), 40);

        let mut buf = vec![OP_DIV];
        write_varint(&mut buf, 5);
        assert_eq!(reply_value(p.ioctl(&mut data, buf).unwrap()), 8);

        let mut buf = vec![OP_MOD];
        write_varint(&mut buf, 3);
        assert_eq!(reply_value(p.ioctl(&mut data, buf).unwrap()), 2);
    }

    #[test]
    fn div_by_zero_is_distinct_error() {
        let p = NumberPlugin;
        let mut data = p.create();
        let mut buf = vec![OP_DIV];
        write_varint(&mut buf, 0);
        assert!(matches!(p.ioctl(&mut data, buf), Err(Error::NumberDivModByZero)));
    }

    #[test]
    fn sub_underflow_overflows() {
        let p = NumberPlugin;
        let mut data = p.create();
        let mut buf = vec![OP_SUB];
        write_varint(&mut buf, 1);
        assert!(matches!(p.ioctl(&mut data, buf), Err(Error::NumberDivModOverflow)));
    }
}
