//! Wire framing for RPC (spec.md §6): a 1-byte control word, then
//! `msg_type`/`req_id` little-endian at the widths the control word
//! names, then a body of tagged fields (`primitives::field`). Readers
//! must tolerate the control word and the two integers arriving split
//! across buffer boundaries, so [`read_message`] returns `None` (not an
//! error) on a short buffer and callers retry once more bytes arrive.

use crate::primitives::{field, varint};

const IS_REQUEST_BIT: u8 = 0b0000_0010;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Request,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub msg_type: u32,
    pub req_id: u64,
    pub body: Vec<u8>,
}

/// Encodes the control byte for lengths already computed via
/// `varint::byte_size_of`.
fn control_byte(msg_type_len: usize, req_id_len: usize, kind: Kind) -> u8 {
    debug_assert!((1..=8).contains(&msg_type_len));
    debug_assert!((1..=8).contains(&req_id_len));
    let is_request = matches!(kind, Kind::Request) as u8;
    (((msg_type_len - 1) as u8) << 5) | (((req_id_len - 1) as u8) << 2) | (is_request << 1)
}

pub fn write_message(buf: &mut Vec<u8>, msg: &Message) {
    let msg_type_len = varint::byte_size_of(msg.msg_type as u64);
    let req_id_len = varint::byte_size_of(msg.req_id);
    buf.push(control_byte(msg_type_len, req_id_len, msg.kind));

    let mut tmp = [0u8; 8];
    varint::encode_fixed(&mut tmp, msg_type_len, msg.msg_type as u64);
    buf.extend_from_slice(&tmp[..msg_type_len]);

    varint::encode_fixed(&mut tmp, req_id_len, msg.req_id);
    buf.extend_from_slice(&tmp[..req_id_len]);

    buf.extend_from_slice(&msg.body);
}

/// Decodes one framed message from the front of `buf`. Returns `None` if
/// `buf` doesn't yet hold a complete control word plus `msg_type`/`req_id`
/// — the caller should buffer more input and retry, never treat this as a
/// protocol error. The body is everything after the header; callers parse
/// its tagged fields with [`field::read_tag`] and friends as they consume
/// them, since the body's own length isn't carried by this framing.
pub fn read_message(buf: &[u8]) -> Option<Message> {
    let control = *buf.first()?;
    let msg_type_len = (((control >> 5) & 0x7) + 1) as usize;
    let req_id_len = (((control >> 2) & 0x7) + 1) as usize;
    let kind = if control & IS_REQUEST_BIT != 0 {
        Kind::Request
    } else {
        Kind::Response
    };

    let mut pos = 1;
    let msg_type_bytes = buf.get(pos..pos + msg_type_len)?;
    let msg_type = varint::decode_fixed(msg_type_bytes, msg_type_len) as u32;
    pos += msg_type_len;

    let req_id_bytes = buf.get(pos..pos + req_id_len)?;
    let req_id = varint::decode_fixed(req_id_bytes, req_id_len);
    pos += req_id_len;

    Some(Message {
        kind,
        msg_type,
        req_id,
        body: buf[pos..].to_vec(),
    })
}

/// Encodes `fields` (field-id/byte-payload pairs) into a message body
/// using the tagged-field coding of spec.md §3.
pub fn encode_body(fields: &[(u16, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (id, payload) in fields {
        field::write_bytes(&mut buf, *id, payload);
    }
    buf
}

/// Decodes a tagged-field body into `(field_id, payload)` pairs, in
/// order. Stops at the first malformed tag rather than panicking, since a
/// body may be truncated mid-stream by the same split-buffer concern the
/// header parsing handles.
pub fn decode_body(body: &[u8]) -> Vec<(u16, Vec<u8>)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < body.len() {
        match field::read_bytes(&body[pos..]) {
            Some((id, payload, consumed)) => {
                out.push((id, payload.to_vec()));
                pos += consumed;
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_with_body() {
        let body = encode_body(&[(5, b"abc"), (6, b"xy")]);
        let msg = Message {
            kind: Kind::Request,
            msg_type: 42,
            req_id: 1895390231,
            body,
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg);
        let decoded = read_message(&buf).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(
            decode_body(&decoded.body),
            vec![(5, b"abc".to_vec()), (6, b"xy".to_vec())]
        );
    }

    #[test]
    fn response_kind_bit_round_trips() {
        let msg = Message {
            kind: Kind::Response,
            msg_type: 1,
            req_id: 1,
            body: Vec::new(),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg);
        let decoded = read_message(&buf).unwrap();
        assert_eq!(decoded.kind, Kind::Response);
    }

    #[test]
    fn truncated_header_yields_none() {
        let msg = Message {
            kind: Kind::Request,
            msg_type: 70000,
            req_id: 9,
            body: vec![1, 2, 3],
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg);
        // Cut the buffer mid-msg_type.
        assert!(read_message(&buf[..1]).is_none());
    }

    #[test]
    fn large_ids_use_wider_fixed_width() {
        let msg = Message {
            kind: Kind::Request,
            msg_type: u32::MAX,
            req_id: u64::MAX,
            body: Vec::new(),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg);
        let decoded = read_message(&buf).unwrap();
        assert_eq!(decoded.msg_type, u32::MAX);
        assert_eq!(decoded.req_id, u64::MAX);
    }
}
