//! Tagged wire & on-disk field coding (spec.md §3, §4.1).
//!
//! A tagged field is `(field_id, payload_length, payload_bytes)`. The tag
//! is 1–3 bytes, following `raleighsl`'s `z_field_write`: ids 0..29 fit in
//! one byte with the low 3 bits holding `length-1`; ids 30..285 take two
//! bytes; ids above 285 take three.

use super::varint;

const ID_ESCAPE_2: u16 = 30;
const ID_ESCAPE_3: u16 = 31;
const ID_2_MAX: u16 = 285;

/// Number of bytes the tag alone will occupy for `field_id`.
pub fn tag_size(field_id: u16) -> usize {
    if field_id < ID_ESCAPE_2 {
        1
    } else if field_id <= ID_2_MAX {
        2
    } else {
        3
    }
}

/// Write just the `(id, length)` tag; `length` is in `1..=8`. Returns bytes written.
pub fn write_tag(buf: &mut Vec<u8>, field_id: u16, length: usize) -> usize {
    debug_assert!((1..=8).contains(&length));
    if field_id < ID_ESCAPE_2 {
        buf.push(((field_id as u8) << 3) | ((length - 1) as u8));
        1
    } else if field_id <= ID_2_MAX {
        let rel = field_id - ID_ESCAPE_2;
        buf.push(((ID_ESCAPE_2 as u8) << 3) | ((length - 1) as u8));
        buf.push((rel & 0xff) as u8);
        2
    } else {
        let rel = field_id - (ID_2_MAX + 1);
        buf.push(((ID_ESCAPE_3 as u8) << 3) | ((length - 1) as u8));
        buf.push((rel >> 8) as u8);
        buf.push((rel & 0xff) as u8);
        3
    }
}

/// Write a field whose payload is a fixed-width little-endian unsigned
/// integer, choosing the minimal width via `varint::byte_size_of`.
pub fn write_uint(buf: &mut Vec<u8>, field_id: u16, value: u64) {
    let len = varint::byte_size_of(value);
    write_tag(buf, field_id, len);
    let mut tmp = [0u8; 8];
    varint::encode_fixed(&mut tmp, len, value);
    buf.extend_from_slice(&tmp[..len]);
}

/// Write a field with an arbitrary byte payload (length bounded only by
/// the buffer, per spec.md §4.1's "length is bounded only by the
/// containing buffer" — callers pass `payload.len()` as the declared
/// length directly rather than through the 1-8 varint-width tag fast path).
pub fn write_bytes(buf: &mut Vec<u8>, field_id: u16, payload: &[u8]) {
    // The id<30 fast path's 3-bit length-1 only spans 1..=8; longer
    // payloads use the 2-/3-byte tag forms with the raw length varint
    // written immediately after the tag.
    if payload.len() <= 8 && !payload.is_empty() {
        write_tag(buf, field_id, payload.len());
        buf.extend_from_slice(payload);
    } else {
        write_tag(buf, field_id, 1);
        buf.push(0xff); // escape marker: length follows as a self-delimiting varint
        varint::write_varint(buf, payload.len() as u64);
        buf.extend_from_slice(payload);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldTag {
    pub field_id: u16,
    pub length: usize,
}

/// Decode a tag starting at `buf[0]`. Returns `(tag, bytes consumed)`.
pub fn read_tag(buf: &[u8]) -> Option<(FieldTag, usize)> {
    let first = *buf.first()?;
    let id_part = (first >> 3) as u16;
    let length = ((first & 0x7) + 1) as usize;
    if id_part < ID_ESCAPE_2 {
        Some((
            FieldTag {
                field_id: id_part,
                length,
            },
            1,
        ))
    } else if id_part == ID_ESCAPE_2 {
        let rel = *buf.get(1)? as u16;
        Some((
            FieldTag {
                field_id: ID_ESCAPE_2 + rel,
                length,
            },
            2,
        ))
    } else {
        let hi = *buf.get(1)? as u16;
        let lo = *buf.get(2)? as u16;
        let rel = (hi << 8) | lo;
        Some((
            FieldTag {
                field_id: (ID_2_MAX + 1) + rel,
                length,
            },
            3,
        ))
    }
}

/// Decode a `(field_id, value)` pair written by `write_uint`.
pub fn read_uint(buf: &[u8]) -> Option<(u16, u64, usize)> {
    let (tag, tag_len) = read_tag(buf)?;
    let payload = buf.get(tag_len..tag_len + tag.length)?;
    let value = varint::decode_fixed(payload, tag.length);
    Some((tag.field_id, value, tag_len + tag.length))
}

/// Decode a `(field_id, bytes)` pair written by `write_bytes`.
pub fn read_bytes(buf: &[u8]) -> Option<(u16, &[u8], usize)> {
    let (tag, tag_len) = read_tag(buf)?;
    if tag.length == 1 && buf.get(tag_len) == Some(&0xff) {
        let (len, vlen) = varint::read_varint(&buf[tag_len + 1..])?;
        let start = tag_len + 1 + vlen;
        let payload = buf.get(start..start + len as usize)?;
        Some((tag.field_id, payload, start + len as usize))
    } else {
        let payload = buf.get(tag_len..tag_len + tag.length)?;
        Some((tag.field_id, payload, tag_len + tag.length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn s2_scenario_from_spec() {
        // spec.md S2: id=5, payload="abc" -> [0x2A, 'a','b','c'].
        let mut buf = Vec::new();
        write_bytes(&mut buf, 5, b"abc");
        assert_eq!(buf, vec![0x2A, b'a', b'b', b'c']);
        let (id, payload, consumed) = read_bytes(&buf).unwrap();
        assert_eq!(id, 5);
        assert_eq!(payload, b"abc");
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn id_ranges_pick_correct_tag_width() {
        assert_eq!(tag_size(0), 1);
        assert_eq!(tag_size(29), 1);
        assert_eq!(tag_size(30), 2);
        assert_eq!(tag_size(285), 2);
        assert_eq!(tag_size(286), 3);
        assert_eq!(tag_size(u16::MAX), 3);
    }

    #[test]
    fn uint_round_trip_across_id_ranges() {
        for id in [0u16, 29, 30, 285, 286, 5000] {
            let mut buf = Vec::new();
            write_uint(&mut buf, id, 1895390231);
            let (rid, v, consumed) = read_uint(&buf).unwrap();
            assert_eq!(rid, id);
            assert_eq!(v, 1895390231);
            assert_eq!(consumed, buf.len());
        }
    }

    proptest! {
        #[test]
        fn field_round_trip(id in 0u16..=u16::MAX, v: u64) {
            let mut buf = Vec::new();
            write_uint(&mut buf, id, v);
            let (rid, rv, _) = read_uint(&buf).unwrap();
            prop_assert_eq!(rid, id);
            prop_assert_eq!(rv, v);
        }

        #[test]
        fn bytes_round_trip(id in 0u16..=u16::MAX, payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut buf = Vec::new();
            write_bytes(&mut buf, id, &payload);
            let (rid, rpayload, _) = read_bytes(&buf).unwrap();
            prop_assert_eq!(rid, id);
            prop_assert_eq!(rpayload, payload.as_slice());
        }
    }
}
