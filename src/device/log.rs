//! Shared append-only record framing for device-backed logs (spec.md
//! §6): `[len:u32 LE][tag:u8][tagged fields]`, reusing the RPC body's
//! tagged-field coding rather than inventing a second one. The semantic
//! layer's name map and the object dispatcher's state log both use this
//! format, kept apart by the offset region each log starts at.

use super::Device;
use crate::error::Result;
use crate::wire::{decode_body, encode_body};
use std::sync::atomic::{AtomicU64, Ordering};

/// Appends one record at the offset `cursor` currently holds and
/// advances it past the new record.
pub fn append_record(device: &dyn Device, cursor: &AtomicU64, tag: u8, fields: &[(u16, &[u8])]) -> Result<()> {
    let body = encode_body(fields);
    let mut record = Vec::with_capacity(1 + body.len());
    record.push(tag);
    record.extend_from_slice(&body);

    let pos = cursor.load(Ordering::Relaxed);
    device.write(pos, &(record.len() as u32).to_le_bytes())?;
    device.write(pos + 4, &record)?;
    cursor.store(pos + 4 + record.len() as u64, Ordering::Relaxed);
    Ok(())
}

/// Reads one record at `offset`; returns `(tag, fields, bytes_consumed)`,
/// or `None` at end of log. A device read past the written end is the
/// EOF sentinel, so replay loops stop naturally without a separate
/// length marker.
pub fn read_record(device: &dyn Device, offset: u64) -> Option<(u8, Vec<(u16, Vec<u8>)>, u64)> {
    let len_bytes = device.read(offset, 4).ok()?;
    let len = u32::from_le_bytes(len_bytes.try_into().ok()?) as usize;
    if len == 0 {
        return None;
    }
    let record = device.read(offset + 4, len).ok()?;
    let tag = *record.first()?;
    let fields = decode_body(&record[1..]);
    Some((tag, fields, 4 + len as u64))
}

pub fn field_string(fields: &[(u16, Vec<u8>)], id: u16) -> Option<String> {
    fields.iter().find(|(fid, _)| *fid == id).and_then(|(_, v)| String::from_utf8(v.clone()).ok())
}

pub fn field_u64(fields: &[(u16, Vec<u8>)], id: u16) -> Option<u64> {
    fields
        .iter()
        .find(|(fid, _)| *fid == id)
        .and_then(|(_, v)| v.as_slice().try_into().ok())
        .map(u64::from_le_bytes)
}

pub fn field_bytes(fields: &[(u16, Vec<u8>)], id: u16) -> Option<Vec<u8>> {
    fields.iter().find(|(fid, _)| *fid == id).map(|(_, v)| v.clone())
}
