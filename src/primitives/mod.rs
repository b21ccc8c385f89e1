//! Primitives: varint/field coding, byte slices, refcounted bytes, human
//! formatting, a latency histogram, a non-crypto RNG, hashing and
//! checksums (spec.md §4.1, §11).

pub mod bytes;
pub mod checksum;
pub mod field;
pub mod hash;
pub mod histogram;
pub mod human;
pub mod rng;
pub mod varint;

pub use bytes::Bytes;
pub use histogram::Histogram;
