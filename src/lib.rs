//! `raleighsl`: a pluggable, transactional object store built on a
//! cooperative, per-core task scheduler. Each module's doc comment cites
//! the spec section it implements; `DESIGN.md` is the grounding ledger.

pub mod bucket;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod device;
pub mod error;
pub mod eventloop;
pub mod intrusive;
pub mod object;
pub mod primitives;
pub mod semantic;
pub mod task;
pub mod txn;
pub mod wire;

pub use config::Config;
pub use error::{Error, Result};
