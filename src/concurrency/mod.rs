//! Concurrency primitives (spec.md §4.6): the ticket lock, the
//! read/write/commit semaphore, and the counting semaphore/latch.

pub mod rwcsem;
pub mod semaphore;
pub mod ticket;

pub use rwcsem::{Mode as RwCSemMode, RwCSem};
pub use semaphore::Semaphore;
pub use ticket::{StripedTicketLocks, TicketLock};
