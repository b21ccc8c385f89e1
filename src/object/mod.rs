//! Object dispatch (spec.md §4.10): the fs holds a registry of object
//! plugins keyed by a type label; `execute` resolves a name to an oid,
//! takes the object from the cache, acquires the rwcsem in the mode the
//! message implies, dispatches the plugin callback, and releases. A
//! dispatch that cannot take the rwcsem right away parks on the entry's
//! waiter list instead of blocking the calling thread (spec.md §4.8
//! suspension point (b)), resumed as a fresh task once a slot frees.

pub mod plugins;

use crate::cache::ObjectCache;
use crate::concurrency::rwcsem::Mode;
use crate::concurrency::RwCSem;
use crate::device::log::{append_record, field_bytes, field_string, field_u64, read_record};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::eventloop::{Runtime, WorkerHandle};
use crate::semantic::SemanticLayer;
use crate::task::{Suspend, VTask};
use crate::txn::{Atom, TransactionManager};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Semantic ops use bits 26-29 class=0; object ops class=1 (spec.md §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgClass {
    Semantic,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticOp {
    Create,
    Rename,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOp {
    Query,
    Insert,
    Update,
    Remove,
    Ioctl,
    Sync,
    Unlink,
}

impl ObjectOp {
    fn mode(self) -> Mode {
        match self {
            ObjectOp::Query => Mode::Read,
            ObjectOp::Insert | ObjectOp::Update | ObjectOp::Remove | ObjectOp::Ioctl => Mode::Write,
            ObjectOp::Sync => Mode::Commit,
            ObjectOp::Unlink => Mode::Write,
        }
    }
}

/// Encodes a message type word: class in bit 3 of the class nibble, op
/// index in the low 3 bits, per spec.md §9's resolved `op < 8` fix.
pub fn encode_msg_type(class: MsgClass, op: u32) -> u32 {
    assert!(op < 8, "op index must fit in 3 bits");
    let class_bit = matches!(class, MsgClass::Object) as u32;
    ((class_bit << 3) | op) << 26
}

pub fn decode_msg_type(word: u32) -> (MsgClass, u32) {
    let nibble = (word >> 26) & 0xF;
    let class = if nibble & 0x8 != 0 { MsgClass::Object } else { MsgClass::Semantic };
    (class, nibble & 0x7)
}

pub enum Msg {
    Query,
    Insert(Vec<u8>),
    Update(Vec<u8>, Vec<u8>),
    Remove(Vec<u8>),
    Ioctl(Vec<u8>),
    Sync,
    Unlink,
}

#[derive(Debug)]
pub enum Reply {
    None,
    Value(Vec<u8>),
    Values(Vec<Vec<u8>>),
}

/// An object type's behavior: `create` builds fresh state, the rest
/// mutate or query it. Atoms generated during a mutating call are
/// appended to the active transaction by the caller (`execute`), not the
/// plugin, so plugins stay ignorant of transaction bookkeeping.
pub trait ObjectPlugin: Send + Sync {
    fn type_label(&self) -> &'static str;
    fn create(&self) -> Vec<u8>;
    fn query(&self, data: &[u8]) -> Result<Reply>;
    fn insert(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply>;
    fn update(&self, data: &mut Vec<u8>, key: Vec<u8>, value: Vec<u8>) -> Result<Reply>;
    fn remove(&self, data: &mut Vec<u8>, key: Vec<u8>) -> Result<Reply>;
    fn ioctl(&self, data: &mut Vec<u8>, payload: Vec<u8>) -> Result<Reply>;
}

/// Object state log lives at a reserved high offset in the shared
/// device so it never collides with the semantic layer's own log, which
/// starts at offset 0 in the same arena.
const STATE_REGION_BASE: u64 = 1 << 32;
const TAG_OBJECT_STATE: u8 = 0;
const FIELD_OID: u16 = 1;
const FIELD_TYPE_LABEL: u16 = 2;
const FIELD_STATE: u16 = 3;

pub struct ObjectDispatch<D: Device> {
    pub semantic: SemanticLayer,
    pub cache: ObjectCache<ObjectEntry>,
    pub txns: TransactionManager,
    pub device: Arc<D>,
    plugins: HashMap<&'static str, Arc<dyn ObjectPlugin>>,
    oid_type: Mutex<HashMap<u64, &'static str>>,
    state_log_offset: AtomicU64,
}

pub struct ObjectEntry {
    pub sem: RwCSem,
    pub state: Mutex<Vec<u8>>,
}

/// What one attempt at `execute` produced: either a final result, or a
/// lock conflict the caller should park on (spec.md §4.8 suspension
/// point (b)) and retry once the entry's semaphore frees up.
enum Attempt {
    Done(Result<Reply>),
    Parked(Arc<ObjectEntry>, Mode, Msg),
}

impl<D: Device + 'static> ObjectDispatch<D> {
    pub fn new(device: Arc<D>, cache_capacity: usize, cache_stripes: usize, cache_policy: crate::config::CachePolicyKind) -> Self {
        let device_dyn: Arc<dyn Device> = device.clone();
        ObjectDispatch {
            semantic: SemanticLayer::open_on(device_dyn),
            cache: ObjectCache::new(cache_capacity, cache_stripes, cache_policy),
            txns: TransactionManager::new(),
            device,
            plugins: HashMap::new(),
            oid_type: Mutex::new(HashMap::new()),
            state_log_offset: AtomicU64::new(STATE_REGION_BASE),
        }
    }

    fn device_dyn(&self) -> Arc<dyn Device> {
        self.device.clone()
    }

    pub fn register_plugin(&mut self, plugin: Arc<dyn ObjectPlugin>) {
        self.plugins.insert(plugin.type_label(), plugin);
    }

    /// Replays the object-state log, reinserting each persisted object
    /// into the cache under the plugin whose label matches. Call after
    /// registering plugins, since a label can only be resolved against
    /// the registry that's live at replay time.
    pub fn replay_state(&self) {
        let device = self.device_dyn();
        let mut offset = STATE_REGION_BASE;
        while let Some((tag, fields, consumed)) = read_record(device.as_ref(), offset) {
            if tag == TAG_OBJECT_STATE {
                if let (Some(oid), Some(label), Some(state)) =
                    (field_u64(&fields, FIELD_OID), field_string(&fields, FIELD_TYPE_LABEL), field_bytes(&fields, FIELD_STATE))
                {
                    let static_label = self.plugins.keys().copied().find(|k| *k == label.as_str());
                    if let Some(static_label) = static_label {
                        self.oid_type.lock().insert(oid, static_label);
                        self.cache.try_insert(oid, ObjectEntry { sem: RwCSem::new(), state: Mutex::new(state) });
                        self.cache.release(oid);
                    }
                }
            }
            offset += consumed;
        }
        self.state_log_offset.store(offset, Ordering::Relaxed);
    }

    fn persist_state(&self, oid: u64, type_label: &'static str, data: &[u8]) {
        let device = self.device_dyn();
        let _ = append_record(
            device.as_ref(),
            &self.state_log_offset,
            TAG_OBJECT_STATE,
            &[(FIELD_OID, &oid.to_le_bytes()), (FIELD_TYPE_LABEL, type_label.as_bytes()), (FIELD_STATE, data)],
        );
    }

    pub fn create_object(&self, name: &str, type_label: &'static str) -> Result<u64> {
        let plugin = self.plugins.get(type_label).ok_or(Error::PluginNotLoaded)?;
        let oid = self.semantic.create(name)?;
        self.oid_type.lock().insert(oid, type_label);
        let initial = plugin.create();
        self.persist_state(oid, type_label, &initial);
        self.cache.try_insert(
            oid,
            ObjectEntry {
                sem: RwCSem::new(),
                state: Mutex::new(initial),
            },
        );
        self.cache.release(oid);
        Ok(oid)
    }

    /// `execute(fs, name, msg)` (spec.md §4.10): resolves name to oid,
    /// takes the object from the cache, acquires the rwcsem in the
    /// implied mode, dispatches, releases. Blocks the calling thread
    /// behaviourally by converting a lock conflict into an error instead
    /// of parking, preserving this API for callers that want a plain
    /// synchronous call; `execute_task` gives the real non-blocking path.
    pub fn execute(&self, txn: u64, name: &str, op: ObjectOp, msg: Msg) -> Result<Reply> {
        match self.try_execute(txn, name, op, msg) {
            Attempt::Done(result) => result,
            Attempt::Parked(_entry, _mode, _msg) => Err(Error::TxnLockedOperation),
        }
    }

    /// Runs `execute` as a cooperative task on worker `core`: a lock
    /// conflict parks a continuation on the object's rwcsem instead of
    /// blocking, reposted onto the same worker once the lock frees
    /// (spec.md §4.8 suspension point (b)). `on_done` runs exactly once,
    /// from whichever worker thread finally completes the attempt.
    pub fn execute_task(
        self: Arc<Self>,
        rt: &Runtime,
        core: usize,
        txn: u64,
        name: &str,
        op: ObjectOp,
        msg: Msg,
        on_done: impl FnOnce(Result<Reply>) + Send + 'static,
    ) {
        let handle = rt.handle(core);
        Self::spawn_attempt(self, handle, core, txn, name.to_string(), op, msg, Box::new(on_done));
    }

    fn spawn_attempt(
        dispatch: Arc<Self>,
        handle: WorkerHandle,
        core: usize,
        txn: u64,
        name: String,
        op: ObjectOp,
        msg: Msg,
        on_done: Box<dyn FnOnce(Result<Reply>) + Send>,
    ) {
        let mut msg_slot = Some(msg);
        let mut on_done_slot = Some(on_done);
        let post_handle = handle.clone();
        let task = VTask::new(
            txn,
            0,
            Box::new(move || {
                let msg = msg_slot.take().expect("attempt task dispatched twice");
                let on_done = on_done_slot.take().expect("attempt task dispatched twice");
                match dispatch.try_execute(txn, &name, op, msg) {
                    Attempt::Done(result) => {
                        on_done(result);
                        Suspend::Completed
                    }
                    Attempt::Parked(entry, mode, msg) => {
                        let dispatch = dispatch.clone();
                        let handle = handle.clone();
                        let name = name.clone();
                        entry.sem.park(
                            mode,
                            Box::new(move || {
                                Self::spawn_attempt(dispatch, handle, core, txn, name, op, msg, on_done);
                            }),
                        );
                        Suspend::Completed
                    }
                }
            }),
        );
        let _ = post_handle.post(core, task);
    }

    fn try_execute(&self, txn: u64, name: &str, op: ObjectOp, msg: Msg) -> Attempt {
        let oid = match self.semantic.open(name) {
            Ok(oid) => oid,
            Err(e) => return Attempt::Done(Err(e)),
        };
        let type_label = match self.oid_type.lock().get(&oid).copied() {
            Some(label) => label,
            None => return Attempt::Done(Err(Error::ObjectWrongType)),
        };
        let entry = match self.cache.lookup(oid) {
            Some(entry) => entry,
            None => return Attempt::Done(Err(Error::ObjectNotFound)),
        };

        let mode = op.mode();
        if !entry.sem.try_acquire(mode) {
            self.cache.release(oid);
            return Attempt::Parked(entry, mode, msg);
        }

        let result = self.dispatch_locked(txn, oid, name, type_label, &entry, op, msg);

        entry.sem.release(mode);
        self.cache.release(oid);
        Attempt::Done(result)
    }

    fn dispatch_locked(
        &self,
        txn: u64,
        oid: u64,
        name: &str,
        type_label: &'static str,
        entry: &Arc<ObjectEntry>,
        op: ObjectOp,
        msg: Msg,
    ) -> Result<Reply> {
        if op == ObjectOp::Unlink {
            let result = self.semantic.unlink(name).map(|_| {
                self.oid_type.lock().remove(&oid);
                Reply::None
            });
            if let Err(e) = &result {
                if e.is_txn_fatal() {
                    let _ = self.txns.rollback(txn);
                }
            }
            if result.is_ok() {
                self.cache.remove(oid);
            }
            return result;
        }

        if op == ObjectOp::Query {
            let plugin = self.plugins.get(type_label).ok_or(Error::PluginNotLoaded)?;
            let data = entry.state.lock();
            return plugin.query(&data);
        }

        if op == ObjectOp::Sync {
            return Ok(Reply::None);
        }

        // Mutating ops (Insert/Update/Remove/Ioctl): snapshot the
        // pre-mutation state so a later rollback of this transaction can
        // restore it, then dispatch, then persist whatever the state
        // ends up holding once rollback (if any) has run.
        let plugin = match self.plugins.get(type_label) {
            Some(p) => p.clone(),
            None => return Err(Error::PluginNotLoaded),
        };

        let before = entry.state.lock().clone();
        let result = {
            let mut data = entry.state.lock();
            match msg {
                Msg::Insert(payload) => plugin.insert(&mut data, payload),
                Msg::Update(key, value) => plugin.update(&mut data, key, value),
                Msg::Remove(key) => plugin.remove(&mut data, key),
                Msg::Ioctl(payload) => plugin.ioctl(&mut data, payload),
                Msg::Query | Msg::Sync | Msg::Unlink => unreachable!("handled above"),
            }
        };

        let undo_entry = entry.clone();
        let _ = self.txns.add_atom(
            txn,
            Atom {
                object_oid: oid,
                undo: Box::new(move || {
                    *undo_entry.state.lock() = before;
                }),
            },
        );

        // Only the "fatal to a transaction" error class auto-rolls back
        // (spec.md §7); ordinary object-layer violations like a missing
        // key leave prior successful mutations in this txn untouched.
        if let Err(e) = &result {
            if e.is_txn_fatal() {
                let _ = self.txns.rollback(txn);
            }
        }

        let final_state = entry.state.lock().clone();
        self.persist_state(oid, type_label, &final_state);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_round_trips() {
        let word = encode_msg_type(MsgClass::Object, 5);
        let (class, op) = decode_msg_type(word);
        assert_eq!(class, MsgClass::Object);
        assert_eq!(op, 5);
    }

    #[test]
    fn semantic_msg_type_has_class_bit_unset() {
        let word = encode_msg_type(MsgClass::Semantic, 2);
        let (class, op) = decode_msg_type(word);
        assert_eq!(class, MsgClass::Semantic);
        assert_eq!(op, 2);
    }

    #[test]
    #[should_panic]
    fn op_overflow_asserts() {
        encode_msg_type(MsgClass::Object, 8);
    }
}
