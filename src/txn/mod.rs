//! Transaction manager (spec.md §4.9). Grounded on the teacher's
//! `EnforcementQueue`: an `AtomicU64` id allocator plus a lock-guarded
//! table of live records keyed by that id, with a status enum driving
//! what operations are still legal. Here the table tracks transactions
//! instead of enforcement actions, and atoms/lock sets replace the
//! approval workflow.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Open,
    RollingBack,
    RolledBack,
    Committed,
    Closed,
}

/// An undo record for one mutation; `undo` is applied in reverse
/// insertion order on rollback (spec.md §4.9, §5).
pub struct Atom {
    pub object_oid: u64,
    pub undo: Box<dyn FnOnce() + Send + Sync>,
}

struct TxnRecord {
    state: TxnState,
    refs: u64,
    atoms: Vec<Atom>,
    locked_keys: HashSet<(u64, Vec<u8>)>,
    locked_operations: HashSet<(u64, &'static str)>,
}

/// Tracks all live transactions for one fs instance.
pub struct TransactionManager {
    next_id: AtomicU64,
    txns: RwLock<HashMap<u64, TxnRecord>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            next_id: AtomicU64::new(1),
            txns: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a fresh transaction id and inserts it into the
    /// live-transaction table, open and with one reference held by the
    /// caller.
    pub fn create(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.txns.write().insert(
            id,
            TxnRecord {
                state: TxnState::Open,
                refs: 1,
                atoms: Vec::new(),
                locked_keys: HashSet::new(),
                locked_operations: HashSet::new(),
            },
        );
        id
    }

    pub fn state(&self, txn: u64) -> Result<TxnState> {
        self.txns.read().get(&txn).map(|t| t.state).ok_or(Error::TxnNotFound)
    }

    /// Bumps the transaction's refcount; fails once it is closed.
    pub fn acquire(&self, txn: u64) -> Result<()> {
        let mut txns = self.txns.write();
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        if record.state == TxnState::Closed {
            return Err(Error::TxnClosed);
        }
        record.refs += 1;
        Ok(())
    }

    /// Drops a reference; the caller is responsible for not re-using
    /// `txn` afterward if this was its last reference on a closed txn.
    pub fn release(&self, txn: u64) -> Result<()> {
        let mut txns = self.txns.write();
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        record.refs = record.refs.saturating_sub(1);
        let reclaimable = record.refs == 0
            && matches!(record.state, TxnState::Committed | TxnState::RolledBack);
        if reclaimable {
            txns.remove(&txn);
        }
        Ok(())
    }

    /// Attempts to lock a key range for `txn` on `object_oid`; fails with
    /// `TxnLockedKey` if another live transaction already holds it.
    pub fn lock_key(&self, txn: u64, object_oid: u64, key: &[u8]) -> Result<()> {
        let mut txns = self.txns.write();
        let held_elsewhere = txns
            .iter()
            .any(|(id, t)| *id != txn && t.locked_keys.contains(&(object_oid, key.to_vec())));
        if held_elsewhere {
            return Err(Error::TxnLockedKey);
        }
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        self.ensure_open(record)?;
        record.locked_keys.insert((object_oid, key.to_vec()));
        Ok(())
    }

    pub fn lock_operation(&self, txn: u64, object_oid: u64, op_class: &'static str) -> Result<()> {
        let mut txns = self.txns.write();
        let held_elsewhere = txns
            .iter()
            .any(|(id, t)| *id != txn && t.locked_operations.contains(&(object_oid, op_class)));
        if held_elsewhere {
            return Err(Error::TxnLockedOperation);
        }
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        self.ensure_open(record)?;
        record.locked_operations.insert((object_oid, op_class));
        Ok(())
    }

    fn ensure_open(&self, record: &TxnRecord) -> Result<()> {
        match record.state {
            TxnState::Open => Ok(()),
            TxnState::RolledBack | TxnState::Closed => Err(Error::TxnRolledBack),
            _ => Err(Error::TxnClosed),
        }
    }

    /// Appends an atom to `txn`'s undo chain.
    pub fn add_atom(&self, txn: u64, atom: Atom) -> Result<()> {
        let mut txns = self.txns.write();
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        self.ensure_open(record)?;
        record.atoms.push(atom);
        Ok(())
    }

    /// Drops the last atom recorded for `object_oid`, used to compact
    /// redo records (spec.md §4.9's `replace`/`remove`).
    pub fn remove_last_atom_for(&self, txn: u64, object_oid: u64) -> Result<()> {
        let mut txns = self.txns.write();
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        if let Some(pos) = record.atoms.iter().rposition(|a| a.object_oid == object_oid) {
            record.atoms.remove(pos);
        }
        Ok(())
    }

    /// Walks atoms in reverse, running each undo, then transitions the
    /// transaction to `Closed` (spec.md §4.9).
    pub fn rollback(&self, txn: u64) -> Result<()> {
        let atoms = {
            let mut txns = self.txns.write();
            let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
            record.state = TxnState::RollingBack;
            std::mem::take(&mut record.atoms)
        };
        for atom in atoms.into_iter().rev() {
            (atom.undo)();
        }
        let mut txns = self.txns.write();
        if let Some(record) = txns.get_mut(&txn) {
            record.state = TxnState::RolledBack;
            record.locked_keys.clear();
            record.locked_operations.clear();
        }
        Ok(())
    }

    /// Marks a transaction committed; it is immutable from this point on.
    pub fn commit(&self, txn: u64) -> Result<()> {
        let mut txns = self.txns.write();
        let record = txns.get_mut(&txn).ok_or(Error::TxnNotFound)?;
        self.ensure_open(record)?;
        record.state = TxnState::Committed;
        record.locked_keys.clear();
        record.locked_operations.clear();
        Ok(())
    }

    pub fn atom_count(&self, txn: u64) -> Result<usize> {
        Ok(self.txns.read().get(&txn).ok_or(Error::TxnNotFound)?.atoms.len())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
