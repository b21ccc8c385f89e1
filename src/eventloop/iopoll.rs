//! Pluggable readiness engine (spec.md §4.8). Registered entities are one
//! of file descriptor, timer, or user-event, each carrying the vtable
//! `{read, write, uevent, timeout, close}` described in the spec; this
//! crate never touches a real `epoll`/`kqueue` fd (Non-goals, SPEC_FULL.md
//! §12), so the "best available readiness primitive" is a single
//! software-simulated engine that callers drive by calling [`IoPoll::fire`]
//! from wherever readiness is actually observed (a real transport's epoll
//! loop, a test harness, etc).

use std::collections::HashMap;

pub type EntityId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Read,
    Write,
    UserEvent,
    Timeout,
}

/// The vtable an entity registers with the engine.
pub trait EntityCallbacks: Send {
    fn read(&mut self) {}
    fn write(&mut self) {}
    fn uevent(&mut self) {}
    fn timeout(&mut self) {}
    fn close(&mut self) {}
}

struct Entity {
    callbacks: Box<dyn EntityCallbacks>,
}

/// One engine per worker core (spec.md §4.8). Not `Send`/`Sync`: each
/// worker owns exactly one and never shares it.
#[derive(Default)]
pub struct IoPoll {
    entities: HashMap<EntityId, Entity>,
    next_id: EntityId,
}

impl IoPoll {
    pub fn new() -> Self {
        IoPoll {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, callbacks: Box<dyn EntityCallbacks>) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert(id, Entity { callbacks });
        id
    }

    pub fn unregister(&mut self, id: EntityId) {
        if let Some(mut entity) = self.entities.remove(&id) {
            entity.callbacks.close();
        }
    }

    /// Delivers a readiness event to `id`'s callback, as if the OS-level
    /// poller woke it. Returns `false` if the entity isn't registered.
    pub fn fire(&mut self, id: EntityId, readiness: Readiness) -> bool {
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        match readiness {
            Readiness::Read => entity.callbacks.read(),
            Readiness::Write => entity.callbacks.write(),
            Readiness::UserEvent => entity.callbacks.uevent(),
            Readiness::Timeout => entity.callbacks.timeout(),
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingEntity(Arc<AtomicU32>);

    impl EntityCallbacks for CountingEntity {
        fn read(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn uevent(&mut self) {
            self.0.fetch_add(100, Ordering::Relaxed);
        }
    }

    #[test]
    fn fire_dispatches_to_registered_entity() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut poll = IoPoll::new();
        let id = poll.register(Box::new(CountingEntity(counter.clone())));
        assert!(poll.fire(id, Readiness::Read));
        assert!(poll.fire(id, Readiness::UserEvent));
        assert_eq!(counter.load(Ordering::Relaxed), 101);
    }

    #[test]
    fn fire_on_unknown_id_is_noop() {
        let mut poll = IoPoll::new();
        assert!(!poll.fire(999, Readiness::Read));
    }

    #[test]
    fn unregister_calls_close_and_drops_entity() {
        let counter = Arc::new(AtomicU32::new(0));
        struct ClosingEntity(Arc<AtomicU32>);
        impl EntityCallbacks for ClosingEntity {
            fn close(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }
        let mut poll = IoPoll::new();
        let id = poll.register(Box::new(ClosingEntity(counter.clone())));
        poll.unregister(id);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
        assert!(!poll.fire(id, Readiness::Read));
    }
}
