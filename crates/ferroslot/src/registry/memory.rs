//! An in-process stand-in for a coordination service.
//!
//! [`MemoryCoordinator`] plays the server: it tracks which worker slots of each
//! [`NodePath`] are held and by which session. Every [`MemoryRegistry`] is one
//! client session. It claims the lowest free slot, fans connectivity events out
//! to its listeners, and can be told to fail, which is what tests and local
//! demos need.

use alloc::sync::Arc;
use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::{
    Error, Result, SnowflakeId,
    registry::{ConnectionEvent, ConnectionListener, NodePath, WorkerRegistry},
};

#[derive(Default)]
struct CoordinatorState {
    // group -> slot -> owning session
    groups: HashMap<NodePath, BTreeMap<u16, u64>>,
}

/// Shared slot table. Clones share the same table.
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new client session for `path`.
    pub fn client(&self, path: NodePath) -> MemoryRegistry {
        MemoryRegistry {
            coordinator: self.clone(),
            session: self.next_session.fetch_add(1, Ordering::Relaxed),
            path,
            listeners: Mutex::new(Vec::new()),
            reject_registrations: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            register_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Slots currently held in `path`, in ascending order.
    pub fn held_slots(&self, path: &NodePath) -> Vec<u16> {
        self.state
            .lock()
            .groups
            .get(path)
            .map(|slots| slots.keys().copied().collect())
            .unwrap_or_default()
    }

    fn claim(&self, path: &NodePath, session: u64) -> Option<u16> {
        let mut state = self.state.lock();
        let slots = state.groups.entry(path.clone()).or_default();

        if let Some((slot, _)) = slots.iter().find(|(_, owner)| **owner == session) {
            return Some(*slot);
        }
        let free = (0..=SnowflakeId::MAX_WORKER_ID as u16).find(|slot| !slots.contains_key(slot))?;
        slots.insert(free, session);
        Some(free)
    }

    fn release(&self, path: &NodePath, session: u64) -> Option<u16> {
        let mut state = self.state.lock();
        let slots = state.groups.get_mut(path)?;
        let slot = slots
            .iter()
            .find_map(|(slot, owner)| (*owner == session).then_some(*slot))?;
        slots.remove(&slot);
        Some(slot)
    }
}

/// One client session against a [`MemoryCoordinator`].
///
/// Listeners stay subscribed for as long as the session lives. A listener
/// from [`ConnectionStateBridge::spawn`](crate::ConnectionStateBridge::spawn)
/// is inert once its service is dropped: its dispatcher thread has exited
/// and later events are discarded.
pub struct MemoryRegistry {
    coordinator: MemoryCoordinator,
    session: u64,
    path: NodePath,
    listeners: Mutex<Vec<Arc<dyn ConnectionListener>>>,
    reject_registrations: AtomicBool,
    fail_logout: AtomicBool,
    register_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn path(&self) -> &NodePath {
        &self.path
    }

    /// Delivers `event` to every listener on the calling thread.
    pub fn emit(&self, event: ConnectionEvent) {
        let listeners = self.listeners.lock().clone();
        #[cfg(feature = "tracing")]
        tracing::debug!(%event, listeners = listeners.len(), "Emitting connection event");
        for listener in listeners {
            listener.state_changed(event);
        }
    }

    /// Drops the session's slot on the coordinator side, as an expired
    /// session would, and reports [`ConnectionEvent::LostPermanently`].
    pub fn expire_session(&self) {
        self.coordinator.release(&self.path, self.session);
        self.emit(ConnectionEvent::LostPermanently);
    }

    /// Makes every following [`WorkerRegistry::register`] call fail.
    pub fn reject_registrations(&self, reject: bool) {
        self.reject_registrations.store(reject, Ordering::Release);
    }

    /// Makes every following [`WorkerRegistry::logout`] call fail after
    /// releasing nothing.
    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::Release);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::Acquire)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::Acquire)
    }

    /// The slot this session holds right now.
    pub fn held_slot(&self) -> Option<u16> {
        self.coordinator
            .state
            .lock()
            .groups
            .get(&self.path)?
            .iter()
            .find_map(|(slot, owner)| (*owner == self.session).then_some(*slot))
    }
}

impl WorkerRegistry for MemoryRegistry {
    fn register(&self) -> Result<i64> {
        self.register_calls.fetch_add(1, Ordering::AcqRel);
        if self.reject_registrations.load(Ordering::Acquire) {
            return Err(Error::registration(format!(
                "registry rejected session {} at {}",
                self.session, self.path
            )));
        }
        let slot = self
            .coordinator
            .claim(&self.path, self.session)
            .ok_or_else(|| Error::registration(format!("no free worker slot under {}", self.path)))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %self.path.worker_path(slot), session = self.session, "Claimed worker slot");
        Ok(i64::from(slot))
    }

    fn assigned_group_name(&self) -> Option<String> {
        Some(self.path.group().to_owned())
    }

    fn add_connection_listener(&self, listener: Arc<dyn ConnectionListener>) {
        self.listeners.lock().push(listener);
    }

    fn logout(&self) -> Result<()> {
        self.logout_calls.fetch_add(1, Ordering::AcqRel);
        if self.fail_logout.load(Ordering::Acquire) {
            return Err(Error::registration(format!(
                "failed to release session {} at {}",
                self.session, self.path
            )));
        }
        let _released = self.coordinator.release(&self.path, self.session);
        #[cfg(feature = "tracing")]
        {
            if let Some(slot) = _released {
                tracing::debug!(path = %self.path.worker_path(slot), session = self.session, "Released worker slot");
            }
        }
        Ok(())
    }
}
