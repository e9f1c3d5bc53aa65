//! Session registry
//!
//! Maps each device address to at most one [`GattSession`] and each platform
//! handle back to its address. Sessions are guarded individually, so work on
//! one device never waits on another device's lock.

use crate::domain::address::DeviceAddress;
use crate::infrastructure::bluetooth::connection::GattSession;
use crate::infrastructure::bluetooth::transport::GattHandle;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type SharedSession = Arc<Mutex<GattSession>>;

pub struct SessionRegistry {
    sessions: DashMap<DeviceAddress, SharedSession>,
    handles: DashMap<GattHandle, DeviceAddress>,
    next_handle: AtomicU64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `address` unless one exists already.
    ///
    /// The session gets a fresh handle that resolves as soon as this
    /// returns. `create` must not block; the address slot is held while it
    /// runs. Returns `None` when the address already has a session.
    pub fn get_or_create<F>(&self, address: DeviceAddress, create: F) -> Option<SharedSession>
    where
        F: FnOnce(&DeviceAddress, GattHandle) -> GattSession,
    {
        match self.sessions.entry(address) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let handle = GattHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
                let shared = Arc::new(Mutex::new(create(slot.key(), handle)));
                shared.lock().bind(Arc::downgrade(&shared));
                self.handles.insert(handle, slot.key().clone());
                slot.insert(Arc::clone(&shared));
                Some(shared)
            }
        }
    }

    pub fn get(&self, address: &DeviceAddress) -> Option<SharedSession> {
        self.sessions.get(address).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregister the session of `address`; its handle stops resolving at once
    pub fn remove(&self, address: &DeviceAddress) -> Option<SharedSession> {
        let (_, session) = self.sessions.remove(address)?;
        let handle = session.lock().handle();
        self.handles.remove(&handle);
        Some(session)
    }

    /// Unregister the session of `address` only if it still owns `handle`.
    /// Used to roll back a connection attempt the platform refused.
    pub fn discard(&self, address: &DeviceAddress, handle: GattHandle) -> Option<SharedSession> {
        let (_, session) = self
            .sessions
            .remove_if(address, |_, session| session.lock().handle() == handle)?;
        self.handles.remove(&handle);
        Some(session)
    }

    /// Resolve a callback's connection handle to its live session
    pub fn session_for_handle(&self, handle: GattHandle) -> Option<SharedSession> {
        let address = self.handles.get(&handle)?.value().clone();
        self.get(&address)
    }

    pub fn contains(&self, address: &DeviceAddress) -> bool {
        self.sessions.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
