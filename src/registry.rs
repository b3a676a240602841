//! Group Registry (spec.md §3, §4.C).
//!
//! A mapping from group name to its live peer set, following the teacher's
//! `SharedState` convention of `parking_lot::Mutex`-guarded collections
//! rather than a single-threaded event loop — spec.md §5 explicitly allows
//! either model.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::peer::PeerHandle;

#[derive(Default)]
pub struct GroupRegistry {
    groups: Mutex<HashMap<String, Vec<Arc<PeerHandle>>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `peer`, evicting and closing any existing peer with the same id
    /// first. Eviction happens synchronously here so the unique-id
    /// invariant holds at every instant; the evicted peer's own close path
    /// still runs (driven by the closed signal) and publishes its
    /// `disconnect:` broadcast the normal way. Returns the evicted peer,
    /// if any.
    pub fn add(&self, peer: Arc<PeerHandle>) -> Option<Arc<PeerHandle>> {
        let mut groups = self.groups.lock();
        let peers = groups.entry(peer.group.clone()).or_default();
        let evicted = peers
            .iter()
            .position(|p| p.id == peer.id)
            .map(|pos| peers.remove(pos));
        if let Some(ref incumbent) = evicted {
            incumbent.close();
        }
        peers.push(peer);
        evicted
    }

    /// Remove `peer` from `group`, matching by identity (not just id) so a
    /// stale close event for an already-evicted peer is a harmless no-op
    /// even if another peer has since claimed the same id.
    pub fn remove(&self, group: &str, peer: &Arc<PeerHandle>) {
        let mut groups = self.groups.lock();
        if let Some(peers) = groups.get_mut(group) {
            peers.retain(|p| !Arc::ptr_eq(p, peer));
        }
    }

    pub fn find_by_id(&self, group: &str, id: &str) -> Option<Arc<PeerHandle>> {
        self.groups
            .lock()
            .get(group)
            .and_then(|peers| peers.iter().find(|p| p.id == id).cloned())
    }

    /// All peers currently in `group`, in insertion order.
    pub fn list(&self, group: &str) -> Vec<Arc<PeerHandle>> {
        self.groups.lock().get(group).cloned().unwrap_or_default()
    }

    /// Every peer across every group. Used by `Server::stop` to close all
    /// active sessions.
    pub fn all(&self) -> Vec<Arc<PeerHandle>> {
        self.groups.lock().values().flatten().cloned().collect()
    }
}
