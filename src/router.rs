//! Router (spec.md §4.E).
//!
//! `Router::handle_incoming` is the central routine: resolve `ping`, strip
//! an optional `to:` prefix, spill oversized bodies to the
//! [`crate::slot::LargeMessageStore`], then dispatch to the resolved
//! recipient set. The lock-then-snapshot-then-send shape mirrors the
//! teacher's `connection::routing::relay_to_nick`: take the peer list
//! under the registry's lock, then release it before sending, so a slow
//! peer's send never holds up registry mutations.

use std::sync::Arc;

use crate::frame::{parse_inbound, Frame, InboundFrame};
use crate::peer::PeerHandle;
use crate::registry::GroupRegistry;
use crate::slot::LargeMessageStore;

/// The literal recipient value meaning "every other peer in the group,
/// delivered individually" (spec.md §4.E step 4). Exists only for testing;
/// behaviorally equivalent to the empty-recipient broadcast case.
pub const RECIPIENT_ALL: &str = "all";

pub struct Router {
    registry: Arc<GroupRegistry>,
    store: Arc<LargeMessageStore>,
    max_payload: usize,
}

impl Router {
    pub fn new(registry: Arc<GroupRegistry>, store: Arc<LargeMessageStore>, max_payload: usize) -> Self {
        Self {
            registry,
            store,
            max_payload,
        }
    }

    /// Handle one inbound frame from `sender_id` in `group`.
    pub fn handle_incoming(&self, group: &str, sender_id: &str, text: &str) {
        let Some(sender) = self.registry.find_by_id(group, sender_id) else {
            tracing::warn!(group, sender_id, "dispatch from unknown sender id, dropping");
            return;
        };

        match parse_inbound(text) {
            InboundFrame::Ping => {
                if !sender.send(Frame::Pong) {
                    tracing::warn!(group, sender_id, "back-pressure sending pong");
                }
            }
            InboundFrame::Directed { recipient, body } => {
                self.dispatch(&sender, group, &recipient, body);
            }
            InboundFrame::Broadcast { body } => {
                self.dispatch(&sender, group, "", body);
            }
        }
    }

    /// Resolve `recipient` and deliver `body`, spilling to the sideband
    /// store first if it exceeds `max_payload` (spec.md §4.E step 3).
    fn dispatch(&self, sender: &Arc<PeerHandle>, group: &str, recipient: &str, body: String) {
        let body = if body.len() > self.max_payload {
            let slot_id = self.store.put(body.into_bytes());
            tracing::debug!(group, slot_id, "spilled oversized frame to sideband store");
            format!("get:{slot_id}")
        } else {
            body
        };

        if recipient.is_empty() {
            // Broadcast: every other peer in the group, delivered
            // unprefixed via each peer's own send path (spec.md §4.E: the
            // source's native pub/sub fan-out carries no prefix because
            // the subscription channel itself conveys "this is a peer
            // message"; an explicit per-peer send is behaviorally
            // equivalent — spec.md §9 re-architecture hint (b)).
            let others = self.peers_except(group, sender);
            let frame = Frame::Broadcast { body };
            for peer in others {
                if !peer.send(frame.clone()) {
                    tracing::warn!(group, peer_id = %peer.id, "back-pressure on broadcast send");
                }
            }
        } else if recipient == RECIPIENT_ALL {
            // Same set as the broadcast case, but delivered individually
            // with a `msg:` prefix — testing-only, otherwise equivalent.
            let others = self.peers_except(group, sender);
            let frame = Frame::Msg { body };
            for peer in others {
                if !peer.send(frame.clone()) {
                    tracing::warn!(group, peer_id = %peer.id, "back-pressure on msg:all send");
                }
            }
        } else {
            match self.registry.find_by_id(group, recipient) {
                Some(peer) => {
                    if !peer.send(Frame::Msg { body }) {
                        tracing::warn!(group, peer_id = %peer.id, "back-pressure on direct send");
                    }
                }
                None => {
                    tracing::debug!(group, recipient, "direct recipient not found, dropping");
                }
            }
        }
    }

    /// Snapshot every peer in `group` except `sender`. Taken under the
    /// registry's lock and released before any send happens.
    fn peers_except(&self, group: &str, sender: &Arc<PeerHandle>) -> Vec<Arc<PeerHandle>> {
        self.registry
            .list(group)
            .into_iter()
            .filter(|p| !Arc::ptr_eq(p, sender))
            .collect()
    }
}
