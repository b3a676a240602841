//! Peer Session (spec.md §3, §4.D).

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::frame::Frame;

/// Bound on the outbound per-peer queue. Spec.md §4.D: the transport
/// buffers up to its own back-pressure limit (~1 MiB); we approximate that
/// budget in frame *count* rather than bytes, since frames here are
/// already capped at `maxPayload` (or spilled to a `get:` reference).
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// One connected participant. Cheap to clone (`Arc`); every reference
/// shares the same outbound queue and close signal.
pub struct PeerHandle {
    pub id: String,
    pub group: String,
    pub connected_at_ms: u64,
    pub version: String,
    outbound: mpsc::Sender<Frame>,
    close: Mutex<Option<oneshot::Sender<()>>>,
}

/// The receiving half a connection's writer task drains, plus the signal
/// it should also select on to know when to close.
pub struct PeerIo {
    pub outbound: mpsc::Receiver<Frame>,
    pub closed: oneshot::Receiver<()>,
}

impl PeerHandle {
    /// Construct a new handle together with the I/O the connection task
    /// will drive.
    pub fn new(id: String, group: String, connected_at_ms: u64, version: String) -> (Arc<Self>, PeerIo) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let (close_tx, close_rx) = oneshot::channel();
        let handle = Arc::new(Self {
            id,
            group,
            connected_at_ms,
            version,
            outbound: outbound_tx,
            close: Mutex::new(Some(close_tx)),
        });
        (handle, PeerIo {
            outbound: outbound_rx,
            closed: close_rx,
        })
    }

    /// Enqueue a frame for delivery. Returns `false` on back-pressure (the
    /// outbound queue is full) or if the connection already closed — the
    /// caller logs a warning and never retries (spec.md §4.D, §7).
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.try_send(frame).is_ok()
    }

    /// Signal the connection task to close. Idempotent: firing twice (e.g.
    /// once from duplicate-id eviction, once from a racing client
    /// disconnect) is a no-op the second time (spec.md §8, "idempotent
    /// disconnect").
    pub fn close(&self) {
        if let Some(tx) = self.close.lock().take() {
            let _ = tx.send(());
        }
    }
}
