//! Large-Message Store (spec.md §3, §4.B).
//!
//! Slot ids follow the same time-sortable-id shape as the teacher's
//! `msgid::generate` (ULID: timestamp + random, Crockford base32), adapted
//! to spec.md's exact scheme: a 24-character base-36 id built from three
//! 8-char zero-padded segments — timestamp, a wrapping sequence counter,
//! and a random value — rather than ULID's 26-char Crockford base32.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
/// 36^8 — the modulus each 8-char segment wraps at.
const BASE36_POW8: u64 = 2_821_109_907_456;

/// Slots expire 60 seconds after creation, or on first successful retrieval.
pub const SLOT_TTL: Duration = Duration::from_secs(60);

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn encode_base36(mut n: u64, width: usize) -> String {
    let mut buf = vec![b'0'; width];
    for i in (0..width).rev() {
        buf[i] = BASE36[(n % 36) as usize];
        n /= 36;
    }
    // SAFETY: every byte comes from the ASCII BASE36 alphabet.
    unsafe { String::from_utf8_unchecked(buf) }
}

/// Generate a 24-character slot id: timestamp, sequence, random — each an
/// 8-char zero-padded base-36 segment.
pub fn generate_slot_id() -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % BASE36_POW8;
    let rand_val: u64 = rand::thread_rng().gen_range(0..BASE36_POW8);

    let mut id = String::with_capacity(24);
    id.push_str(&encode_base36(now_ms % BASE36_POW8, 8));
    id.push_str(&encode_base36(seq, 8));
    id.push_str(&encode_base36(rand_val, 8));
    id
}

struct Slot {
    payload: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    expiry_heap: BinaryHeap<Reverse<(Instant, String)>>,
}

/// Holds oversized payloads spilled by the [`crate::router::Router`],
/// shared across every group (a slot id is globally unique — spec.md §5).
pub struct LargeMessageStore {
    inner: Mutex<Inner>,
}

impl Default for LargeMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LargeMessageStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store `payload`, returning the id it was assigned.
    pub fn put(&self, payload: Vec<u8>) -> String {
        let id = generate_slot_id();
        let expires_at = Instant::now() + SLOT_TTL;
        let mut inner = self.inner.lock();
        inner.slots.insert(id.clone(), Slot { payload, expires_at });
        inner.expiry_heap.push(Reverse((expires_at, id.clone())));
        id
    }

    /// Remove and return the payload for `id`, or `None` if absent or
    /// already expired. At most one concurrent caller for the same id
    /// observes `Some` — `remove` is atomic under the lock.
    pub fn take(&self, id: &str) -> Option<Vec<u8>> {
        self.inner.lock().slots.remove(id).map(|s| s.payload)
    }

    /// Drop the slot if still present. A no-op otherwise.
    pub fn expire(&self, id: &str) {
        self.inner.lock().slots.remove(id);
    }

    /// Sweep all slots whose expiry has passed. Returns the count removed.
    /// Run periodically by [`crate::server::Server`] so slots are freed
    /// even when nobody ever calls `take`.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let mut removed = 0;
        while let Some(&Reverse((expires_at, ref id))) = inner.expiry_heap.peek() {
            if expires_at > now {
                break;
            }
            let id = id.clone();
            inner.expiry_heap.pop();
            if inner.slots.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id_is_24_base36_chars() {
        let id = generate_slot_id();
        assert_eq!(id.len(), 24);
        assert!(id.bytes().all(|b| BASE36.contains(&b)));
    }

    #[test]
    fn slot_ids_are_unique_under_rapid_generation() {
        let a = generate_slot_id();
        let b = generate_slot_id();
        assert_ne!(a, b);
    }

    #[test]
    fn put_then_take_returns_payload_once() {
        let store = LargeMessageStore::new();
        let id = store.put(b"hello".to_vec());
        assert_eq!(store.take(&id), Some(b"hello".to_vec()));
        assert_eq!(store.take(&id), None, "second take must report NotFound");
    }

    #[test]
    fn take_of_unknown_id_is_not_found() {
        let store = LargeMessageStore::new();
        assert_eq!(store.take("does-not-exist"), None);
    }

    #[test]
    fn expire_drops_without_panicking_twice() {
        let store = LargeMessageStore::new();
        let id = store.put(b"x".to_vec());
        store.expire(&id);
        store.expire(&id);
        assert_eq!(store.take(&id), None);
    }

    #[test]
    fn sweep_expired_removes_only_timed_out_slots() {
        let store = LargeMessageStore::new();
        let fresh = store.put(b"fresh".to_vec());
        // Manually force one slot to look expired without waiting 60s.
        {
            let mut inner = store.inner.lock();
            let expired_id = generate_slot_id();
            inner.slots.insert(
                expired_id.clone(),
                Slot {
                    payload: b"stale".to_vec(),
                    expires_at: Instant::now() - Duration::from_secs(1),
                },
            );
            inner
                .expiry_heap
                .push(Reverse((Instant::now() - Duration::from_secs(1), expired_id)));
        }
        assert_eq!(store.len(), 2);
        let removed = store.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
        assert!(store.take(&fresh).is_some());
    }
}
