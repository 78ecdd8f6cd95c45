//! `DeviceSession`: the owned home of decoded device state.
//!
//! The ingestion thread is the only writer. It feeds accepted payloads to
//! `ingest`, which decodes under a lock, publishes a fresh immutable
//! `DeviceSnapshot` and then delivers the resulting events to every observer,
//! in order, before returning. Readers grab the latest `Arc<DeviceSnapshot>`
//! and never see a half-updated state.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_channel as xch;
use parking_lot::{Mutex, RwLock};

use crate::decoder::{Decoder, DeviceEvent};
use crate::device::{DeviceIdentity, DeviceState};
use crate::error::FrameError;

/// Link health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub accepted: u64,
    pub bad_header: u64,
    pub invalid_length: u64,
    pub checksum_errors: u64,
    /// Frames that passed framing but could not be decoded.
    pub decode_errors: u64,
    /// Partial frames abandoned on a read timeout.
    pub abandoned: u64,
    pub idle_timeouts: u64,
    pub write_errors: u64,
    /// False after a rejected frame until the next accepted one.
    pub responding: bool,
}

impl LinkStats {
    /// Frames dropped for any framing or decoding reason.
    pub fn rejected(&self) -> u64 {
        self.invalid_length + self.checksum_errors + self.decode_errors + self.abandoned
    }
}

/// Immutable view published after every change.
#[derive(Debug, Clone, Default)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    pub previous: DeviceState,
    pub identity: Option<DeviceIdentity>,
    pub frame_rate: f32,
    pub received_at: Option<Instant>,
    pub stats: LinkStats,
}

pub type ObserverId = u64;
type Observer = Arc<dyn Fn(&DeviceEvent, &DeviceSnapshot) + Send + Sync>;

struct Inner {
    decoder: Decoder,
    stats: LinkStats,
    received_at: Option<Instant>,
}

impl Inner {
    fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            state: *self.decoder.current(),
            previous: *self.decoder.previous(),
            identity: self.decoder.identity().cloned(),
            frame_rate: self.decoder.frame_rate(),
            received_at: self.received_at,
            stats: self.stats.clone(),
        }
    }
}

pub struct DeviceSession {
    inner: Mutex<Inner>,
    published: RwLock<Arc<DeviceSnapshot>>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    next_id: AtomicU64,
}

impl Default for DeviceSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("snapshot", &*self.published.read())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

impl DeviceSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                decoder: Decoder::new(),
                stats: LinkStats::default(),
                received_at: None,
            }),
            published: RwLock::new(Arc::new(DeviceSnapshot::default())),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.published.read().clone()
    }

    /// Shorthand for `snapshot().state`.
    pub fn state(&self) -> DeviceState {
        self.published.read().state
    }

    pub fn stats(&self) -> LinkStats {
        self.published.read().stats.clone()
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.published.read().identity.clone()
    }

    /// Register an observer. It runs on the ingestion thread, so it should be quick.
    pub fn subscribe<F>(&self, f: F) -> ObserverId
    where
        F: Fn(&DeviceEvent, &DeviceSnapshot) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, Arc::new(f)));
        id
    }

    /// Remove an observer. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut obs = self.observers.lock();
        let before = obs.len();
        obs.retain(|(i, _)| *i != id);
        obs.len() != before
    }

    /// Observer that forwards every event, with the state it produced, into a
    /// bounded channel. Events are dropped when the channel is full.
    pub fn event_channel(
        &self,
        capacity: usize,
    ) -> (ObserverId, xch::Receiver<(DeviceEvent, DeviceState)>) {
        let (tx, rx) = xch::bounded(capacity.max(1));
        let id = self.subscribe(move |ev, snap| {
            if let Err(xch::TrySendError::Full(_)) = tx.try_send((*ev, snap.state)) {
                tracing::trace!(event = ?ev, "event channel full, dropping event");
            }
        });
        (id, rx)
    }

    fn publish(&self, inner: &Inner) -> Arc<DeviceSnapshot> {
        let snap = Arc::new(inner.snapshot());
        *self.published.write() = snap.clone();
        snap
    }

    /// Decode an accepted payload, publish, then notify observers in order.
    ///
    /// Undecodable payloads are counted and logged; they never reach the caller.
    pub fn ingest(&self, payload: &[u8], received_at: Instant) -> Vec<DeviceEvent> {
        let (events, snap) = {
            let mut inner = self.inner.lock();
            inner.stats.accepted += 1;
            inner.stats.responding = true;
            let events = match inner.decoder.decode(payload, received_at) {
                Ok(ev) => {
                    inner.received_at = Some(received_at);
                    ev
                }
                Err(e) => {
                    inner.stats.decode_errors += 1;
                    tracing::warn!(error = %e, len = payload.len(), "dropping undecodable payload");
                    Vec::new()
                }
            };
            let snap = self.publish(&inner);
            (events, snap)
        };
        if !events.is_empty() {
            let observers: Vec<Observer> =
                self.observers.lock().iter().map(|(_, o)| o.clone()).collect();
            for ev in &events {
                for o in &observers {
                    o(ev, &snap);
                }
            }
        }
        events
    }

    /// Record a frame the framing layer rejected. The device is marked not responding.
    pub fn on_rejected(&self, err: FrameError) {
        let mut inner = self.inner.lock();
        match err {
            FrameError::BadHeader(_) => inner.stats.bad_header += 1,
            FrameError::InvalidLength(_) => {
                inner.stats.invalid_length += 1;
                tracing::warn!(error = %err, "malformed frame length");
            }
            FrameError::Checksum { .. } => {
                inner.stats.checksum_errors += 1;
                tracing::debug!(error = %err, "frame dropped");
            }
            FrameError::Incomplete => inner.stats.abandoned += 1,
        }
        inner.stats.responding = false;
        self.publish(&inner);
    }

    /// Record a read timeout. A timeout in the middle of a frame abandons it.
    pub fn on_timeout(&self, mid_frame: bool) {
        let mut inner = self.inner.lock();
        if mid_frame {
            inner.stats.abandoned += 1;
            inner.stats.responding = false;
        } else {
            inner.stats.idle_timeouts += 1;
        }
        self.publish(&inner);
    }

    pub fn on_write_error(&self) {
        let mut inner = self.inner.lock();
        inner.stats.write_errors += 1;
        self.publish(&inner);
    }
}
