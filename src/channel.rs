//! Whiteboard channel — presence and element broadcast for one participant.
//!
//! ARCHITECTURE
//! ============
//! One `WhiteboardChannel` per mounted canvas. It keeps a local view of the
//! poll's element log and connected participants, and converges with its
//! siblings through the shared storage area:
//!
//! - Single-element broadcasts land in the local view at once and are
//!   written to the shared log through the `FlushGate` (throttle + debounce).
//! - Bulk replacement writes the shared log immediately.
//! - A driver task re-reads the log on an interval and on foreign change
//!   notifications, and refreshes the heartbeat on its own interval.
//!
//! LIFECYCLE
//! =========
//! `Syncing` while `join` performs the first resync and heartbeat, `Live`
//! once the driver runs, `Terminated` after `leave` (or drop) has removed
//! the heartbeat and stopped the driver.
//!
//! ERROR HANDLING
//! ==============
//! Storage failures and malformed stored JSON are logged and swallowed. The
//! channel keeps serving its last good local view; `is_connected` reports
//! whether the latest heartbeat write succeeded. The next scheduled tick is
//! the only retry: a failed element flush keeps its elements unflushed and
//! re-arms the gate for the next throttle window, and `leave` attempts one
//! last write.
//!
//! TRADE-OFFS
//! ==========
//! A flush re-reads the shared log and merges unflushed elements into it by
//! id, so two tabs appending in the same window both survive. Bulk
//! replacement stays a whole-log overwrite because it must be able to
//! express deletions; concurrent bulk writers are last-writer-wins.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::now_ms;
use crate::config::ChannelConfig;
use crate::element::{WhiteboardElement, merge_by_id};
use crate::keys;
use crate::presence::{self, DEFAULT_COLOR};
use crate::storage::{KeyValueStore, StorageEvent, StorageEvents};
use crate::throttle::FlushGate;

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;

// =============================================================================
// TYPES
// =============================================================================

/// Identity of the participant that owns a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Syncing,
    Live,
    Terminated,
}

/// Read side of the channel, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelView {
    pub elements: Vec<WhiteboardElement>,
    pub connected_participants: Vec<String>,
    pub is_connected: bool,
}

struct ChannelState {
    view: ChannelView,
    /// Local single-element broadcasts not yet written to the shared log.
    unflushed: Vec<WhiteboardElement>,
    gate: FlushGate,
    phase: Phase,
}

struct Shared {
    store: Arc<dyn KeyValueStore>,
    poll_id: String,
    participant: Participant,
    config: ChannelConfig,
    elements_key: String,
    state: Mutex<ChannelState>,
    view_tx: watch::Sender<ChannelView>,
    /// Wakes the driver when the flush deadline moves.
    wake: Notify,
}

// =============================================================================
// CHANNEL
// =============================================================================

pub struct WhiteboardChannel {
    shared: Arc<Shared>,
    driver: Option<JoinHandle<()>>,
}

impl WhiteboardChannel {
    /// Join the poll's whiteboard: first resync, first heartbeat, then start
    /// the background driver.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn join(
        store: Arc<dyn KeyValueStore>,
        poll_id: impl Into<String>,
        participant: Participant,
        config: ChannelConfig,
    ) -> Self {
        let poll_id = poll_id.into();
        let elements_key = keys::elements_key(&poll_id);
        let (view_tx, _) = watch::channel(ChannelView::default());

        let shared = Arc::new(Shared {
            store,
            poll_id,
            participant,
            config,
            elements_key,
            state: Mutex::new(ChannelState {
                view: ChannelView::default(),
                unflushed: Vec::new(),
                gate: FlushGate::new(config.throttle, config.debounce),
                phase: Phase::Syncing,
            }),
            view_tx,
            wake: Notify::new(),
        });

        // Subscribe before the first read so no change slips between them.
        let events = shared.store.subscribe();
        shared.resync();
        shared.heartbeat();
        shared.lock().phase = Phase::Live;

        info!(
            poll_id = %shared.poll_id,
            participant_id = %shared.participant.id,
            elements = shared.lock().view.elements.len(),
            "whiteboard: joined"
        );

        let driver = tokio::spawn(drive(Arc::clone(&shared), events));
        Self { shared, driver: Some(driver) }
    }

    /// Append one element, stamped with the caller's identity and the
    /// current time. The shared-log write is throttled.
    pub fn broadcast_element(&self, element: WhiteboardElement) {
        self.shared.broadcast_element(element);
    }

    /// Replace the whole element log immediately. Elements missing
    /// attribution get the caller's identity; a zero timestamp gets now.
    pub fn broadcast_elements(&self, elements: Vec<WhiteboardElement>) {
        self.shared.broadcast_elements(elements);
    }

    #[must_use]
    pub fn elements(&self) -> Vec<WhiteboardElement> {
        self.shared.lock().view.elements.clone()
    }

    #[must_use]
    pub fn connected_participants(&self) -> Vec<String> {
        self.shared.lock().view.connected_participants.clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock().view.is_connected
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.shared.participant
    }

    /// Receiver that observes every published `ChannelView`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChannelView> {
        self.shared.view_tx.subscribe()
    }

    /// Color of `participant_id` under the configured policy.
    #[must_use]
    pub fn participant_color(&self, participant_id: &str) -> &'static str {
        let state = self.shared.lock();
        presence::participant_color(
            self.shared.config.color_policy,
            &state.view.connected_participants,
            participant_id,
        )
    }

    /// Color the caller should give new drawings and text.
    #[must_use]
    pub fn element_color(&self) -> &'static str {
        if self.shared.config.broadcast_enabled {
            self.participant_color(&self.shared.participant.id)
        } else {
            DEFAULT_COLOR
        }
    }

    /// Re-read the shared log now instead of waiting for the interval.
    pub fn tick_resync(&self) {
        self.shared.resync();
    }

    /// Refresh the heartbeat and presence now instead of waiting for the
    /// interval.
    pub fn tick_heartbeat(&self) {
        self.shared.heartbeat();
    }

    /// Leave the whiteboard. Flushes pending elements, removes the heartbeat
    /// synchronously, and stops the driver. Idempotent.
    pub fn leave(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.shared.terminate();
    }
}

impl Drop for WhiteboardChannel {
    fn drop(&mut self) {
        self.leave();
    }
}

// =============================================================================
// DRIVER
// =============================================================================

async fn drive(shared: Arc<Shared>, mut events: Option<StorageEvents>) {
    let start = Instant::now();
    let mut resync = tokio::time::interval_at(start + shared.config.resync, shared.config.resync);
    resync.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut heartbeat = tokio::time::interval_at(start + shared.config.heartbeat, shared.config.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let deadline = shared.lock().gate.deadline();
        let mut feed_closed = false;

        tokio::select! {
            _ = resync.tick() => shared.resync(),
            _ = heartbeat.tick() => shared.heartbeat(),
            () = sleep_until_deadline(deadline) => shared.flush_if_due(Instant::now()),
            () = shared.wake.notified() => {}
            event = next_event(&mut events) => match event {
                Some(event) if event.key == shared.elements_key => {
                    debug!(poll_id = %shared.poll_id, "whiteboard: foreign write, resyncing");
                    shared.resync();
                }
                Some(_) => {}
                None => feed_closed = true,
            },
        }

        if feed_closed {
            warn!(poll_id = %shared.poll_id, "whiteboard: storage change feed closed; polling only");
            events = None;
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<StorageEvents>) -> Option<StorageEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ChannelState) {
        self.view_tx.send_replace(state.view.clone());
    }

    fn stamp(&self, element: &mut WhiteboardElement) {
        if !element.is_attributed() {
            element.participant_id = Some(self.participant.id.clone());
        }
        if element.participant_name.is_none() {
            element.participant_name = Some(self.participant.name.clone());
        }
    }

    fn broadcast_element(&self, mut element: WhiteboardElement) {
        element.participant_id = Some(self.participant.id.clone());
        element.participant_name = Some(self.participant.name.clone());
        element.timestamp = now_ms();

        let mut state = self.lock();
        if state.phase == Phase::Terminated {
            warn!(poll_id = %self.poll_id, id = %element.id, "whiteboard: broadcast after leave ignored");
            return;
        }
        let incoming = std::slice::from_ref(&element);
        state.view.elements = merge_by_id(&state.view.elements, incoming);
        state.unflushed = merge_by_id(&state.unflushed, incoming);
        state.gate.touch(Instant::now());
        self.publish(&state);
        drop(state);

        self.wake.notify_one();
    }

    fn broadcast_elements(&self, mut elements: Vec<WhiteboardElement>) {
        let now = now_ms();
        for element in &mut elements {
            self.stamp(element);
            if element.timestamp == 0 {
                element.timestamp = now;
            }
        }

        let mut state = self.lock();
        if state.phase == Phase::Terminated {
            warn!(poll_id = %self.poll_id, "whiteboard: bulk broadcast after leave ignored");
            return;
        }
        self.write_log(&elements);
        state.unflushed.clear();
        state.gate.cancel();
        state.view.elements = elements;
        self.publish(&state);
    }

    /// Write pending single-element broadcasts if the gate allows it.
    fn flush_if_due(&self, now: Instant) {
        let mut state = self.lock();
        if !state.gate.is_due(now) {
            return;
        }
        self.flush_locked(&mut state, now);
    }

    fn flush_locked(&self, state: &mut ChannelState, now: Instant) {
        state.gate.mark_flushed(now);
        if state.unflushed.is_empty() {
            return;
        }

        // Merge into what is stored now, not into our possibly stale view.
        let base = self.read_log().unwrap_or_else(|| state.view.elements.clone());
        let merged = merge_by_id(&base, &state.unflushed);
        if !self.write_log(&merged) {
            // Re-arm so the next throttle window retries.
            state.gate.touch(now);
            return;
        }

        debug!(
            poll_id = %self.poll_id,
            flushed = state.unflushed.len(),
            total = merged.len(),
            "whiteboard: flushed elements"
        );
        state.unflushed.clear();
        if state.view.elements != merged {
            state.view.elements = merged;
            self.publish(state);
        }
    }

    fn resync(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Terminated {
            return;
        }
        let Some(stored) = self.read_log() else {
            return;
        };
        let candidate = merge_by_id(&stored, &state.unflushed);
        if candidate != state.view.elements {
            debug!(poll_id = %self.poll_id, count = candidate.len(), "whiteboard: resynced elements");
            state.view.elements = candidate;
            self.publish(&state);
        }
    }

    fn heartbeat(&self) {
        // Held across the write so a heartbeat cannot land after `terminate`.
        let mut state = self.lock();
        if state.phase == Phase::Terminated {
            return;
        }

        let now = now_ms();
        let store = self.store.as_ref();
        let write = presence::write_heartbeat(store, &self.poll_id, &self.participant.id, now);
        if let Err(e) = &write {
            warn!(error = %e, poll_id = %self.poll_id, "whiteboard: heartbeat write failed");
        }
        let scanned = presence::scan_heartbeats(store, &self.poll_id, &self.participant.id, now, self.config.liveness);

        let connected = match scanned {
            Ok(connected) => connected,
            Err(e) => {
                warn!(error = %e, poll_id = %self.poll_id, "whiteboard: presence scan failed");
                let mut fallback = state.view.connected_participants.clone();
                if !fallback.contains(&self.participant.id) {
                    fallback.push(self.participant.id.clone());
                    fallback.sort();
                }
                fallback
            }
        };

        let is_connected = write.is_ok();
        if state.view.connected_participants != connected || state.view.is_connected != is_connected {
            state.view.connected_participants = connected;
            state.view.is_connected = is_connected;
            self.publish(&state);
        }
    }

    fn terminate(&self) {
        let mut state = self.lock();
        if state.phase == Phase::Terminated {
            return;
        }
        if !state.unflushed.is_empty() {
            self.flush_locked(&mut state, Instant::now());
        }
        if !state.unflushed.is_empty() {
            warn!(
                poll_id = %self.poll_id,
                dropped = state.unflushed.len(),
                "whiteboard: final flush failed, unflushed elements dropped"
            );
        }
        state.gate.cancel();
        state.unflushed.clear();

        if let Err(e) = presence::remove_heartbeat(self.store.as_ref(), &self.poll_id, &self.participant.id) {
            warn!(error = %e, poll_id = %self.poll_id, "whiteboard: heartbeat removal failed");
        }
        state.phase = Phase::Terminated;
        state.view.is_connected = false;
        self.publish(&state);

        info!(poll_id = %self.poll_id, participant_id = %self.participant.id, "whiteboard: left");
    }

    /// Read and parse the shared log. `None` when the key is absent,
    /// unreadable, or malformed.
    fn read_log(&self) -> Option<Vec<WhiteboardElement>> {
        let raw = match self.store.get_item(&self.elements_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, poll_id = %self.poll_id, "whiteboard: element log read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(elements) => Some(elements),
            Err(e) => {
                warn!(error = %e, poll_id = %self.poll_id, "whiteboard: malformed element log ignored");
                None
            }
        }
    }

    /// Serialize and write the shared log. Returns whether the write landed.
    fn write_log(&self, elements: &[WhiteboardElement]) -> bool {
        let raw = match serde_json::to_string(elements) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, poll_id = %self.poll_id, "whiteboard: element log serialization failed");
                return false;
            }
        };
        match self.store.set_item(&self.elements_key, &raw) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, poll_id = %self.poll_id, "whiteboard: element log write failed");
                false
            }
        }
    }
}
