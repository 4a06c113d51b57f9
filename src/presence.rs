//! Presence — heartbeat writes, liveness scans, participant colors.
//!
//! DESIGN
//! ======
//! Presence is derived by polling, not push. Each participant periodically
//! writes its own `whiteboard_heartbeat_<poll>_<participant>` key with the
//! current epoch-ms; a scan reads every heartbeat of the poll, deletes the
//! expired ones, and reports the rest. The caller is always reported, even
//! when its own heartbeat write failed.
//!
//! Colors come from a fixed palette. The positional policy indexes the
//! palette by the participant's position in the sorted connected set, so a
//! participant's color shifts when someone sorting before them joins or
//! leaves. The stable policy hashes the id instead.

use std::time::Duration;

use tracing::{debug, warn};

use crate::keys;
use crate::storage::{KeyValueStore, StorageError};

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;

/// Color used for elements when per-participant colors are disabled.
pub const DEFAULT_COLOR: &str = "#000000";

pub const PALETTE: [&str; 8] = [
    "#ef4444", "#3b82f6", "#10b981", "#f59e0b", "#8b5cf6", "#ec4899", "#06b6d4", "#84cc16",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPolicy {
    /// Index in the connected set, modulo the palette. Shifts on churn.
    Positional,
    /// Hash of the participant id, modulo the palette.
    Stable,
}

/// Color for `participant_id` given the current connected set.
#[must_use]
pub fn participant_color(policy: ColorPolicy, connected: &[String], participant_id: &str) -> &'static str {
    let index = match policy {
        ColorPolicy::Positional => connected
            .iter()
            .position(|id| id == participant_id)
            .unwrap_or(0),
        ColorPolicy::Stable => stable_index(participant_id),
    };
    PALETTE[index % PALETTE.len()]
}

/// FNV-1a over the id bytes. Identical across processes and releases.
fn stable_index(participant_id: &str) -> usize {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    let hash = participant_id
        .bytes()
        .fold(OFFSET, |acc, b| (acc ^ u64::from(b)).wrapping_mul(PRIME));
    usize::try_from(hash % PALETTE.len() as u64).unwrap_or(0)
}

// =============================================================================
// HEARTBEATS
// =============================================================================

/// Write the caller's heartbeat.
///
/// # Errors
///
/// Returns the storage error if the write fails.
pub fn write_heartbeat(
    store: &dyn KeyValueStore,
    poll_id: &str,
    participant_id: &str,
    now_ms: i64,
) -> Result<(), StorageError> {
    store.set_item(&keys::heartbeat_key(poll_id, participant_id), &now_ms.to_string())
}

/// Remove the caller's heartbeat.
///
/// # Errors
///
/// Returns the storage error if the removal fails.
pub fn remove_heartbeat(store: &dyn KeyValueStore, poll_id: &str, participant_id: &str) -> Result<(), StorageError> {
    store.remove_item(&keys::heartbeat_key(poll_id, participant_id))
}

/// Scan the poll's heartbeats, deleting expired or unreadable ones.
///
/// Returns the live participant ids plus `self_id`, sorted and deduplicated.
///
/// # Errors
///
/// Returns an error only if the key set cannot be enumerated; failures on
/// individual keys are logged and skipped.
pub fn scan_heartbeats(
    store: &dyn KeyValueStore,
    poll_id: &str,
    self_id: &str,
    now_ms: i64,
    liveness: Duration,
) -> Result<Vec<String>, StorageError> {
    let liveness_ms = i64::try_from(liveness.as_millis()).unwrap_or(i64::MAX);
    let mut live = vec![self_id.to_owned()];

    for key in store.keys()? {
        let Some(participant_id) = keys::heartbeat_participant(poll_id, &key) else {
            continue;
        };
        let beat = match store.get_item(&key) {
            Ok(Some(raw)) => raw.trim().parse::<i64>().ok(),
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, %key, "presence: heartbeat read failed");
                continue;
            }
        };

        match beat {
            Some(ts) if now_ms.saturating_sub(ts) <= liveness_ms => live.push(participant_id.to_owned()),
            _ => {
                debug!(%poll_id, participant_id, "presence: expiring heartbeat");
                if let Err(e) = store.remove_item(&key) {
                    warn!(error = %e, %key, "presence: failed to remove expired heartbeat");
                }
            }
        }
    }

    live.sort();
    live.dedup();
    Ok(live)
}
