//! Storage key namespace for one poll's whiteboard.
//!
//! | Key | Value |
//! |---|---|
//! | `whiteboard_elements_<poll>` | JSON array of elements |
//! | `whiteboard_participants_<poll>` | reserved, never written |
//! | `whiteboard_heartbeat_<poll>_<participant>` | epoch-ms string |
//!
//! The poll id is supplied by the session layer and used verbatim.

const ELEMENTS_PREFIX: &str = "whiteboard_elements_";
const PARTICIPANTS_PREFIX: &str = "whiteboard_participants_";
const HEARTBEAT_PREFIX: &str = "whiteboard_heartbeat_";

#[must_use]
pub fn elements_key(poll_id: &str) -> String {
    format!("{ELEMENTS_PREFIX}{poll_id}")
}

#[must_use]
pub fn participants_key(poll_id: &str) -> String {
    format!("{PARTICIPANTS_PREFIX}{poll_id}")
}

#[must_use]
pub fn heartbeat_key(poll_id: &str, participant_id: &str) -> String {
    format!("{}{participant_id}", heartbeat_prefix(poll_id))
}

/// Prefix shared by every heartbeat key of one poll.
#[must_use]
pub fn heartbeat_prefix(poll_id: &str) -> String {
    format!("{HEARTBEAT_PREFIX}{poll_id}_")
}

/// Extract the participant id from a heartbeat key of `poll_id`.
#[must_use]
pub fn heartbeat_participant<'a>(poll_id: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(HEARTBEAT_PREFIX)?;
    let rest = rest.strip_prefix(poll_id)?;
    let participant = rest.strip_prefix('_')?;
    (!participant.is_empty()).then_some(participant)
}
