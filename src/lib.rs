//! GroupPulse whiteboard channel.
//!
//! ARCHITECTURE
//! ============
//! Live whiteboard collaboration for one poll session, built on a
//! local-storage-shaped key/value transport:
//!
//! - `storage`: the `KeyValueStore` seam and the in-process `LocalStore`
//! - `keys`: key namespace shared with browser canvases
//! - `element`: whiteboard elements and id-keyed merge
//! - `throttle`: throttle + debounce gate for shared-log writes
//! - `presence`: heartbeats, liveness, participant colors
//! - `channel`: the per-participant channel and its driver task
//! - `routes`, `frame`, `state`: websocket gateway exposing channels to
//!   remote canvases

pub mod channel;
pub mod clock;
pub mod config;
pub mod element;
pub mod frame;
pub mod keys;
pub mod presence;
pub mod routes;
pub mod state;
pub mod storage;
pub mod throttle;

pub use channel::{ChannelView, Participant, Phase, WhiteboardChannel};
pub use config::ChannelConfig;
pub use element::{ElementKind, Point, WhiteboardElement};
pub use storage::{KeyValueStore, LocalStore, StorageError};
