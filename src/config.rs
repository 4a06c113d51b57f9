//! Channel timing and presentation knobs, parsed from environment variables.

use std::time::Duration;

use crate::presence::ColorPolicy;

pub const DEFAULT_THROTTLE_MS: u64 = 100;
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_RESYNC_MS: u64 = 500;
pub const DEFAULT_HEARTBEAT_MS: u64 = 3_000;
pub const DEFAULT_LIVENESS_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Minimum spacing between single-element shared-log writes.
    pub throttle: Duration,
    /// Quiet period after the last single-element broadcast before writing.
    pub debounce: Duration,
    /// How often the shared log is re-read.
    pub resync: Duration,
    /// How often the caller refreshes its own heartbeat.
    pub heartbeat: Duration,
    /// Heartbeats older than this are expired.
    pub liveness: Duration,
    pub color_policy: ColorPolicy,
    /// When false, elements keep the fixed default color instead of the
    /// participant's assigned color.
    pub broadcast_enabled: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(DEFAULT_THROTTLE_MS),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            resync: Duration::from_millis(DEFAULT_RESYNC_MS),
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            liveness: Duration::from_millis(DEFAULT_LIVENESS_MS),
            color_policy: ColorPolicy::Positional,
            broadcast_enabled: true,
        }
    }
}

impl ChannelConfig {
    /// Build config from environment variables, falling back to defaults
    /// for anything missing or unparsable.
    ///
    /// - `WHITEBOARD_THROTTLE_MS`, `WHITEBOARD_DEBOUNCE_MS`,
    ///   `WHITEBOARD_RESYNC_MS`, `WHITEBOARD_HEARTBEAT_MS`,
    ///   `WHITEBOARD_LIVENESS_MS`
    /// - `WHITEBOARD_COLOR_POLICY`: `positional` (default) or `stable`
    /// - `WHITEBOARD_BROADCAST`: `true` (default) or `false`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            throttle: Duration::from_millis(env_parse("WHITEBOARD_THROTTLE_MS", DEFAULT_THROTTLE_MS)),
            debounce: Duration::from_millis(env_parse("WHITEBOARD_DEBOUNCE_MS", DEFAULT_DEBOUNCE_MS)),
            resync: Duration::from_millis(env_parse("WHITEBOARD_RESYNC_MS", DEFAULT_RESYNC_MS).max(1)),
            heartbeat: Duration::from_millis(env_parse("WHITEBOARD_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS).max(1)),
            liveness: Duration::from_millis(env_parse("WHITEBOARD_LIVENESS_MS", DEFAULT_LIVENESS_MS)),
            color_policy: parse_color_policy(std::env::var("WHITEBOARD_COLOR_POLICY").ok().as_deref()),
            broadcast_enabled: env_parse("WHITEBOARD_BROADCAST", true),
        }
    }
}

pub(crate) fn parse_color_policy(raw: Option<&str>) -> ColorPolicy {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("stable") => ColorPolicy::Stable,
        _ => ColorPolicy::Positional,
    }
}

/// Parse an env var, falling back to `default` when unset or unparsable.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
