//! Default configuration constants for voxbridge.
//!
//! This module provides shared constants used across different configuration
//! types to ensure consistency and eliminate duplication.

use std::time::Duration;

/// Default capacity of each endpoint's inbound queue.
///
/// Kept deliberately small: a production flow that outpaces the router blocks
/// on enqueue instead of buffering audio that an interruption may make stale.
pub const INBOUND_QUEUE_CAPACITY: usize = 5;

/// Default capacity of each endpoint's outbound queue.
///
/// The outbound side never blocks the router; when full, the oldest queued
/// event is evicted. Set to `None` in [`crate::config::QueueConfig`] for an
/// unbounded queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default grace period between signaling stop and forcing teardown.
///
/// Long enough for in-flight deliveries to drain; short enough that a wedged
/// flow cannot hold the session open.
pub const TEARDOWN_GRACE_MS: u64 = 500;

/// Default MIME tag stamped on raw PCM audio chunks.
pub const AUDIO_MIME_PCM: &str = "audio/pcm";

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech applications and matches what
/// conversational-AI voice sessions expect on both legs.
pub const SAMPLE_RATE: u32 = 16000;

/// Default depth of the capture worker's frame channel.
pub const CAPTURE_BUFFER: usize = 64;

/// Default depth of the playback worker's frame channel.
pub const PLAYBACK_BUFFER: usize = 16;

/// Default polling interval for capture devices with no samples ready.
pub const DEVICE_POLL_INTERVAL_MS: u64 = 10;

/// The teardown grace period as a [`Duration`].
pub fn teardown_grace() -> Duration {
    Duration::from_millis(TEARDOWN_GRACE_MS)
}
