//! voxbridge - Real-time conversation stream mediator
//!
//! Routes typed events (audio chunks, transcript fragments, control signals)
//! between a fixed set of pluggable stream endpoints: a voice-AI session, a
//! telephony call leg, a local speaker/microphone pair, a persistence sink.
//! Each endpoint produces and consumes its own event stream; the mediator
//! merges every inbound stream first-ready-wins, fans each event out to every
//! *other* endpoint, enforces backpressure, and guarantees every endpoint is
//! closed exactly once however the session ends.

// Enforce error handling discipline in non-test code
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod config;
pub mod defaults;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod forward;
pub mod mediator;
pub mod queue;
pub mod signal;

// Core contract (endpoints → mediator)
pub use endpoint::{Enqueue, EndpointChannels, ScriptedEndpoint, StreamEndpoint};
pub use mediator::StreamMediator;

// Event model
pub use event::{AudioChunk, StreamEvent, TranscriptCorrection};

// Concurrency primitives
pub use queue::EventQueue;
pub use signal::StopSignal;

// Bundled endpoints
pub use device::{CaptureDevice, DeviceEndpoint, PlaybackDevice};
pub use forward::{ConversationStore, StoreForwarder, TranscriptForwarder};

// Error handling
pub use error::{FlowKind, Result, VoxbridgeError};

// Config
pub use config::{Config, DeviceConfig, QueueConfig, SessionConfig};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
