//! Forwarder endpoints: delivery-only participants.
//!
//! A forwarder consumes routed events into a local collaborator (a channel
//! for live transcript rendering, a store for persistence) and produces
//! nothing of its own; its production flow simply waits for the session to
//! stop.

pub mod store;
pub mod transcript;

pub use store::{ConversationStore, MemoryStore, ProgressUpdate, SessionStatus, StoreForwarder};
pub use transcript::{Speaker, TranscriptEntry, TranscriptForwarder};
