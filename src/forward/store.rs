//! Endpoint that persists conversation progress through a store handle.
//!
//! The store is an explicitly constructed handle passed in by the host
//! process; neither the forwarder nor the mediator reaches into ambient
//! global state.

use crate::endpoint::{EndpointChannels, StreamEndpoint};
use crate::error::Result;
use crate::event::StreamEvent;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Lifecycle status recorded for a mediated conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Finished,
}

/// One persisted progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    InputTranscript { value: String },
    OutputTranscript { value: String },
    OutputTranscriptCorrection { original: String, corrected: String },
}

/// Backend the forwarder writes through. Implemented by the host process
/// over its database of choice.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends one progress record to the session's update log.
    async fn append_update(&self, session_id: &str, update: ProgressUpdate) -> Result<()>;

    /// Records the session's lifecycle status.
    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()>;
}

/// Delivery-only endpoint persisting transcripts and corrections.
///
/// Marks the session in progress at `initialize` and finished at `close`,
/// so the stored status tracks the mediator lifecycle exactly.
pub struct StoreForwarder {
    channels: EndpointChannels,
    session_id: String,
    store: Arc<dyn ConversationStore>,
}

impl StoreForwarder {
    pub fn new(session_id: impl Into<String>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            channels: EndpointChannels::new("store_forwarder"),
            session_id: session_id.into(),
            store,
        }
    }
}

#[async_trait]
impl StreamEndpoint for StoreForwarder {
    fn name(&self) -> &str {
        self.channels.name()
    }

    fn channels(&self) -> &EndpointChannels {
        &self.channels
    }

    async fn initialize(&self) -> Result<()> {
        self.store
            .set_status(&self.session_id, SessionStatus::InProgress)
            .await
    }

    async fn deliver(&self, event: Arc<StreamEvent>) -> Result<()> {
        if let Some(text) = &event.input_transcription {
            self.store
                .append_update(
                    &self.session_id,
                    ProgressUpdate::InputTranscript { value: text.clone() },
                )
                .await?;
        }
        if let Some(text) = &event.output_transcription {
            self.store
                .append_update(
                    &self.session_id,
                    ProgressUpdate::OutputTranscript { value: text.clone() },
                )
                .await?;
        }
        if let Some(correction) = &event.transcript_correction {
            self.store
                .append_update(
                    &self.session_id,
                    ProgressUpdate::OutputTranscriptCorrection {
                        original: correction.original.clone(),
                        corrected: correction.corrected.clone(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    async fn produce(&self) -> Result<()> {
        // Nothing to produce; stay alive until the session stops.
        self.channels.stop().wait().await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.store
            .set_status(&self.session_id, SessionStatus::Finished)
            .await
    }
}

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryStore {
    updates: std::sync::Mutex<Vec<(String, ProgressUpdate)>>,
    statuses: std::sync::Mutex<Vec<(String, SessionStatus)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates recorded so far, in append order.
    pub fn updates(&self) -> Vec<(String, ProgressUpdate)> {
        self.updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Status transitions recorded so far, in order.
    pub fn statuses(&self) -> Vec<(String, SessionStatus)> {
        self.statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn append_update(&self, session_id: &str, update: ProgressUpdate) -> Result<()> {
        self.updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((session_id.to_string(), update));
        Ok(())
    }

    async fn set_status(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        self.statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((session_id.to_string(), status));
        Ok(())
    }
}
