//! Endpoint that forwards transcript fragments onto a caller-owned channel.

use crate::endpoint::{EndpointChannels, StreamEndpoint};
use crate::error::Result;
use crate::event::StreamEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Which side of the conversation a transcript fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Human,
    Assistant,
}

/// One transcript fragment, attributed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

/// Delivery-only endpoint pushing transcript fragments to a channel the
/// host process consumes (UI rendering, live captions).
pub struct TranscriptForwarder {
    channels: EndpointChannels,
    out: mpsc::Sender<TranscriptEntry>,
}

impl TranscriptForwarder {
    pub fn new(out: mpsc::Sender<TranscriptEntry>) -> Self {
        Self {
            channels: EndpointChannels::new("transcript_forwarder"),
            out,
        }
    }

    async fn forward(&self, speaker: Speaker, text: &str) {
        let entry = TranscriptEntry {
            speaker,
            text: text.to_string(),
        };
        // A dropped consumer is not a session failure: the conversation can
        // outlive whatever was rendering it.
        if self.out.send(entry).await.is_err() {
            debug!("transcript consumer dropped, fragment discarded");
        }
    }
}

#[async_trait]
impl StreamEndpoint for TranscriptForwarder {
    fn name(&self) -> &str {
        self.channels.name()
    }

    fn channels(&self) -> &EndpointChannels {
        &self.channels
    }

    async fn deliver(&self, event: Arc<StreamEvent>) -> Result<()> {
        if let Some(text) = &event.input_transcription {
            self.forward(Speaker::Human, text).await;
        }
        if let Some(text) = &event.output_transcription {
            self.forward(Speaker::Assistant, text).await;
        }
        Ok(())
    }

    async fn produce(&self) -> Result<()> {
        // Nothing to produce; stay alive until the session stops.
        self.channels.stop().wait().await;
        Ok(())
    }
}
