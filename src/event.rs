//! The event type exchanged between stream endpoints.
//!
//! A [`StreamEvent`] is an immutable value object: a production flow creates
//! it, queues hold it behind an `Arc`, and consumers read it. Nothing mutates
//! an event after construction.

use crate::defaults;
use serde::{Deserialize, Serialize};

/// A raw audio payload plus its encoding tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioChunk {
    /// Encoded audio bytes.
    pub data: Vec<u8>,
    /// MIME/encoding tag, e.g. `"audio/pcm"`.
    pub mime_type: String,
}

impl AudioChunk {
    /// Creates a chunk with an explicit MIME tag.
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// Creates a raw PCM chunk with the default MIME tag.
    pub fn pcm(data: Vec<u8>) -> Self {
        Self::new(data, defaults::AUDIO_MIME_PCM)
    }
}

/// A retroactive correction to a previously emitted output transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptCorrection {
    pub original: String,
    pub corrected: String,
}

/// The message unit routed between endpoints.
///
/// `originator` always names the endpoint whose production flow created the
/// event; the mediator relies on it for self-echo suppression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Identifier of the endpoint that produced this event.
    pub originator: String,
    /// Raw audio payload, absent for text-only events.
    pub audio: Option<AudioChunk>,
    /// Transcript fragment attributed to the human side.
    pub input_transcription: Option<String>,
    /// Transcript fragment attributed to the AI side.
    pub output_transcription: Option<String>,
    /// Retroactive correction to an earlier output transcript.
    pub transcript_correction: Option<TranscriptCorrection>,
    /// Model-internal reasoning text. Produced by some voice sessions but not
    /// consumed by any forwarder yet.
    pub thought: Option<String>,
    /// When true, the whole conversation must terminate.
    pub end_session: bool,
}

impl StreamEvent {
    fn empty(originator: impl Into<String>) -> Self {
        Self {
            originator: originator.into(),
            audio: None,
            input_transcription: None,
            output_transcription: None,
            transcript_correction: None,
            thought: None,
            end_session: false,
        }
    }

    /// An audio event.
    pub fn audio(originator: impl Into<String>, chunk: AudioChunk) -> Self {
        Self {
            audio: Some(chunk),
            ..Self::empty(originator)
        }
    }

    /// A transcript fragment for what the human side said.
    pub fn input_transcript(originator: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            input_transcription: Some(text.into()),
            ..Self::empty(originator)
        }
    }

    /// A transcript fragment for what the AI side said.
    pub fn output_transcript(originator: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            output_transcription: Some(text.into()),
            ..Self::empty(originator)
        }
    }

    /// A correction replacing an earlier output transcript fragment.
    pub fn correction(
        originator: impl Into<String>,
        original: impl Into<String>,
        corrected: impl Into<String>,
    ) -> Self {
        Self {
            transcript_correction: Some(TranscriptCorrection {
                original: original.into(),
                corrected: corrected.into(),
            }),
            ..Self::empty(originator)
        }
    }

    /// A model-reasoning event.
    pub fn thought(originator: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            thought: Some(text.into()),
            ..Self::empty(originator)
        }
    }

    /// The control event that ends the whole conversation.
    pub fn end_session(originator: impl Into<String>) -> Self {
        Self {
            end_session: true,
            ..Self::empty(originator)
        }
    }
}
