//! Message shapes for the bidirectional streaming protocol. Inbound
//! structures are parsed defensively: any field may be absent on any
//! message, so everything is optional and checked independently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use voxloop_core::{EncodedAudioChunk, InboundEvent};

// ── Outbound ──────────────────────────────────────────────────

/// First message on the wire: declares the model and asks for audio
/// responses plus incremental transcripts of both sides of the
/// conversation.
#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub input_audio_transcription: TranscriptionConfig,
    pub output_audio_transcription: TranscriptionConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
}

/// Presence of the (empty) object is what enables transcription.
#[derive(Debug, Default, Serialize)]
pub struct TranscriptionConfig {}

impl SetupMessage {
    pub fn new(model: &str) -> Self {
        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                },
                input_audio_transcription: TranscriptionConfig {},
                output_audio_transcription: TranscriptionConfig {},
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

impl RealtimeInputMessage {
    pub fn from_chunk(chunk: &EncodedAudioChunk) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: format!("audio/pcm;rate={}", chunk.sample_rate),
                    data: BASE64.encode(&chunk.data),
                }],
            },
        }
    }
}

// ── Inbound ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetupComplete {}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub turn_complete: Option<bool>,
    pub interrupted: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Transcription {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub mime_type: Option<String>,
    pub data: Option<String>,
}

impl ServerMessage {
    /// Flatten one wire message into session events. Fields are never
    /// mutually exclusive, so each is checked on every message; a
    /// transcript delta riding alongside a turn-complete flag must come
    /// out ahead of it.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(InboundEvent::Opened);
        }

        if let Some(content) = self.server_content {
            if let Some(transcription) = content.input_transcription {
                if let Some(text) = transcription.text {
                    if !text.is_empty() {
                        events.push(InboundEvent::PartialInputTranscript(text));
                    }
                }
            }
            if let Some(transcription) = content.output_transcription {
                if let Some(text) = transcription.text {
                    if !text.is_empty() {
                        events.push(InboundEvent::PartialOutputTranscript(text));
                    }
                }
            }
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(inline) = part.inline_data {
                        if let Some(data) = inline.data {
                            match BASE64.decode(&data) {
                                Ok(bytes) => events.push(InboundEvent::AudioChunk(bytes)),
                                Err(e) => {
                                    tracing::warn!("undecodable audio part: {}", e);
                                }
                            }
                        }
                    }
                }
            }
            if content.interrupted.unwrap_or(false) {
                events.push(InboundEvent::Interrupted);
            }
            if content.turn_complete.unwrap_or(false) {
                events.push(InboundEvent::TurnComplete);
            }
        }

        events
    }
}
