use serde::{Deserialize, Serialize};

/// One encoded block of outbound microphone audio (PCM16LE bytes).
/// Fire-and-forget: dropped after transmission, never acknowledged.
#[derive(Debug, Clone)]
pub struct EncodedAudioChunk {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Everything the remote service can push at us, demultiplexed from the
/// wire by the transport. A single network message may produce several of
/// these.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// The session is established; audio may flow.
    Opened,
    PartialInputTranscript(String),
    PartialOutputTranscript(String),
    /// Raw PCM16LE bytes of synthesized response audio.
    AudioChunk(Vec<u8>),
    TurnComplete,
    /// The user spoke over the response; everything queued must stop.
    Interrupted,
    Error(String),
    Closed,
}

/// One completed exchange: what the user said and what the model answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub user: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Error,
    Stopped,
}
