pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, AudioConfig, GeneralConfig, HistoryConfig, LiveConfig};
pub use error::{AudioError, ConfigError, DecodeError, HistoryError, SessionError};
pub use types::{EncodedAudioChunk, InboundEvent, SessionState, TurnRecord};
