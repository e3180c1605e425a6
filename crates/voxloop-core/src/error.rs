use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("environment variable not found: {0}")]
    EnvVarNotFound(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("failed to enumerate devices: {0}")]
    DeviceEnumeration(String),

    #[error("failed to build stream: {0}")]
    StreamBuild(String),

    #[error("stream error: {0}")]
    StreamError(String),
}

/// Malformed inbound audio. Recoverable: the chunk is skipped and the
/// session keeps running.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("empty audio payload")]
    Empty,

    #[error("audio payload length {0} is not a multiple of the sample width")]
    Unaligned(usize),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("audio device error: {0}")]
    Device(#[from] AudioError),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to append turn: {0}")]
    AppendFailed(String),
}
