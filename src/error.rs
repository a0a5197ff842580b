//! Error types for the lip-sync pipeline.

/// Top-level error type for speech playback and lip-sync.
#[derive(Debug, thiserror::Error)]
pub enum LipSyncError {
    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// The encoded payload could not be decoded into PCM.
    #[error("decode error: {0}")]
    Decode(String),

    /// Playback could not be started or was rejected by the output.
    #[error("playback error: {0}")]
    Playback(String),

    /// Phoneme cue extraction failed. Never surfaced from `speak`.
    #[error("cue extraction error: {0}")]
    CueExtraction(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, LipSyncError>;
