//! Runtime events emitted by the lip-sync orchestrator for UI and diagnostics.
//!
//! Per-frame mouth shapes go through the watch channel in
//! [`crate::state`]; these events cover the session lifecycle only.

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The clip played to the end.
    Finished,
    /// `stop()` was called.
    Stopped,
    /// A newer `speak()` replaced it.
    Superseded,
    /// Decoding or starting playback failed.
    Failed,
}

/// Lifecycle events for one speak session.
#[derive(Debug, Clone, PartialEq)]
pub enum LipSyncEvent {
    /// A `speak()` call created a new session.
    SessionStarted {
        session: u64,
        /// Size of the encoded payload.
        bytes: usize,
    },
    /// The output confirmed playback started.
    PlaybackStarted { session: u64, duration_secs: f64 },
    /// The session switched from amplitude to cue-driven animation.
    DriverSwitched { session: u64, cue_count: usize },
    /// No usable cues; the amplitude driver stays in charge.
    CuesUnavailable { session: u64, reason: String },
    /// Decode or playback start failed; surfaced to the `speak()` caller.
    PlaybackFailed { session: u64, error: String },
    /// The session was torn down.
    SessionEnded { session: u64, reason: EndReason },
}
