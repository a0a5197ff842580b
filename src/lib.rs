//! Concierge lip-sync: speech playback with a synchronised talking avatar.
//!
//! Given an encoded speech clip (typically MP3 from a TTS service), this
//! crate plays it and publishes one mouth shape per animation frame:
//! Clip → decode → playback → driver → published state → avatar
//!
//! # Architecture
//!
//! - **Viseme mapping**: phoneme symbols and loudness levels → [`MouthShape`]
//! - **Drivers**: amplitude (live RMS of the playing signal) and cue track
//!   (precomputed phoneme timeline), ticked by a per-session frame pump
//! - **Orchestrator**: [`LipSync`] starts playback with the amplitude driver,
//!   races optional cue extraction, and swaps drivers when cues arrive in time
//! - **Audio**: decoding via `symphonia`, playback via `cpal` or headless
//! - **Avatar**: pure lookup from published state to asset paths

pub mod audio;
pub mod avatar;
pub mod config;
pub mod cue;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod orchestrator;
pub mod runtime;
pub mod state;
pub mod viseme;

pub use avatar::{AvatarAssets, AvatarFrame};
pub use config::LipSyncConfig;
pub use cue::{CueTrack, MouthCue};
pub use error::{LipSyncError, Result};
pub use extractor::{CueExtractor, RhubarbExtractor};
pub use orchestrator::LipSync;
pub use runtime::{EndReason, LipSyncEvent};
pub use state::{DriverKind, LipSyncState};
pub use viseme::{MouthShape, map_amplitude, map_phoneme_symbol};
