//! Audio decode and playback.

pub mod decode;
pub mod headless;
pub mod output;
pub mod playback;

pub use decode::{DecodedAudio, decode_bytes};
pub use headless::HeadlessOutput;
pub use output::{AudioOutput, PlaybackHandle, PlaybackStatus};
pub use playback::CpalOutput;
