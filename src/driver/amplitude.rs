//! Loudness-driven mouth animation: the default driver and the fallback
//! whenever no phoneme cues are available.

use crate::audio::output::PlaybackHandle;
use crate::config::AmplitudeConfig;
use crate::driver::MouthDriver;
use crate::state::DriverKind;
use crate::viseme::{MouthShape, map_amplitude};
use std::sync::Arc;

/// Root-mean-square of zero-centred samples.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Amplified RMS clamped to `[0, 1]`.
pub fn loudness(samples: &[f32], gain: f32) -> f32 {
    (compute_rms(samples) * gain).clamp(0.0, 1.0)
}

/// Reads the most recent window of played samples every frame and maps
/// its loudness onto a mouth shape.
pub struct AmplitudeDriver {
    tap: Arc<dyn PlaybackHandle>,
    window: Vec<f32>,
    gain: f32,
}

impl AmplitudeDriver {
    /// Attach to the signal tap of a playing clip.
    pub fn new(tap: Arc<dyn PlaybackHandle>, config: &AmplitudeConfig) -> Self {
        Self {
            tap,
            window: vec![0.0; config.window_size.max(1)],
            gain: config.gain,
        }
    }

    /// Loudness of the current window, without mapping it to a shape.
    pub fn level(&mut self) -> f32 {
        self.tap.read_window(&mut self.window);
        loudness(&self.window, self.gain)
    }
}

impl MouthDriver for AmplitudeDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Amplitude
    }

    fn tick(&mut self) -> MouthShape {
        map_amplitude(self.level())
    }

    // Runs until cancelled; the session ends it when playback finishes.
    fn is_done(&self) -> bool {
        false
    }
}
