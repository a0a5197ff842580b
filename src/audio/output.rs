//! The playback seam between the lip-sync orchestrator and an audio device.
//!
//! An [`AudioOutput`] turns a decoded clip into a [`PlaybackHandle`]. The
//! handle is both the playback clock the cue player reads and the live
//! signal tap the amplitude analyzer reads.

use crate::audio::decode::DecodedAudio;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Lifecycle of one playing clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackStatus {
    /// Opened, not yet started.
    Pending = 0,
    /// Samples are being consumed by the device.
    Playing = 1,
    /// Temporarily halted; the clock does not advance.
    Paused = 2,
    /// Every sample was played.
    Ended = 3,
    /// Halted by [`PlaybackHandle::stop`].
    Stopped = 4,
}

impl PlaybackStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PlaybackStatus::Pending,
            1 => PlaybackStatus::Playing,
            2 => PlaybackStatus::Paused,
            3 => PlaybackStatus::Ended,
            _ => PlaybackStatus::Stopped,
        }
    }

    /// Whether the clock has stopped for good.
    pub fn is_finished(self) -> bool {
        matches!(self, PlaybackStatus::Ended | PlaybackStatus::Stopped)
    }
}

/// A clip that has been handed to an output device.
#[async_trait]
pub trait PlaybackHandle: Send + Sync {
    /// Start playback and wait until the device confirms it is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the device refuses to start.
    async fn play(&self) -> Result<()>;

    /// Halt playback. Idempotent.
    fn stop(&self);

    /// Current position on the playback clock, in seconds.
    fn current_time(&self) -> f64;

    /// Current status.
    fn status(&self) -> PlaybackStatus;

    /// Fill `buf` with the most recently played samples, oldest first,
    /// zero-padding before the start of the clip.
    fn read_window(&self, buf: &mut [f32]);
}

/// Something that can play decoded clips.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Prepare `audio` for playback. Does not start it.
    ///
    /// # Errors
    ///
    /// Returns an error if the clip cannot be handed to the device.
    async fn open(&self, audio: DecodedAudio) -> Result<Arc<dyn PlaybackHandle>>;
}

/// Shared position/status of a clip, written by the device side and read
/// by the clock and signal tap.
#[derive(Debug)]
pub struct PlaybackCursor {
    samples: Arc<[f32]>,
    sample_rate: u32,
    position: AtomicUsize,
    status: AtomicU8,
}

impl PlaybackCursor {
    /// Create a cursor at the start of `audio`.
    pub fn new(audio: &DecodedAudio) -> Self {
        Self {
            samples: Arc::clone(&audio.samples),
            sample_rate: audio.sample_rate,
            position: AtomicUsize::new(0),
            status: AtomicU8::new(PlaybackStatus::Pending as u8),
        }
    }

    /// The clip being played.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples consumed so far.
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Acquire)
    }

    /// Move the read position, clamped to the clip length. Reaching the end
    /// marks the cursor [`PlaybackStatus::Ended`] unless it was stopped.
    pub fn set_position(&self, position: usize) {
        let clamped = position.min(self.samples.len());
        self.position.store(clamped, Ordering::Release);
        if clamped >= self.samples.len() {
            let _ = self.status.compare_exchange(
                PlaybackStatus::Playing as u8,
                PlaybackStatus::Ended as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Copy the next samples into `out`, advancing the position and
    /// zero-filling past the end.
    pub fn fill(&self, out: &mut [f32]) {
        let start = self.position();
        let available = self.samples.len().saturating_sub(start);
        let n = available.min(out.len());
        out[..n].copy_from_slice(&self.samples[start..start + n]);
        out[n..].fill(0.0);
        self.set_position(start + n);
    }

    /// Current status.
    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Set the status. A stopped cursor stays stopped.
    pub fn set_status(&self, status: PlaybackStatus) {
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != PlaybackStatus::Stopped as u8).then_some(status as u8)
            });
    }

    /// Position in seconds.
    pub fn current_time(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.position() as f64 / f64::from(self.sample_rate)
    }

    /// Clip length in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Fill `buf` with the samples just before the read position.
    pub fn read_window(&self, buf: &mut [f32]) {
        let end = self.position();
        let start = end.saturating_sub(buf.len());
        let copied = end - start;
        let pad = buf.len() - copied;
        buf[..pad].fill(0.0);
        buf[pad..].copy_from_slice(&self.samples[start..end]);
    }
}
