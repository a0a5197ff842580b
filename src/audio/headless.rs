//! Device-less playback that follows the tokio clock.
//!
//! Used by the `--headless` mode of `lipsync-play` and by tests, where
//! `tokio::time::pause()` makes the clip play back deterministically.

use crate::audio::decode::DecodedAudio;
use crate::audio::output::{AudioOutput, PlaybackCursor, PlaybackHandle, PlaybackStatus};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Plays clips against the tokio clock without touching an audio device.
#[derive(Debug, Clone, Default)]
pub struct HeadlessOutput {
    start_latency: Duration,
}

impl HeadlessOutput {
    /// Create an output that starts instantly.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `play()` confirmation by `latency`, like a real device.
    pub fn with_start_latency(mut self, latency: Duration) -> Self {
        self.start_latency = latency;
        self
    }

    /// Open `audio`, keeping the concrete handle (for [`HeadlessPlayback::pause`]).
    pub fn open_headless(&self, audio: &DecodedAudio) -> Arc<HeadlessPlayback> {
        Arc::new(HeadlessPlayback::new(audio, self.start_latency))
    }
}

#[async_trait]
impl AudioOutput for HeadlessOutput {
    async fn open(&self, audio: DecodedAudio) -> Result<Arc<dyn PlaybackHandle>> {
        let handle: Arc<dyn PlaybackHandle> = self.open_headless(&audio);
        Ok(handle)
    }
}

/// Handle returned by [`HeadlessOutput`].
#[derive(Debug)]
pub struct HeadlessPlayback {
    cursor: PlaybackCursor,
    start_latency: Duration,
    /// Tokio instant at which playback (re)started, and the position it started from.
    anchor: Mutex<Option<(Instant, usize)>>,
}

impl HeadlessPlayback {
    fn new(audio: &DecodedAudio, start_latency: Duration) -> Self {
        Self {
            cursor: PlaybackCursor::new(audio),
            start_latency,
            anchor: Mutex::new(None),
        }
    }

    /// Freeze the clock until the next `play()`.
    pub fn pause(&self) {
        self.sync();
        if self.cursor.status() == PlaybackStatus::Playing {
            self.cursor.set_status(PlaybackStatus::Paused);
            *self.anchor.lock().unwrap_or_else(|e| e.into_inner()) = None;
        }
    }

    /// Advance the cursor to wherever the tokio clock says we are.
    fn sync(&self) {
        if self.cursor.status() != PlaybackStatus::Playing {
            return;
        }
        let anchor = *self.anchor.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((started, base)) = anchor {
            let elapsed = started.elapsed().as_secs_f64();
            let played = (elapsed * f64::from(self.cursor.sample_rate())) as usize;
            self.cursor.set_position(base + played);
        }
    }
}

#[async_trait]
impl PlaybackHandle for HeadlessPlayback {
    async fn play(&self) -> Result<()> {
        if !self.start_latency.is_zero() {
            tokio::time::sleep(self.start_latency).await;
        }
        if self.cursor.status().is_finished() {
            return Ok(());
        }
        *self.anchor.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((Instant::now(), self.cursor.position()));
        self.cursor.set_status(PlaybackStatus::Playing);
        // A zero-length clip ends the moment it starts.
        self.cursor.set_position(self.cursor.position());
        Ok(())
    }

    fn stop(&self) {
        self.sync();
        self.cursor.set_status(PlaybackStatus::Stopped);
    }

    fn current_time(&self) -> f64 {
        self.sync();
        self.cursor.current_time()
    }

    fn status(&self) -> PlaybackStatus {
        self.sync();
        self.cursor.status()
    }

    fn read_window(&self, buf: &mut [f32]) {
        self.sync();
        self.cursor.read_window(buf);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn one_second() -> DecodedAudio {
        DecodedAudio::new(vec![0.5; 1000], 1000)
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_tokio_time() {
        let handle = HeadlessOutput::new().open(one_second()).await.unwrap();
        assert_eq!(handle.status(), PlaybackStatus::Pending);
        assert_eq!(handle.current_time(), 0.0);

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!((handle.current_time() - 0.25).abs() < 0.01);
        assert_eq!(handle.status(), PlaybackStatus::Playing);

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(handle.status(), PlaybackStatus::Ended);
        assert!((handle.current_time() - 1.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_freezes_the_clock() {
        let handle = HeadlessOutput::new().open(one_second()).await.unwrap();
        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop();
        let t = handle.current_time();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.current_time(), t);
        assert_eq!(handle.status(), PlaybackStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn start_latency_delays_play() {
        let output = HeadlessOutput::new().with_start_latency(Duration::from_millis(40));
        let handle = output.open(one_second()).await.unwrap();
        let before = Instant::now();
        handle.play().await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(40));
        assert_eq!(handle.status(), PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_position_until_resumed() {
        let handle = HeadlessOutput::new().open_headless(&one_second());
        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.pause();
        assert_eq!(handle.status(), PlaybackStatus::Paused);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!((handle.current_time() - 0.2).abs() < 0.01);

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!((handle.current_time() - 0.3).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn window_tracks_played_samples() {
        let handle = HeadlessOutput::new().open(one_second()).await.unwrap();
        let mut buf = [1.0f32; 8];
        handle.read_window(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.read_window(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.5));
    }
}
