//! Cue-track playback: looks up the active phoneme cue on the playback clock.

use crate::audio::output::{PlaybackHandle, PlaybackStatus};
use crate::cue::CueTrack;
use crate::driver::MouthDriver;
use crate::state::DriverKind;
use crate::viseme::MouthShape;
use std::sync::Arc;

/// Publishes the shape of whichever cue contains the current playback time.
pub struct CueDriver {
    track: CueTrack,
    clock: Arc<dyn PlaybackHandle>,
}

impl CueDriver {
    /// Follow `track` on the clock of `clock`.
    pub fn new(track: CueTrack, clock: Arc<dyn PlaybackHandle>) -> Self {
        Self { track, clock }
    }

    /// The track being followed.
    pub fn track(&self) -> &CueTrack {
        &self.track
    }
}

impl MouthDriver for CueDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Cues
    }

    fn tick(&mut self) -> MouthShape {
        self.track.shape_at(self.clock.current_time())
    }

    fn is_done(&self) -> bool {
        !matches!(
            self.clock.status(),
            PlaybackStatus::Playing | PlaybackStatus::Pending
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::decode::DecodedAudio;
    use crate::audio::headless::HeadlessOutput;
    use crate::cue::MouthCue;
    use std::time::Duration;

    fn track() -> CueTrack {
        CueTrack::new(vec![
            MouthCue::new(0.0, 1.0, MouthShape::A),
            MouthCue::new(1.0, 2.0, MouthShape::O),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn follows_the_playback_clock() {
        let audio = DecodedAudio::new(vec![0.0; 3000], 1000);
        let handle = HeadlessOutput::new().open_headless(&audio);
        let mut driver = CueDriver::new(track(), handle.clone());

        handle.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(driver.tick(), MouthShape::A);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(driver.tick(), MouthShape::O);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(driver.tick(), MouthShape::Rest);
        assert!(!driver.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn done_once_paused_or_ended() {
        let audio = DecodedAudio::new(vec![0.0; 1000], 1000);
        let handle = HeadlessOutput::new().open_headless(&audio);
        let driver = CueDriver::new(track(), handle.clone());

        handle.play().await.unwrap();
        assert!(!driver.is_done());
        handle.pause();
        assert!(driver.is_done());

        handle.play().await.unwrap();
        assert!(!driver.is_done());
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(driver.is_done());
        assert_eq!(driver.kind(), DriverKind::Cues);
    }
}
