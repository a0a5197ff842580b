//! Frame pump: the cooperative scheduler that ticks one driver per frame.

use crate::audio::output::PlaybackHandle;
use crate::driver::MouthDriver;
use crate::state::StatePublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The session's cancellation token fired.
    Cancelled,
    /// The clip finished playing (or was stopped underneath the pump).
    PlaybackEnded,
    /// The publisher rejected a frame: the session is no longer active.
    Superseded,
}

/// Runs one session's active driver at animation-frame cadence.
pub struct FramePump {
    session: u64,
    driver: Box<dyn MouthDriver>,
    playback: Arc<dyn PlaybackHandle>,
    publisher: StatePublisher,
    frame_interval: Duration,
    swap_rx: mpsc::Receiver<Box<dyn MouthDriver>>,
    cancel: CancellationToken,
}

impl FramePump {
    /// Create a pump plus the sender used to hand it a replacement driver.
    pub fn new(
        session: u64,
        driver: Box<dyn MouthDriver>,
        playback: Arc<dyn PlaybackHandle>,
        publisher: StatePublisher,
        frame_interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Sender<Box<dyn MouthDriver>>) {
        let (swap_tx, swap_rx) = mpsc::channel(1);
        (
            Self {
                session,
                driver,
                playback,
                publisher,
                frame_interval,
                swap_rx,
                cancel,
            },
            swap_tx,
        )
    }

    /// Tick until cancelled, superseded, or the clip ends.
    ///
    /// A replacement driver takes effect from the next frame; the old one
    /// is dropped before that frame runs.
    pub async fn run(mut self) -> PumpExit {
        let mut interval = tokio::time::interval(self.frame_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames: u64 = 0;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(session = self.session, frames, "frame pump cancelled");
                    return PumpExit::Cancelled;
                }
                Some(next) = self.swap_rx.recv() => {
                    debug!(
                        session = self.session,
                        from = ?self.driver.kind(),
                        to = ?next.kind(),
                        "switching mouth driver"
                    );
                    self.driver = next;
                }
                _ = interval.tick() => {
                    if self.playback.status().is_finished() {
                        debug!(session = self.session, frames, "playback finished");
                        return PumpExit::PlaybackEnded;
                    }
                    if self.driver.is_done() {
                        continue;
                    }
                    let mouth = self.driver.tick();
                    let kind = self.driver.kind();
                    if !self.publisher.publish(self.session, mouth, true, Some(kind)) {
                        return PumpExit::Superseded;
                    }
                    frames += 1;
                    trace!(session = self.session, %mouth, ?kind, "frame");
                }
            }
        }
    }
}
