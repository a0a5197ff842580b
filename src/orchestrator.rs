//! Lip-sync orchestrator: owns the playback session and decides which
//! driver animates the mouth.
//!
//! Every `speak()` starts a fresh session. Playback and the amplitude
//! driver start straight away; cue extraction runs in the background and,
//! if it produces a non-empty track while the same session is still
//! playing, the frame pump is handed a [`CueDriver`] in place of the
//! amplitude driver. Anything else (no extractor, an error, no cues, a
//! late answer) leaves the amplitude driver running.

use crate::audio::decode::{DecodedAudio, decode_bytes};
use crate::audio::output::{AudioOutput, PlaybackHandle};
use crate::config::LipSyncConfig;
use crate::cue::CueTrack;
use crate::driver::{AmplitudeDriver, CueDriver, FramePump, MouthDriver, PumpExit};
use crate::error::{LipSyncError, Result};
use crate::extractor::CueExtractor;
use crate::runtime::{EndReason, LipSyncEvent};
use crate::state::{DriverKind, LipSyncState, StatePublisher};
use crate::viseme::MouthShape;
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the runtime event channel.
const EVENT_CAPACITY: usize = 64;

/// Speech playback with synchronised mouth shapes.
pub struct LipSync {
    shared: Arc<Shared>,
    output: Arc<dyn AudioOutput>,
    extractor: Option<Arc<dyn CueExtractor>>,
    config: LipSyncConfig,
}

/// State shared with the per-session pump tasks.
struct Shared {
    publisher: StatePublisher,
    session: Mutex<Option<Session>>,
    events: broadcast::Sender<LipSyncEvent>,
}

/// Resources held by the live session.
struct Session {
    id: u64,
    cancel: CancellationToken,
    playback: Option<Arc<dyn PlaybackHandle>>,
    extraction: Option<tokio::task::AbortHandle>,
    /// Taken on first use, so a session switches drivers at most once.
    swap_tx: Option<mpsc::Sender<Box<dyn MouthDriver>>>,
}

impl Session {
    fn release(self) {
        self.cancel.cancel();
        if let Some(task) = self.extraction {
            task.abort();
        }
        if let Some(playback) = self.playback {
            playback.stop();
        }
    }
}

/// Result of a background cue extraction.
enum CueOutcome {
    Ready(CueTrack),
    Unavailable(String),
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LipSyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Tear down any live session and install a fresh one.
    fn begin(&self) -> (u64, CancellationToken) {
        let cancel = CancellationToken::new();
        let (id, previous) = {
            let mut slot = self.slot();
            let previous = slot.take();
            if let Some(ref p) = previous {
                self.publisher.invalidate(p.id);
            }
            self.publisher.reset();
            let id = self.publisher.begin();
            *slot = Some(Session {
                id,
                cancel: cancel.clone(),
                playback: None,
                extraction: None,
                swap_tx: None,
            });
            (id, previous)
        };

        if let Some(previous) = previous {
            let previous_id = previous.id;
            previous.release();
            info!(session = previous_id, "speaking superseded");
            self.emit(LipSyncEvent::SessionEnded {
                session: previous_id,
                reason: EndReason::Superseded,
            });
        }
        (id, cancel)
    }

    /// Apply `f` to session `id` if it is still live.
    fn with_session(&self, id: u64, f: impl FnOnce(&mut Session)) -> bool {
        match self.slot().as_mut() {
            Some(session) if session.id == id => {
                f(session);
                true
            }
            _ => false,
        }
    }

    /// End session `id` (or whichever is live, for `None`), publish idle
    /// and release its resources. Returns `false` if there was nothing to end.
    fn end(&self, id: Option<u64>, reason: EndReason) -> bool {
        let session = {
            let mut slot = self.slot();
            let matches = slot
                .as_ref()
                .is_some_and(|s| id.is_none_or(|id| s.id == id));
            if !matches {
                return false;
            }
            let Some(session) = slot.take() else {
                return false;
            };
            self.publisher.invalidate(session.id);
            self.publisher.reset();
            session
        };

        let ended = session.id;
        session.release();
        info!(session = ended, ?reason, "speaking ended");
        self.emit(LipSyncEvent::SessionEnded {
            session: ended,
            reason,
        });
        true
    }
}

impl LipSync {
    /// Create an orchestrator playing through `output`, without cue extraction.
    ///
    /// # Errors
    ///
    /// Returns [`LipSyncError::Config`] if `config` fails validation.
    pub fn new(output: Arc<dyn AudioOutput>, config: LipSyncConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                publisher: StatePublisher::new(),
                session: Mutex::new(None),
                events,
            }),
            output,
            extractor: None,
            config,
        })
    }

    /// Use `extractor` for best-effort phoneme cues.
    pub fn with_extractor(mut self, extractor: Arc<dyn CueExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Subscribe to the per-frame published state.
    pub fn subscribe(&self) -> watch::Receiver<LipSyncState> {
        self.shared.publisher.subscribe()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LipSyncEvent> {
        self.shared.events.subscribe()
    }

    /// Latest published state.
    pub fn state(&self) -> LipSyncState {
        self.shared.publisher.current()
    }

    /// Whether a clip is playing.
    pub fn is_speaking(&self) -> bool {
        self.state().speaking
    }

    /// Play an encoded clip with lip-sync.
    ///
    /// Returns once playback has started and the cue extraction outcome
    /// has been applied, or once the session ends, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns an error if the clip cannot be decoded or playback cannot
    /// start. Cue extraction problems are never returned.
    pub async fn speak(&self, audio: Bytes) -> Result<()> {
        let (id, cancel) = self.shared.begin();
        info!(session = id, bytes = audio.len(), "speak requested");
        self.shared.emit(LipSyncEvent::SessionStarted {
            session: id,
            bytes: audio.len(),
        });

        let extraction = self.spawn_extraction(id, audio.clone());
        if let Some(ref task) = extraction {
            let abort = task.abort_handle();
            if !self.shared.with_session(id, |s| s.extraction = Some(abort)) {
                task.abort();
                return Ok(());
            }
        }

        let (playback, duration_secs) = match self.open_playback(audio).await {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(id, e)),
        };
        if !self
            .shared
            .with_session(id, |s| s.playback = Some(Arc::clone(&playback)))
        {
            playback.stop();
            return Ok(());
        }

        // Amplitude driver goes live before playback is even confirmed.
        let (pump, swap_tx) = FramePump::new(
            id,
            Box::new(AmplitudeDriver::new(
                Arc::clone(&playback),
                &self.config.amplitude,
            )),
            Arc::clone(&playback),
            self.shared.publisher.clone(),
            self.config.frames.frame_interval(),
            cancel.clone(),
        );
        if !self.shared.with_session(id, |s| s.swap_tx = Some(swap_tx)) {
            return Ok(());
        }
        self.shared
            .publisher
            .publish(id, MouthShape::Rest, true, Some(DriverKind::Amplitude));
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if pump.run().await == PumpExit::PlaybackEnded {
                shared.end(Some(id), EndReason::Finished);
            }
        });
        info!(session = id, "speaking started");

        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            started = playback.play() => started,
        };
        if let Err(e) = started {
            return Err(self.fail(id, e));
        }
        self.shared.emit(LipSyncEvent::PlaybackStarted {
            session: id,
            duration_secs,
        });

        let Some(extraction) = extraction else {
            self.cues_unavailable(id, "no cue extractor configured");
            return Ok(());
        };

        // Teardown cancels before aborting extraction; a dead session must
        // not report the aborted task as missing cues.
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(session = id, "session ended before cues arrived");
                return Ok(());
            }
            joined = extraction => joined.unwrap_or_else(|e| {
                CueOutcome::Unavailable(format!("extraction task failed: {e}"))
            }),
        };

        match outcome {
            CueOutcome::Ready(track) => self.switch_to_cues(id, track, &playback),
            CueOutcome::Unavailable(reason) => self.cues_unavailable(id, &reason),
        }
        Ok(())
    }

    /// Halt playback and return to idle. No-op when nothing is playing.
    pub fn stop(&self) {
        self.shared.end(None, EndReason::Stopped);
    }

    /// Decode off the async runtime and hand the clip to the output.
    async fn open_playback(&self, audio: Bytes) -> Result<(Arc<dyn PlaybackHandle>, f64)> {
        let decoded: DecodedAudio = tokio::task::spawn_blocking(move || decode_bytes(audio))
            .await
            .map_err(|e| LipSyncError::Decode(format!("decode task failed: {e}")))??;
        let duration_secs = decoded.duration_secs();
        debug!(
            sample_rate = decoded.sample_rate,
            duration_secs, "decoded speech clip"
        );
        let playback = self.output.open(decoded).await?;
        Ok((playback, duration_secs))
    }

    fn spawn_extraction(&self, id: u64, audio: Bytes) -> Option<JoinHandle<CueOutcome>> {
        if !self.config.cues.enabled {
            return None;
        }
        let extractor = Arc::clone(self.extractor.as_ref()?);
        let limit = self.config.cues.timeout_ms.map(Duration::from_millis);

        Some(tokio::spawn(async move {
            let result = match limit {
                Some(limit) => tokio::time::timeout(limit, extractor.extract(audio))
                    .await
                    .unwrap_or_else(|_| {
                        Err(LipSyncError::CueExtraction(format!(
                            "timed out after {}ms",
                            limit.as_millis()
                        )))
                    }),
                None => extractor.extract(audio).await,
            };
            match result {
                Ok(Some(track)) if !track.is_empty() => {
                    debug!(session = id, cues = track.len(), "cue extraction finished");
                    CueOutcome::Ready(track)
                }
                Ok(_) => CueOutcome::Unavailable("analyzer returned no cues".into()),
                Err(e) => CueOutcome::Unavailable(e.to_string()),
            }
        }))
    }

    /// Hand the pump a cue driver if session `id` is still playing.
    fn switch_to_cues(&self, id: u64, track: CueTrack, playback: &Arc<dyn PlaybackHandle>) {
        if !track.is_well_formed() {
            warn!(
                session = id,
                "cue track has overlapping or unordered cues; earliest match wins"
            );
        }
        let cue_count = track.len();
        let driver: Box<dyn MouthDriver> = Box::new(CueDriver::new(track, Arc::clone(playback)));

        let mut switched = false;
        self.shared.with_session(id, |s| {
            if playback.status().is_finished() {
                return;
            }
            if let Some(tx) = s.swap_tx.take() {
                switched = tx.try_send(driver).is_ok();
            }
        });

        if switched {
            info!(session = id, cue_count, "switching to phoneme cues");
            self.shared.emit(LipSyncEvent::DriverSwitched {
                session: id,
                cue_count,
            });
        } else {
            debug!(session = id, "cues arrived after the session ended; ignored");
        }
    }

    fn cues_unavailable(&self, id: u64, reason: &str) {
        warn!(session = id, "lip-sync cues unavailable, using amplitude: {reason}");
        self.shared.emit(LipSyncEvent::CuesUnavailable {
            session: id,
            reason: reason.to_owned(),
        });
    }

    /// Tear down a session whose playback failed and pass the error back.
    fn fail(&self, id: u64, error: LipSyncError) -> LipSyncError {
        if self.shared.end(Some(id), EndReason::Failed) {
            warn!(session = id, "playback failed: {error}");
            self.shared.emit(LipSyncEvent::PlaybackFailed {
                session: id,
                error: error.to_string(),
            });
        }
        error
    }
}

impl Drop for LipSync {
    fn drop(&mut self) {
        self.shared.end(None, EndReason::Stopped);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::audio::decode::tests::sine_wav;
    use crate::audio::headless::HeadlessOutput;
    use crate::cue::MouthCue;
    use async_trait::async_trait;

    struct FixedCues(CueTrack);

    #[async_trait]
    impl CueExtractor for FixedCues {
        async fn extract(&self, _audio: Bytes) -> Result<Option<CueTrack>> {
            Ok(Some(self.0.clone()))
        }
    }

    fn lipsync() -> LipSync {
        LipSync::new(Arc::new(HeadlessOutput::new()), LipSyncConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn stop_without_session_is_a_noop() {
        let lipsync = lipsync();
        lipsync.stop();
        lipsync.stop();
        assert!(lipsync.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_rejects_and_stays_idle() {
        let lipsync = lipsync();
        let mut events = lipsync.subscribe_events();
        let err = lipsync
            .speak(Bytes::from_static(b"garbage"))
            .await
            .unwrap_err();
        assert!(matches!(err, LipSyncError::Decode(_)));
        assert!(lipsync.state().is_idle());

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, LipSyncEvent::PlaybackFailed { .. }) {
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_cues_skip_the_extractor() {
        let mut config = LipSyncConfig::default();
        config.cues.enabled = false;
        let track = CueTrack::new(vec![MouthCue::new(0.0, 5.0, MouthShape::U)]);
        let lipsync = LipSync::new(Arc::new(HeadlessOutput::new()), config)
            .unwrap()
            .with_extractor(Arc::new(FixedCues(track)));

        lipsync.speak(sine_wav(1.0, 16_000, 1, 0.5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(lipsync.state().driver, Some(DriverKind::Amplitude));
    }

    #[test]
    fn rejects_invalid_amplitude_window() {
        for window_size in [0, 300] {
            let mut config = LipSyncConfig::default();
            config.amplitude.window_size = window_size;
            let result = LipSync::new(Arc::new(HeadlessOutput::new()), config);
            assert!(matches!(result, Err(LipSyncError::Config(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drop_releases_the_session() {
        let lipsync = lipsync();
        let rx = lipsync.subscribe();
        lipsync.speak(sine_wav(1.0, 16_000, 1, 0.5)).await.unwrap();
        assert!(rx.borrow().speaking);
        drop(lipsync);
        assert!(rx.borrow().is_idle());
    }
}
