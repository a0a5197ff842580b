//! Published lip-sync state and the session-gated publisher behind it.

use crate::viseme::MouthShape;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

/// Which driver produced a published frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Live loudness of the playing signal.
    Amplitude,
    /// Precomputed phoneme cue track.
    Cues,
}

/// What the avatar renders: current mouth shape and whether speech is playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LipSyncState {
    /// Current mouth shape.
    pub mouth: MouthShape,
    /// Whether a clip is playing.
    pub speaking: bool,
    /// Driver that produced this frame; `None` when idle.
    pub driver: Option<DriverKind>,
    /// Session that produced this frame; `0` when idle.
    pub session: u64,
}

impl LipSyncState {
    /// The resting, silent state.
    pub const IDLE: LipSyncState = LipSyncState {
        mouth: MouthShape::Rest,
        speaking: false,
        driver: None,
        session: 0,
    };

    /// Whether this is the idle state.
    pub fn is_idle(&self) -> bool {
        *self == Self::IDLE
    }
}

/// Writes [`LipSyncState`] on behalf of exactly one live session at a time.
///
/// Every write names the session it comes from and is dropped unless that
/// session is still the active one. The check runs under the watch
/// channel's write lock, and [`StatePublisher::invalidate`] bumps the
/// active id before idle is published, so a tick that was already
/// scheduled when its session ended can never land after the reset.
#[derive(Debug, Clone)]
pub struct StatePublisher {
    tx: watch::Sender<LipSyncState>,
    active: Arc<AtomicU64>,
    next_id: Arc<AtomicU64>,
}

impl Default for StatePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePublisher {
    /// Create a publisher in the idle state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LipSyncState::IDLE);
        Self {
            tx,
            active: Arc::new(AtomicU64::new(0)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<LipSyncState> {
        self.tx.subscribe()
    }

    /// Latest published state.
    pub fn current(&self) -> LipSyncState {
        *self.tx.borrow()
    }

    /// Allocate a fresh session id and make it the active one.
    pub fn begin(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.store(id, Ordering::Release);
        id
    }

    /// Id of the active session, `0` if none.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Whether `session` is the active one.
    pub fn is_active(&self, session: u64) -> bool {
        session != 0 && self.active() == session
    }

    /// Publish a frame from `session`. Returns `false` if the session is
    /// no longer active and nothing was written.
    pub fn publish(
        &self,
        session: u64,
        mouth: MouthShape,
        speaking: bool,
        driver: Option<DriverKind>,
    ) -> bool {
        let mut accepted = false;
        self.tx.send_if_modified(|state| {
            if self.active.load(Ordering::Acquire) != session || session == 0 {
                return false;
            }
            accepted = true;
            let next = LipSyncState {
                mouth,
                speaking,
                driver,
                session,
            };
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        accepted
    }

    /// Deactivate `session` (if it is the active one) so its later writes are dropped.
    pub fn invalidate(&self, session: u64) {
        let _ = self
            .active
            .compare_exchange(session, 0, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Publish the idle state unconditionally.
    pub fn reset(&self) {
        self.tx.send_if_modified(|state| {
            if state.is_idle() {
                return false;
            }
            *state = LipSyncState::IDLE;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn starts_idle() {
        let publisher = StatePublisher::new();
        assert!(publisher.current().is_idle());
        assert_eq!(publisher.active(), 0);
    }

    #[test]
    fn only_active_session_publishes() {
        let publisher = StatePublisher::new();
        let first = publisher.begin();
        assert!(publisher.publish(first, MouthShape::A, true, Some(DriverKind::Amplitude)));

        let second = publisher.begin();
        assert_ne!(first, second);
        assert!(!publisher.publish(first, MouthShape::U, true, Some(DriverKind::Cues)));
        assert_eq!(publisher.current().mouth, MouthShape::A);

        assert!(publisher.publish(second, MouthShape::O, true, Some(DriverKind::Amplitude)));
        assert_eq!(publisher.current().session, second);
    }

    #[test]
    fn invalidate_then_reset_blocks_stale_writes() {
        let publisher = StatePublisher::new();
        let id = publisher.begin();
        publisher.publish(id, MouthShape::E, true, Some(DriverKind::Amplitude));

        publisher.invalidate(id);
        publisher.reset();
        assert!(!publisher.publish(id, MouthShape::A, true, Some(DriverKind::Amplitude)));
        assert!(publisher.current().is_idle());
    }

    #[test]
    fn invalidate_ignores_other_sessions() {
        let publisher = StatePublisher::new();
        let old = publisher.begin();
        let new = publisher.begin();
        publisher.invalidate(old);
        assert_eq!(publisher.active(), new);
    }

    #[test]
    fn unchanged_frames_do_not_notify() {
        let publisher = StatePublisher::new();
        let mut rx = publisher.subscribe();
        let id = publisher.begin();
        publisher.publish(id, MouthShape::L, true, Some(DriverKind::Amplitude));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        publisher.publish(id, MouthShape::L, true, Some(DriverKind::Amplitude));
        assert!(!rx.has_changed().unwrap());
    }
}
