//! Mouth-shape drivers and the frame pump that runs them.
//!
//! A driver turns some signal into one [`MouthShape`] per animation frame.
//! Drivers never schedule themselves; [`pump::FramePump`] calls
//! [`MouthDriver::tick`] once per frame and owns exactly one driver at a
//! time, so swapping drivers is just replacing a box between frames.

pub mod amplitude;
pub mod cues;
pub mod pump;

use crate::state::DriverKind;
use crate::viseme::MouthShape;

pub use amplitude::AmplitudeDriver;
pub use cues::CueDriver;
pub use pump::{FramePump, PumpExit};

/// A per-frame source of mouth shapes.
pub trait MouthDriver: Send {
    /// Which signal this driver follows.
    fn kind(&self) -> DriverKind;

    /// Sample the signal and return the shape for this frame.
    fn tick(&mut self) -> MouthShape;

    /// Whether the driver has nothing more to publish.
    fn is_done(&self) -> bool;
}
