//! Phoneme cue tracks: precomputed mouth-shape timelines for one clip.

use crate::error::{LipSyncError, Result};
use crate::viseme::{MouthShape, map_phoneme_symbol};
use serde::Deserialize;
use std::sync::Arc;

/// One interval of a mouth-shape timeline, in seconds on the playback clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthCue {
    /// Inclusive start time.
    pub start: f64,
    /// Exclusive end time.
    pub end: f64,
    /// Shape shown while the cue is active.
    pub value: MouthShape,
}

impl MouthCue {
    /// Create a cue.
    pub fn new(start: f64, end: f64, value: MouthShape) -> Self {
        Self { start, end, value }
    }

    /// Whether `t` falls in `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// Immutable, ordered cue sequence for one utterance.
///
/// Cloning is cheap; the cues are shared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CueTrack {
    cues: Arc<[MouthCue]>,
}

impl CueTrack {
    /// Wrap a cue sequence. Ordering and overlap are not validated.
    pub fn new(cues: Vec<MouthCue>) -> Self {
        Self { cues: cues.into() }
    }

    /// Parse Rhubarb Lip Sync JSON output (`{"mouthCues": [...]}`).
    ///
    /// Rhubarb shape letters are mapped onto avatar shapes on the way in.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid Rhubarb JSON.
    pub fn from_rhubarb_json(json: &str) -> Result<Self> {
        let doc: RhubarbDocument = serde_json::from_str(json)
            .map_err(|e| LipSyncError::CueExtraction(format!("invalid rhubarb output: {e}")))?;
        Ok(Self::new(
            doc.mouth_cues
                .into_iter()
                .map(|c| MouthCue::new(c.start, c.end, map_phoneme_symbol(&c.value)))
                .collect(),
        ))
    }

    /// Shape active at playback time `t`, or [`MouthShape::Rest`] if none.
    ///
    /// Linear scan; if cues overlap the earliest in sequence order wins.
    pub fn shape_at(&self, t: f64) -> MouthShape {
        self.cues
            .iter()
            .find(|c| c.contains(t))
            .map(|c| c.value)
            .unwrap_or(MouthShape::Rest)
    }

    /// Whether every cue has `end > start` and no cue starts before the
    /// previous one ends.
    pub fn is_well_formed(&self) -> bool {
        self.cues.iter().all(|c| c.end > c.start)
            && self.cues.windows(2).all(|w| w[1].start >= w[0].end)
    }

    /// Number of cues.
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Whether the track has no cues.
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// End time of the last cue, in seconds.
    pub fn duration(&self) -> f64 {
        self.cues.iter().map(|c| c.end).fold(0.0, f64::max)
    }

    /// Borrow the cues.
    pub fn cues(&self) -> &[MouthCue] {
        &self.cues
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RhubarbDocument {
    #[serde(default)]
    mouth_cues: Vec<RhubarbCue>,
}

#[derive(Deserialize)]
struct RhubarbCue {
    start: f64,
    end: f64,
    value: String,
}
