//! Avatar asset selection.
//!
//! Rendering is a pure lookup from published [`LipSyncState`] to asset
//! paths; the UI layer owns the actual drawing.

use crate::config::AvatarConfig;
use crate::state::LipSyncState;
use crate::viseme::MouthShape;

/// Asset paths for one avatar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarAssets {
    head: String,
    hands: String,
    mouths: [String; 6],
}

/// What to draw for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvatarFrame<'a> {
    /// Head image.
    pub head: &'a str,
    /// Hands image.
    pub hands: &'a str,
    /// Mouth overlay for the current shape.
    pub mouth: &'a str,
    /// Whether the hands should play the talking gesture.
    pub gesturing: bool,
}

impl AvatarAssets {
    /// Standard asset layout under `base`: `head.svg`, `hands.svg` and
    /// `mouth_<shape>.svg`.
    pub fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            head: format!("{base}/head.svg"),
            hands: format!("{base}/hands.svg"),
            mouths: MouthShape::ALL.map(|shape| format!("{base}/mouth_{shape}.svg")),
        }
    }

    /// Build from config.
    pub fn from_config(config: &AvatarConfig) -> Self {
        Self::new(&config.asset_base)
    }

    /// Asset for a mouth shape.
    pub fn mouth(&self, shape: MouthShape) -> &str {
        &self.mouths[usize::from(shape.band())]
    }

    /// Select assets for the given state.
    pub fn render(&self, state: &LipSyncState) -> AvatarFrame<'_> {
        AvatarFrame {
            head: &self.head,
            hands: &self.hands,
            mouth: self.mouth(state.mouth),
            gesturing: state.speaking,
        }
    }
}

impl Default for AvatarAssets {
    fn default() -> Self {
        Self::from_config(&AvatarConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::state::DriverKind;

    #[test]
    fn default_layout_matches_shipped_assets() {
        let assets = AvatarAssets::default();
        assert_eq!(assets.mouth(MouthShape::Rest), "/avatar/mouth_rest.svg");
        assert_eq!(assets.mouth(MouthShape::A), "/avatar/mouth_A.svg");
        assert_eq!(assets.mouth(MouthShape::E), "/avatar/mouth_E.svg");
        assert_eq!(assets.mouth(MouthShape::O), "/avatar/mouth_O.svg");
        assert_eq!(assets.mouth(MouthShape::U), "/avatar/mouth_U.svg");
        assert_eq!(assets.mouth(MouthShape::L), "/avatar/mouth_L.svg");
    }

    #[test]
    fn idle_state_rests_without_gesture() {
        let assets = AvatarAssets::new("https://cdn.example.com/avatar/");
        let frame = assets.render(&LipSyncState::IDLE);
        assert_eq!(frame.mouth, "https://cdn.example.com/avatar/mouth_rest.svg");
        assert_eq!(frame.head, "https://cdn.example.com/avatar/head.svg");
        assert!(!frame.gesturing);
    }

    #[test]
    fn speaking_state_gestures() {
        let assets = AvatarAssets::default();
        let state = LipSyncState {
            mouth: MouthShape::O,
            speaking: true,
            driver: Some(DriverKind::Cues),
            session: 3,
        };
        let frame = assets.render(&state);
        assert_eq!(frame.mouth, "/avatar/mouth_O.svg");
        assert_eq!(frame.hands, "/avatar/hands.svg");
        assert!(frame.gesturing);
    }
}
