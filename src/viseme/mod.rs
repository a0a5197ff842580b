//! Viseme mapping for lip-sync animation.
//!
//! A viseme is a visual mouth shape that stands in for a class of spoken
//! sounds. The avatar only has six mouth poses, so both signal sources
//! (phoneme cues and raw loudness) collapse onto [`MouthShape`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Discrete mouth pose rendered by the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MouthShape {
    /// Mouth closed / at rest.
    #[default]
    #[serde(rename = "rest")]
    Rest,
    /// Wide open.
    A,
    /// Medium open, spread.
    E,
    /// Rounded, open.
    O,
    /// Rounded, small.
    U,
    /// Tongue visible, slightly open.
    L,
}

impl MouthShape {
    /// Every shape, in loudness-band order.
    pub const ALL: [MouthShape; 6] = [
        MouthShape::Rest,
        MouthShape::L,
        MouthShape::E,
        MouthShape::A,
        MouthShape::O,
        MouthShape::U,
    ];

    /// Position of this shape in the amplitude band ordering
    /// `rest < L < E < A < O < U`.
    pub fn band(self) -> u8 {
        match self {
            MouthShape::Rest => 0,
            MouthShape::L => 1,
            MouthShape::E => 2,
            MouthShape::A => 3,
            MouthShape::O => 4,
            MouthShape::U => 5,
        }
    }

    /// Symbol used in logs, asset names and config files.
    pub fn as_str(self) -> &'static str {
        match self {
            MouthShape::Rest => "rest",
            MouthShape::A => "A",
            MouthShape::E => "E",
            MouthShape::O => "O",
            MouthShape::U => "U",
            MouthShape::L => "L",
        }
    }
}

impl fmt::Display for MouthShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mouth shape symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mouth shape '{0}'")]
pub struct UnknownMouthShape(pub String);

impl FromStr for MouthShape {
    type Err = UnknownMouthShape;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rest" => Ok(MouthShape::Rest),
            "A" => Ok(MouthShape::A),
            "E" => Ok(MouthShape::E),
            "O" => Ok(MouthShape::O),
            "U" => Ok(MouthShape::U),
            "L" => Ok(MouthShape::L),
            other => Err(UnknownMouthShape(other.to_owned())),
        }
    }
}

/// Map a Rhubarb mouth-shape letter to an avatar mouth shape.
///
/// Rhubarb emits the Preston Blair / Hanna-Barbera set `A`..`H` plus `X`
/// for idle. Anything outside that alphabet is treated as silence.
pub fn map_phoneme_symbol(code: &str) -> MouthShape {
    match code {
        // Rhubarb's closed (A) and clenched (B) poses both render as the open mouth
        "A" | "B" => MouthShape::A,
        "C" => MouthShape::E,
        "D" => MouthShape::A,
        "E" => MouthShape::E,
        "F" => MouthShape::U,
        "G" => MouthShape::O,
        "H" => MouthShape::L,
        "X" => MouthShape::Rest,
        _ => MouthShape::Rest,
    }
}

/// Loudness bands as `(exclusive upper bound, shape)`, ascending.
///
/// Levels at or above the last bound map to [`LOUDEST_SHAPE`].
pub const AMPLITUDE_BANDS: [(f32, MouthShape); 5] = [
    (0.05, MouthShape::Rest),
    (0.15, MouthShape::L),
    (0.3, MouthShape::E),
    (0.5, MouthShape::A),
    (0.7, MouthShape::O),
];

/// Shape for the loudest band.
pub const LOUDEST_SHAPE: MouthShape = MouthShape::U;

/// Map a loudness level in `[0, 1]` to a mouth shape.
///
/// The caller is expected to clamp; NaN falls through to the loudest band.
pub fn map_amplitude(level: f32) -> MouthShape {
    AMPLITUDE_BANDS
        .iter()
        .find(|(upper, _)| level < *upper)
        .map(|(_, shape)| *shape)
        .unwrap_or(LOUDEST_SHAPE)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn rhubarb_table_is_preserved() {
        let table = [
            ("A", MouthShape::A),
            ("B", MouthShape::A),
            ("C", MouthShape::E),
            ("D", MouthShape::A),
            ("E", MouthShape::E),
            ("F", MouthShape::U),
            ("G", MouthShape::O),
            ("H", MouthShape::L),
            ("X", MouthShape::Rest),
        ];
        for (code, expected) in table {
            assert_eq!(map_phoneme_symbol(code), expected, "code {code}");
        }
    }

    #[test]
    fn unknown_phoneme_symbols_map_to_rest() {
        for code in ["", "a", "x", "I", "Z", "AA", "sil", " A", "🙂"] {
            assert_eq!(map_phoneme_symbol(code), MouthShape::Rest, "code {code:?}");
        }
    }

    #[test]
    fn amplitude_band_edges() {
        assert_eq!(map_amplitude(0.0), MouthShape::Rest);
        assert_eq!(map_amplitude(0.049), MouthShape::Rest);
        assert_eq!(map_amplitude(0.05), MouthShape::L);
        assert_eq!(map_amplitude(0.15), MouthShape::E);
        assert_eq!(map_amplitude(0.3), MouthShape::A);
        assert_eq!(map_amplitude(0.5), MouthShape::O);
        assert_eq!(map_amplitude(0.7), MouthShape::U);
        assert_eq!(map_amplitude(1.0), MouthShape::U);
    }

    #[test]
    fn amplitude_mapping_is_monotonic() {
        let mut previous = map_amplitude(0.0).band();
        for step in 1..=1000 {
            let level = step as f32 / 1000.0;
            let band = map_amplitude(level).band();
            assert!(band >= previous, "band dropped at level {level}");
            previous = band;
        }
    }

    #[test]
    fn band_table_is_ascending() {
        for pair in AMPLITUDE_BANDS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
            assert!(pair[0].1.band() < pair[1].1.band());
        }
        assert!(AMPLITUDE_BANDS[4].1.band() < LOUDEST_SHAPE.band());
    }

    #[test]
    fn shape_symbols_round_trip_through_from_str() {
        for shape in MouthShape::ALL {
            assert_eq!(shape.as_str().parse::<MouthShape>(), Ok(shape));
        }
        assert!("Rest".parse::<MouthShape>().is_err());
    }
}
