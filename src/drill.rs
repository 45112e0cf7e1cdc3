use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{SequencerError, SettingsError};

/// The three drill protocols an athlete can practice
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DrillType {
    DownSetWhistle,
    RapidClamp,
    ThreeWhistle,
}

impl DrillType {
    pub const ALL: [DrillType; 3] = [
        DrillType::DownSetWhistle,
        DrillType::RapidClamp,
        DrillType::ThreeWhistle,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DrillType::DownSetWhistle => "Down Set Whistle",
            DrillType::RapidClamp => "Rapid Clamp",
            DrillType::ThreeWhistle => "Three Whistle Drill",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DrillType::DownSetWhistle => {
                "Traditional face-off sequence with Down, Set, and Whistle commands"
            }
            DrillType::RapidClamp => "Repetitive whistle sounds for continuous clamping practice",
            DrillType::ThreeWhistle => "Clamp, Pull, Pop sequence with pause for reset",
        }
    }

    /// Ordered steps making up one rep of this drill
    pub fn protocol(&self) -> &'static [Step] {
        match self {
            DrillType::DownSetWhistle => DOWN_SET_WHISTLE,
            DrillType::RapidClamp => RAPID_CLAMP,
            DrillType::ThreeWhistle => THREE_WHISTLE,
        }
    }

    /// Delay ranges this drill reads from settings, rest included
    pub fn range_keys(&self) -> Vec<RangeKey> {
        let mut keys: Vec<RangeKey> = self.protocol().iter().filter_map(|s| s.delay).collect();
        keys.push(RangeKey::RestBetween);
        keys
    }
}

impl FromStr for DrillType {
    type Err = SequencerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DrillType::ALL
            .into_iter()
            .find(|d| d.to_string() == s.trim().to_lowercase())
            .ok_or_else(|| SequencerError::InvalidDrillType(s.to_string()))
    }
}

/// Audio signal played at a phase boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cue {
    Down,
    Set,
    Whistle,
    None,
}

/// Named min/max pair in a drill's settings
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RangeKey {
    Down,
    Set,
    RestBetween,
    ClampToPull,
    PullToPop,
    ResetPause,
}

impl RangeKey {
    pub const ALL: [RangeKey; 6] = [
        RangeKey::Down,
        RangeKey::Set,
        RangeKey::RestBetween,
        RangeKey::ClampToPull,
        RangeKey::PullToPop,
        RangeKey::ResetPause,
    ];
}

impl FromStr for RangeKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        RangeKey::ALL
            .into_iter()
            .find(|k| k.to_string() == wanted)
            .ok_or_else(|| SettingsError::UnknownRange(s.to_string()))
    }
}

/// One entry of a drill protocol: an optional cue followed by an optional
/// randomized wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub cue: Cue,
    pub label: &'static str,
    pub delay: Option<RangeKey>,
}

impl Step {
    const fn new(cue: Cue, label: &'static str, delay: Option<RangeKey>) -> Self {
        Self { cue, label, delay }
    }
}

const DOWN_SET_WHISTLE: &[Step] = &[
    Step::new(Cue::Down, "Down!", Some(RangeKey::Down)),
    Step::new(Cue::Set, "Set!", Some(RangeKey::Set)),
    Step::new(Cue::Whistle, "GO!", None),
];

const RAPID_CLAMP: &[Step] = &[Step::new(Cue::Whistle, "CLAMP!", None)];

// The trailing reset pause belongs to the rep itself; rest between reps is
// handled by the sequencer.
const THREE_WHISTLE: &[Step] = &[
    Step::new(Cue::Whistle, "CLAMP", Some(RangeKey::ClampToPull)),
    Step::new(Cue::Whistle, "PULL", Some(RangeKey::PullToPop)),
    Step::new(Cue::Whistle, "POP", Some(RangeKey::ResetPause)),
];
