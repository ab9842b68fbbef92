//! Emotion profiles: each emotion maps ARKit-style blendshape keys to a base intensity.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Excited,
    Thinking,
    Confused,
    Annoyed,
    Flirty,
}

const NEUTRAL: &[(&str, f32)] = &[];
const HAPPY: &[(&str, f32)] = &[
    ("mouthSmileLeft", 0.6),
    ("mouthSmileRight", 0.6),
    ("cheekSquintLeft", 0.3),
    ("cheekSquintRight", 0.3),
    ("eyeSquintLeft", 0.2),
    ("eyeSquintRight", 0.2),
];
const SAD: &[(&str, f32)] = &[
    ("browInnerUp", 0.6),
    ("mouthFrownLeft", 0.5),
    ("mouthFrownRight", 0.5),
    ("mouthPressLeft", 0.2),
    ("mouthPressRight", 0.2),
];
const EXCITED: &[(&str, f32)] = &[
    ("mouthSmileLeft", 0.7),
    ("mouthSmileRight", 0.7),
    ("browOuterUpLeft", 0.5),
    ("browOuterUpRight", 0.5),
    ("eyeWideLeft", 0.4),
    ("eyeWideRight", 0.4),
];
const THINKING: &[(&str, f32)] = &[
    ("browDownLeft", 0.3),
    ("browInnerUp", 0.3),
    ("mouthPucker", 0.3),
    ("eyeSquintRight", 0.2),
];
const CONFUSED: &[(&str, f32)] = &[
    ("browInnerUp", 0.5),
    ("browDownRight", 0.4),
    ("mouthLeft", 0.3),
    ("noseSneerLeft", 0.2),
];
const ANNOYED: &[(&str, f32)] = &[
    ("browDownLeft", 0.6),
    ("browDownRight", 0.6),
    ("mouthPressLeft", 0.4),
    ("mouthPressRight", 0.4),
    ("noseSneerLeft", 0.3),
    ("noseSneerRight", 0.3),
];
const FLIRTY: &[(&str, f32)] = &[
    ("mouthSmileLeft", 0.5),
    ("mouthSmileRight", 0.3),
    ("eyeSquintLeft", 0.4),
    ("browOuterUpRight", 0.3),
];

impl Emotion {
    pub const ALL: [Emotion; 8] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Excited,
        Emotion::Thinking,
        Emotion::Confused,
        Emotion::Annoyed,
        Emotion::Flirty,
    ];

    /// Case-insensitive parse; unknown names fall back to `Neutral`.
    pub fn parse_lenient(name: &str) -> Emotion {
        match name.trim().to_ascii_lowercase().as_str() {
            "happy" => Emotion::Happy,
            "sad" => Emotion::Sad,
            "excited" => Emotion::Excited,
            "thinking" => Emotion::Thinking,
            "confused" => Emotion::Confused,
            "annoyed" => Emotion::Annoyed,
            "flirty" => Emotion::Flirty,
            _ => Emotion::Neutral,
        }
    }

    pub fn profile(&self) -> &'static [(&'static str, f32)] {
        match self {
            Emotion::Neutral => NEUTRAL,
            Emotion::Happy => HAPPY,
            Emotion::Sad => SAD,
            Emotion::Excited => EXCITED,
            Emotion::Thinking => THINKING,
            Emotion::Confused => CONFUSED,
            Emotion::Annoyed => ANNOYED,
            Emotion::Flirty => FLIRTY,
        }
    }
}
