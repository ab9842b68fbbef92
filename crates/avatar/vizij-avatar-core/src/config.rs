//! Engine configuration.
//!
//! Every section deserializes with defaults, so hosts only need to send the
//! fields they want to override:
//!
//! ```json
//! { "speech": { "cooldown_secs": 1.5 }, "rig": { "idle": "Idle_Breathing" } }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AvatarError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub fades: FadeConfig,
    pub speech: SpeechConfig,
    pub smoothing: SmoothingConfig,
    pub blink: BlinkConfig,
    pub gaze: GazeConfig,
    pub emotion: EmotionConfig,
    pub typing: TypingConfig,
    pub locomotion: LocomotionConfig,
    pub gesture: GestureConfig,
    pub breathing: BreathingConfig,
    pub readiness: ReadinessConfig,
    pub rig: RigConfig,
    /// Seed for the blink/gaze random processes.
    pub seed: u64,
    /// Upper bound applied to a single tick's dt (tab switches, debugger pauses).
    pub max_dt: f32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            fades: FadeConfig::default(),
            speech: SpeechConfig::default(),
            smoothing: SmoothingConfig::default(),
            blink: BlinkConfig::default(),
            gaze: GazeConfig::default(),
            emotion: EmotionConfig::default(),
            typing: TypingConfig::default(),
            locomotion: LocomotionConfig::default(),
            gesture: GestureConfig::default(),
            breathing: BreathingConfig::default(),
            readiness: ReadinessConfig::default(),
            rig: RigConfig::default(),
            seed: 0x5eed_a7a7,
            max_dt: 0.25,
        }
    }
}

impl AvatarConfig {
    pub fn from_json_str(s: &str) -> Result<Self, AvatarError> {
        let cfg: AvatarConfig = serde_json::from_str(s).map_err(|e| AvatarError::Config {
            reason: format!("parse error: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make timers or random intervals meaningless.
    pub fn validate(&self) -> Result<(), AvatarError> {
        let durations = [
            ("fades.crossfade_secs", self.fades.crossfade_secs),
            ("fades.intro_secs", self.fades.intro_secs),
            ("fades.locomotion_secs", self.fades.locomotion_secs),
            ("speech.lookahead_secs", self.speech.lookahead_secs as f32),
            ("speech.cooldown_secs", self.speech.cooldown_secs),
            ("typing.freeze_delay_secs", self.typing.freeze_delay_secs),
            ("typing.release_timeout_secs", self.typing.release_timeout_secs),
            ("readiness.timeout_secs", self.readiness.timeout_secs),
            ("readiness.backoff_secs", self.readiness.backoff_secs),
        ];
        for (name, v) in durations {
            if !v.is_finite() || v < 0.0 {
                return Err(AvatarError::Config {
                    reason: format!("{name} must be finite and >= 0 (got {v})"),
                });
            }
        }
        if self.blink.min_interval_secs > self.blink.max_interval_secs {
            return Err(AvatarError::Config {
                reason: "blink.min_interval_secs exceeds blink.max_interval_secs".into(),
            });
        }
        if self.gaze.min_interval_secs > self.gaze.max_interval_secs {
            return Err(AvatarError::Config {
                reason: "gaze.min_interval_secs exceeds gaze.max_interval_secs".into(),
            });
        }
        if self.max_dt.is_nan() || self.max_dt <= 0.0 {
            return Err(AvatarError::Config {
                reason: "max_dt must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Cross-fade durations in seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FadeConfig {
    pub crossfade_secs: f32,
    pub intro_secs: f32,
    pub locomotion_secs: f32,
}

impl Default for FadeConfig {
    fn default() -> Self {
        Self {
            crossfade_secs: 0.5,
            intro_secs: 1.0,
            locomotion_secs: 0.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Delay between `speak` and the audio start timestamp on the device clock.
    pub lookahead_secs: f64,
    /// Time the talking pose is held after the audio ends.
    pub cooldown_secs: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.06,
            cooldown_secs: 2.0,
        }
    }
}

/// Exponential smoothing rates (1/s) per blendshape category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub viseme: f32,
    pub jaw: f32,
    pub emotion: f32,
    pub blink: f32,
    pub gaze: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            viseme: 18.0,
            jaw: 14.0,
            emotion: 4.0,
            blink: 30.0,
            gaze: 12.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub enabled: bool,
    pub min_interval_secs: f32,
    pub max_interval_secs: f32,
    pub duration_secs: f32,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 2.0,
            max_interval_secs: 6.0,
            duration_secs: 0.12,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeConfig {
    pub enabled: bool,
    pub min_interval_secs: f32,
    pub max_interval_secs: f32,
    pub duration_secs: f32,
    /// Largest eye-look blendshape weight a saccade may target.
    pub max_amount: f32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 1.2,
            max_interval_secs: 4.0,
            duration_secs: 0.35,
            max_amount: 0.35,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub liveliness_period_secs: f32,
    /// Fraction of the profile intensity the slow sinusoid may remove (0..1).
    pub liveliness_depth: f32,
    /// Rate (1/s) at which the speaking-activity envelope rises while talking.
    pub activity_rise: f32,
    /// Rate (1/s) at which it decays back to zero at rest.
    pub activity_decay: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            liveliness_period_secs: 3.5,
            liveliness_depth: 0.2,
            activity_rise: 3.0,
            activity_decay: 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingConfig {
    /// Waiting-pose candidates tried in order: registered clip names first,
    /// anything containing '/' or ending in ".json" is fetched through the asset cache.
    pub clip_candidates: Vec<String>,
    /// Time after the pose starts before the frozen joints are captured.
    pub freeze_delay_secs: f32,
    /// Typing ends on its own after this long without a `set_typing(true)`.
    pub release_timeout_secs: f32,
    pub frozen_joints: Vec<String>,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            clip_candidates: vec!["typing".into(), "waiting".into(), "thinking".into()],
            freeze_delay_secs: 1.2,
            release_timeout_secs: 12.0,
            frozen_joints: vec!["Neck".into(), "Head".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocomotionConfig {
    /// Follow anchor candidates; the skeleton root is used when none exist.
    pub anchor_candidates: Vec<String>,
    /// Camera offset in the anchor's heading frame: [lateral, forward].
    pub follow_offset: [f32; 2],
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            anchor_candidates: vec![
                "Hips".into(),
                "hips".into(),
                "pelvis".into(),
                "Pelvis".into(),
            ],
            follow_offset: [0.6, 2.4],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Primary-layer gain while a gesture overlay plays.
    pub primary_weight: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            primary_weight: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreathingConfig {
    pub enabled: bool,
    pub amplitude_rad: f32,
    pub period_secs: f32,
    pub joints: Vec<String>,
}

impl Default for BreathingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            amplitude_rad: 0.015,
            period_secs: 4.2,
            joints: vec!["Spine".into(), "Spine1".into(), "Neck".into()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub timeout_secs: f32,
    pub backoff_secs: f32,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5.0,
            backoff_secs: 0.1,
        }
    }
}

/// Clip names (in the engine's clip library) assigned to each layer role.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub intro: Option<String>,
    pub idle: Option<String>,
    pub playlist: Vec<String>,
    pub talking: Vec<String>,
    /// Advance the playlist automatically when a playlist one-shot finishes.
    pub playlist_auto_advance: bool,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            intro: None,
            idle: Some("idle".into()),
            playlist: Vec::new(),
            talking: vec!["talking".into()],
            playlist_auto_advance: true,
        }
    }
}
