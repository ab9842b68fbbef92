//! Animation clip data model: per-joint keyframe tracks plus a duration.
//!
//! A track targets `(bone, channel)`; times are seconds from clip start and
//! values are vec3 (position/scale) or quaternion (x,y,z,w) keys.

use serde::{Deserialize, Serialize};

use crate::error::AvatarError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Position,
    Rotation,
    Scale,
}

impl Channel {
    /// Property suffix used in track binding names ("Hips.quaternion").
    pub fn suffix(&self) -> &'static str {
        match self {
            Channel::Position => "position",
            Channel::Rotation => "quaternion",
            Channel::Scale => "scale",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "position" | "translation" => Some(Channel::Position),
            "quaternion" | "rotation" => Some(Channel::Rotation),
            "scale" => Some(Channel::Scale),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "keys", rename_all = "lowercase")]
pub enum TrackValues {
    Vec3(Vec<[f32; 3]>),
    Quat(Vec<[f32; 4]>),
}

impl TrackValues {
    pub fn len(&self) -> usize {
        match self {
            TrackValues::Vec3(v) => v.len(),
            TrackValues::Quat(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub bone: String,
    pub channel: Channel,
    pub times: Vec<f32>,
    pub values: TrackValues,
}

impl Track {
    pub fn binding_name(&self) -> String {
        format!("{}.{}", self.bone, self.channel.suffix())
    }

    fn validate(&self) -> Result<(), String> {
        let name = self.binding_name();
        if self.times.len() != self.values.len() {
            return Err(format!(
                "track '{name}' has {} times but {} values",
                self.times.len(),
                self.values.len()
            ));
        }
        match (&self.channel, &self.values) {
            (Channel::Rotation, TrackValues::Quat(_)) => {}
            (Channel::Position | Channel::Scale, TrackValues::Vec3(_)) => {}
            _ => return Err(format!("track '{name}' value kind does not match its channel")),
        }
        let mut last = -f32::INFINITY;
        for &t in &self.times {
            if !t.is_finite() || t < 0.0 {
                return Err(format!("track '{name}' has a negative or non-finite key time"));
            }
            if t < last {
                return Err(format!("track '{name}' key times must be non-decreasing"));
            }
            last = t;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationClip {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    pub tracks: Vec<Track>,
}

impl AnimationClip {
    /// Validate basic invariants (non-negative finite duration, matching key
    /// counts, value kinds matching channels, non-decreasing key times).
    pub fn validate_basic(&self) -> Result<(), AvatarError> {
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(AvatarError::InvalidClip {
                clip: self.name.clone(),
                reason: "duration must be finite and >= 0".into(),
            });
        }
        for track in &self.tracks {
            track.validate().map_err(|reason| AvatarError::InvalidClip {
                clip: self.name.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    pub fn track(&self, bone: &str, channel: Channel) -> Option<&Track> {
        self.tracks
            .iter()
            .find(|t| t.bone == bone && t.channel == channel)
    }

    /// Latest key time across all tracks.
    pub fn key_span(&self) -> f32 {
        self.tracks
            .iter()
            .filter_map(|t| t.times.last().copied())
            .fold(0.0, f32::max)
    }
}
