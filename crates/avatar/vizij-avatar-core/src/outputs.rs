//! Output contracts from the avatar engine.
//!
//! Outputs carry the full joint pose and the facial weights that need
//! applying this tick, plus a separate list of semantic events. Adapters
//! (WASM, native hosts) apply the pose to the scene and forward events.

use serde::{Deserialize, Serialize};

use crate::camera::CameraTelemetry;
use crate::error::AvatarError;
use crate::ids::UtteranceId;
use crate::skeleton::JointTransform;
use crate::state::AvatarState;

/// Local transform of one named joint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub name: String,
    pub transform: JointTransform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MorphWeight {
    pub key: String,
    pub weight: f32,
}

/// Discrete semantic signals emitted during stepping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AvatarEvent {
    SpeechStarted {
        utterance: UtteranceId,
    },
    SpeechFinished {
        utterance: UtteranceId,
    },
    SpeechSuperseded {
        utterance: UtteranceId,
        by: UtteranceId,
    },
    StateChanged {
        from: AvatarState,
        to: AvatarState,
    },
    LocomotionStarted {
        url: String,
    },
    LocomotionFinished {
        url: String,
        completed: bool,
    },
    GestureStarted {
        url: String,
    },
    GestureFinished {
        url: String,
    },
    GestureAborted {
        url: String,
        reason: String,
    },
    LoadFailed {
        url: String,
        error: AvatarError,
    },
    ReadinessTimeout {
        what: String,
        waited_secs: f32,
    },
}

/// Outputs returned by AvatarEngine::tick().
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub joints: Vec<JointPose>,
    #[serde(default)]
    pub morphs: Vec<MorphWeight>,
    #[serde(default)]
    pub model_root: JointTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraTelemetry>,
    #[serde(default)]
    pub state: AvatarState,
    #[serde(default)]
    pub events: Vec<AvatarEvent>,
}

impl Outputs {
    #[inline]
    pub fn clear(&mut self) {
        self.joints.clear();
        self.morphs.clear();
        self.camera = None;
        self.events.clear();
    }

    pub fn joint(&self, name: &str) -> Option<&JointTransform> {
        self.joints
            .iter()
            .find(|j| j.name == name)
            .map(|j| &j.transform)
    }

    pub fn morph(&self, key: &str) -> Option<f32> {
        self.morphs.iter().find(|m| m.key == key).map(|m| m.weight)
    }
}
