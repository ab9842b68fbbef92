//! Vizij Avatar Core (renderer-agnostic)
//!
//! Drives an audio-reactive skeletal avatar: retargets clips from foreign
//! skeleton conventions onto a canonical humanoid, mixes them through a
//! layered state machine (intro, idle, playlist, talking, typing, locomotion,
//! gesture overlays), schedules visemes against the audio clock and smooths
//! facial blendshapes. Hosts feed `AvatarEngine::tick` a frame delta plus an
//! audio clock and view, and read back joint poses, morph weights and events.

pub mod accumulate;
pub mod action;
pub mod assets;
pub mod blendshape;
pub mod camera;
pub mod clip;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod gesture;
pub mod ids;
pub mod interp;
pub mod loader;
pub mod mixer;
pub mod outputs;
pub mod procedural;
pub mod readiness;
pub mod request;
pub mod retarget;
pub mod sampling;
pub mod skeleton;
pub mod speech;
pub mod state;

// Re-exports for hosts (wasm, native)
pub use assets::{AssetCache, AssetLoader, ClipRef, PendingClip};
pub use blendshape::BlendshapeController;
pub use camera::{CameraSnapshot, CameraTelemetry, ControlSettings, ViewHost};
pub use clip::{AnimationClip, Channel, Track, TrackValues};
pub use config::AvatarConfig;
pub use emotion::Emotion;
pub use engine::AvatarEngine;
pub use error::AvatarError;
pub use ids::{ActionId, UtteranceId};
pub use loader::{parse_clip_bytes, parse_clip_json, parse_skeleton_json};
pub use outputs::{AvatarEvent, JointPose, MorphWeight, Outputs};
pub use request::{BackendReply, SpeechRequest};
pub use retarget::{map_bone_name, retarget, RetargetReport, SkeletonConvention, SourceClip};
pub use skeleton::{Joint, JointTransform, Skeleton};
pub use speech::{AudioDevice, SpeechAudio, VisemeCue, VoiceId};
pub use state::AvatarState;
