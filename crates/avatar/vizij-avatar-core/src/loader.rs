use hashbrown::HashMap;
use log::debug;
use serde::Deserialize;

use crate::clip::{AnimationClip, Channel, Track, TrackValues};
use crate::error::AvatarError;
use crate::skeleton::{Joint, JointTransform, Skeleton};

/// Public API: parse keyframe-clip JSON (the three.js `AnimationClip.toJSON()` shape)
/// into the core AnimationClip.
///
/// Notes:
/// - Track names are `"<bone path>.<property>"`; the bone keeps its raw path
///   so the retargeting pass can canonicalize it.
/// - `values` is flat: 3 floats per key for position/scale, 4 for quaternions.
/// - Tracks on unsupported properties (morph targets, visibility) are skipped.
/// - A missing or negative duration falls back to the latest key time.
pub fn parse_clip_json(s: &str) -> Result<AnimationClip, AvatarError> {
    let raw: RawClip =
        serde_json::from_str(s).map_err(|e| AvatarError::clip_parse(format!("parse error: {e}")))?;
    to_clip(raw)
}

pub fn parse_clip_bytes(bytes: &[u8]) -> Result<AnimationClip, AvatarError> {
    let raw: RawClip = serde_json::from_slice(bytes)
        .map_err(|e| AvatarError::clip_parse(format!("parse error: {e}")))?;
    to_clip(raw)
}

fn to_clip(raw: RawClip) -> Result<AnimationClip, AvatarError> {
    let mut tracks = Vec::with_capacity(raw.tracks.len());
    for rt in raw.tracks {
        let Some((bone, property)) = rt.name.rsplit_once('.') else {
            return Err(AvatarError::clip_parse(format!(
                "track name '{}' has no property suffix",
                rt.name
            )));
        };
        let Some(channel) = Channel::from_suffix(property) else {
            debug!("loader: skipping unsupported track '{}' in '{}'", rt.name, raw.name);
            continue;
        };
        let stride = if channel == Channel::Rotation { 4 } else { 3 };
        if rt.values.len() != rt.times.len() * stride {
            return Err(AvatarError::InvalidClip {
                clip: raw.name.clone(),
                reason: format!(
                    "track '{}' expects {} values for {} keys, got {}",
                    rt.name,
                    rt.times.len() * stride,
                    rt.times.len(),
                    rt.values.len()
                ),
            });
        }
        let values = if stride == 4 {
            TrackValues::Quat(
                rt.values
                    .chunks_exact(4)
                    .map(|c| [c[0], c[1], c[2], c[3]])
                    .collect(),
            )
        } else {
            TrackValues::Vec3(rt.values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
        };
        tracks.push(Track {
            bone: bone.to_string(),
            channel,
            times: rt.times,
            values,
        });
    }

    let mut clip = AnimationClip {
        name: raw.name,
        duration: 0.0,
        tracks,
    };
    clip.duration = match raw.duration {
        Some(d) if d >= 0.0 => d,
        _ => clip.key_span(),
    };
    clip.validate_basic()?;
    Ok(clip)
}

/// Parse a skeleton description: `{ "joints": [{ "name", "parent", "position", "rotation", "scale" }] }`.
/// Parents are referenced by name; they may appear in any order.
pub fn parse_skeleton_json(s: &str) -> Result<Skeleton, AvatarError> {
    let raw: RawSkeleton = serde_json::from_str(s).map_err(|e| AvatarError::SkeletonInvalid {
        reason: format!("parse error: {e}"),
    })?;

    let names: HashMap<&str, usize> = raw
        .joints
        .iter()
        .enumerate()
        .map(|(i, j)| (j.name.as_str(), i))
        .collect();

    let mut joints = Vec::with_capacity(raw.joints.len());
    for rj in &raw.joints {
        let parent = match rj.parent.as_deref() {
            None => None,
            Some(p) => Some(*names.get(p).ok_or_else(|| AvatarError::SkeletonInvalid {
                reason: format!("joint '{}' references unknown parent '{p}'", rj.name),
            })?),
        };
        joints.push(Joint {
            name: rj.name.clone(),
            parent,
            bind: JointTransform {
                translation: rj.position,
                rotation: rj.rotation,
                scale: rj.scale,
            },
        });
    }
    Skeleton::new(joints)
}

// -----------------------------------------------------------------------------
// Serde shapes
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawClip {
    #[serde(default)]
    name: String,
    #[serde(default)]
    duration: Option<f32>,
    #[serde(default)]
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    name: String,
    #[allow(dead_code)]
    #[serde(default, rename = "type")]
    kind: Option<String>,
    times: Vec<f32>,
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct RawSkeleton {
    joints: Vec<RawJoint>,
}

#[derive(Debug, Deserialize)]
struct RawJoint {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    position: [f32; 3],
    #[serde(default = "identity_rotation")]
    rotation: [f32; 4],
    #[serde(default = "unit_scale")]
    scale: [f32; 3],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}
