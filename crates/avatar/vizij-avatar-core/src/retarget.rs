//! Retargeting adapter: rewrite a clip's bone names from a source naming
//! convention onto the target rig's joint names.
//!
//! Pipeline per track:
//! 1. canonicalize the bone name (last `|`/`/` path segment, separators normalized);
//! 2. look it up in the convention's static table;
//! 3. otherwise pass it through if it already is a target joint name;
//! 4. otherwise strip a known prefix and retry 2–3;
//! 5. otherwise keep the canonical name (inert if the rig lacks it).
//!
//! Afterwards translation on the root joint is dropped and only the first
//! track per `(joint, channel)` survives. The whole pass is pure and idempotent.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use log::debug;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::clip::{AnimationClip, Channel};

/// Root joint of the target rig; translation tracks on it are never kept.
pub const TARGET_ROOT_JOINT: &str = "Hips";

/// Joint names of the target rig.
pub const TARGET_JOINTS: &[&str] = &[
    "Hips", "Spine", "Spine1", "Spine2", "Neck", "Head", "HeadTop_End", "LeftEye", "RightEye",
    "LeftShoulder", "LeftArm", "LeftForeArm", "LeftHand",
    "LeftHandThumb1", "LeftHandThumb2", "LeftHandThumb3", "LeftHandThumb4",
    "LeftHandIndex1", "LeftHandIndex2", "LeftHandIndex3", "LeftHandIndex4",
    "LeftHandMiddle1", "LeftHandMiddle2", "LeftHandMiddle3", "LeftHandMiddle4",
    "LeftHandRing1", "LeftHandRing2", "LeftHandRing3", "LeftHandRing4",
    "LeftHandPinky1", "LeftHandPinky2", "LeftHandPinky3", "LeftHandPinky4",
    "RightShoulder", "RightArm", "RightForeArm", "RightHand",
    "RightHandThumb1", "RightHandThumb2", "RightHandThumb3", "RightHandThumb4",
    "RightHandIndex1", "RightHandIndex2", "RightHandIndex3", "RightHandIndex4",
    "RightHandMiddle1", "RightHandMiddle2", "RightHandMiddle3", "RightHandMiddle4",
    "RightHandRing1", "RightHandRing2", "RightHandRing3", "RightHandRing4",
    "RightHandPinky1", "RightHandPinky2", "RightHandPinky3", "RightHandPinky4",
    "LeftUpLeg", "LeftLeg", "LeftFoot", "LeftToeBase", "LeftToe_End",
    "RightUpLeg", "RightLeg", "RightFoot", "RightToeBase", "RightToe_End",
];

/// Prefixes stripped on the retry step, longest first.
const KNOWN_PREFIXES: &[&str] = &["mixamorig:", "mixamorig_", "mixamorig", "Armature_", "Bip01_"];

/// Prefixed external rig: once the `mixamorig` prefix is gone the names line
/// up with the target rig, including per-finger joints.
const PREFIXED_TABLE: &[(&str, &str)] = &[
    ("Hips", "Hips"), ("Spine", "Spine"), ("Spine1", "Spine1"), ("Spine2", "Spine2"),
    ("Neck", "Neck"), ("Head", "Head"), ("HeadTop_End", "HeadTop_End"),
    ("LeftEye", "LeftEye"), ("RightEye", "RightEye"),
    ("LeftShoulder", "LeftShoulder"), ("LeftArm", "LeftArm"),
    ("LeftForeArm", "LeftForeArm"), ("LeftHand", "LeftHand"),
    ("LeftHandThumb1", "LeftHandThumb1"), ("LeftHandThumb2", "LeftHandThumb2"),
    ("LeftHandThumb3", "LeftHandThumb3"), ("LeftHandThumb4", "LeftHandThumb4"),
    ("LeftHandIndex1", "LeftHandIndex1"), ("LeftHandIndex2", "LeftHandIndex2"),
    ("LeftHandIndex3", "LeftHandIndex3"), ("LeftHandIndex4", "LeftHandIndex4"),
    ("LeftHandMiddle1", "LeftHandMiddle1"), ("LeftHandMiddle2", "LeftHandMiddle2"),
    ("LeftHandMiddle3", "LeftHandMiddle3"), ("LeftHandMiddle4", "LeftHandMiddle4"),
    ("LeftHandRing1", "LeftHandRing1"), ("LeftHandRing2", "LeftHandRing2"),
    ("LeftHandRing3", "LeftHandRing3"), ("LeftHandRing4", "LeftHandRing4"),
    ("LeftHandPinky1", "LeftHandPinky1"), ("LeftHandPinky2", "LeftHandPinky2"),
    ("LeftHandPinky3", "LeftHandPinky3"), ("LeftHandPinky4", "LeftHandPinky4"),
    ("RightShoulder", "RightShoulder"), ("RightArm", "RightArm"),
    ("RightForeArm", "RightForeArm"), ("RightHand", "RightHand"),
    ("RightHandThumb1", "RightHandThumb1"), ("RightHandThumb2", "RightHandThumb2"),
    ("RightHandThumb3", "RightHandThumb3"), ("RightHandThumb4", "RightHandThumb4"),
    ("RightHandIndex1", "RightHandIndex1"), ("RightHandIndex2", "RightHandIndex2"),
    ("RightHandIndex3", "RightHandIndex3"), ("RightHandIndex4", "RightHandIndex4"),
    ("RightHandMiddle1", "RightHandMiddle1"), ("RightHandMiddle2", "RightHandMiddle2"),
    ("RightHandMiddle3", "RightHandMiddle3"), ("RightHandMiddle4", "RightHandMiddle4"),
    ("RightHandRing1", "RightHandRing1"), ("RightHandRing2", "RightHandRing2"),
    ("RightHandRing3", "RightHandRing3"), ("RightHandRing4", "RightHandRing4"),
    ("RightHandPinky1", "RightHandPinky1"), ("RightHandPinky2", "RightHandPinky2"),
    ("RightHandPinky3", "RightHandPinky3"), ("RightHandPinky4", "RightHandPinky4"),
    ("LeftUpLeg", "LeftUpLeg"), ("LeftLeg", "LeftLeg"), ("LeftFoot", "LeftFoot"),
    ("LeftToeBase", "LeftToeBase"), ("LeftToe_End", "LeftToe_End"),
    ("RightUpLeg", "RightUpLeg"), ("RightLeg", "RightLeg"), ("RightFoot", "RightFoot"),
    ("RightToeBase", "RightToeBase"), ("RightToe_End", "RightToe_End"),
];

/// Motion-capture rig (SMPL-style snake_case plus `L_`/`R_` aliases).
/// Finger bones collapse onto the hand joint: per-finger capture data
/// over-rotates the target hands into fists.
const MOTION_CAPTURE_TABLE: &[(&str, &str)] = &[
    ("pelvis", "Hips"), ("Pelvis", "Hips"),
    ("spine1", "Spine"), ("spine2", "Spine1"), ("spine3", "Spine2"),
    ("neck", "Neck"), ("head", "Head"),
    ("left_collar", "LeftShoulder"), ("left_shoulder", "LeftArm"),
    ("left_elbow", "LeftForeArm"), ("left_wrist", "LeftHand"),
    ("right_collar", "RightShoulder"), ("right_shoulder", "RightArm"),
    ("right_elbow", "RightForeArm"), ("right_wrist", "RightHand"),
    ("left_hip", "LeftUpLeg"), ("left_knee", "LeftLeg"),
    ("left_ankle", "LeftFoot"), ("left_foot", "LeftToeBase"),
    ("right_hip", "RightUpLeg"), ("right_knee", "RightLeg"),
    ("right_ankle", "RightFoot"), ("right_foot", "RightToeBase"),
    ("L_Collar", "LeftShoulder"), ("L_Shoulder", "LeftArm"),
    ("L_Elbow", "LeftForeArm"), ("L_Wrist", "LeftHand"),
    ("R_Collar", "RightShoulder"), ("R_Shoulder", "RightArm"),
    ("R_Elbow", "RightForeArm"), ("R_Wrist", "RightHand"),
    ("L_Hip", "LeftUpLeg"), ("L_Knee", "LeftLeg"), ("L_Ankle", "LeftFoot"),
    ("L_Foot", "LeftToeBase"),
    ("R_Hip", "RightUpLeg"), ("R_Knee", "RightLeg"), ("R_Ankle", "RightFoot"),
    ("R_Foot", "RightToeBase"),
    ("left_hand", "LeftHand"), ("right_hand", "RightHand"),
    ("left_thumb1", "LeftHand"), ("left_thumb2", "LeftHand"), ("left_thumb3", "LeftHand"),
    ("left_index1", "LeftHand"), ("left_index2", "LeftHand"), ("left_index3", "LeftHand"),
    ("left_middle1", "LeftHand"), ("left_middle2", "LeftHand"), ("left_middle3", "LeftHand"),
    ("left_ring1", "LeftHand"), ("left_ring2", "LeftHand"), ("left_ring3", "LeftHand"),
    ("left_pinky1", "LeftHand"), ("left_pinky2", "LeftHand"), ("left_pinky3", "LeftHand"),
    ("right_thumb1", "RightHand"), ("right_thumb2", "RightHand"), ("right_thumb3", "RightHand"),
    ("right_index1", "RightHand"), ("right_index2", "RightHand"), ("right_index3", "RightHand"),
    ("right_middle1", "RightHand"), ("right_middle2", "RightHand"), ("right_middle3", "RightHand"),
    ("right_ring1", "RightHand"), ("right_ring2", "RightHand"), ("right_ring3", "RightHand"),
    ("right_pinky1", "RightHand"), ("right_pinky2", "RightHand"), ("right_pinky3", "RightHand"),
];

type NameTable = HashMap<&'static str, &'static str>;

static TARGET_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| TARGET_JOINTS.iter().copied().collect());
static NATIVE: Lazy<NameTable> = Lazy::new(HashMap::new);
static PREFIXED: Lazy<NameTable> = Lazy::new(|| PREFIXED_TABLE.iter().copied().collect());
static MOTION_CAPTURE: Lazy<NameTable> =
    Lazy::new(|| MOTION_CAPTURE_TABLE.iter().copied().collect());

/// Source naming conventions a clip may be authored against.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonConvention {
    /// Already uses the target rig's names.
    #[default]
    Native,
    /// External rig whose names carry a vendor prefix (`mixamorig:Hips`).
    Prefixed,
    /// Motion-capture export with snake_case anatomical names (`left_elbow`).
    MotionCapture,
}

impl SkeletonConvention {
    fn table(&self) -> &'static NameTable {
        match self {
            SkeletonConvention::Native => &NATIVE,
            SkeletonConvention::Prefixed => &PREFIXED,
            SkeletonConvention::MotionCapture => &MOTION_CAPTURE,
        }
    }
}

/// A parsed clip together with the convention it was authored against.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceClip {
    pub clip: Arc<AnimationClip>,
    pub convention: SkeletonConvention,
}

/// Per-pass counters, logged at debug level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetargetReport {
    pub mapped: usize,
    pub passed_through: usize,
    pub unmapped: usize,
    pub dropped_root_translation: usize,
    pub deduplicated: usize,
}

#[inline]
pub fn is_target_joint(name: &str) -> bool {
    TARGET_SET.contains(name)
}

/// Last path segment with spaces and dashes normalized to underscores.
/// Never changes a name that is already canonical.
pub fn canonicalize(raw: &str) -> String {
    let segment = raw
        .rsplit(['|', '/'])
        .next()
        .unwrap_or(raw)
        .trim();
    segment.replace([' ', '-'], "_")
}

fn strip_known_prefix(name: &str) -> Option<&str> {
    KNOWN_PREFIXES
        .iter()
        .find_map(|p| name.strip_prefix(p))
        .filter(|rest| !rest.is_empty())
}

enum Resolution {
    Mapped(String),
    PassedThrough(String),
    Unmapped(String),
}

fn lookup(table: &NameTable, name: &str) -> Option<Resolution> {
    if let Some(target) = table.get(name) {
        return Some(Resolution::Mapped((*target).to_string()));
    }
    if is_target_joint(name) {
        return Some(Resolution::PassedThrough(name.to_string()));
    }
    None
}

fn resolve(convention: SkeletonConvention, raw: &str) -> Resolution {
    let canonical = canonicalize(raw);
    let table = convention.table();
    if let Some(r) = lookup(table, &canonical) {
        return r;
    }
    if let Some(stripped) = strip_known_prefix(&canonical) {
        if let Some(r) = lookup(table, stripped) {
            return r;
        }
    }
    Resolution::Unmapped(canonical)
}

/// Map a single bone name; unknown names come back canonicalized.
pub fn map_bone_name(convention: SkeletonConvention, raw: &str) -> String {
    match resolve(convention, raw) {
        Resolution::Mapped(n) | Resolution::PassedThrough(n) | Resolution::Unmapped(n) => n,
    }
}

/// Retarget `clip` from `convention` onto the target rig.
pub fn retarget(clip: &AnimationClip, convention: SkeletonConvention) -> AnimationClip {
    retarget_with_report(clip, convention).0
}

pub fn retarget_with_report(
    clip: &AnimationClip,
    convention: SkeletonConvention,
) -> (AnimationClip, RetargetReport) {
    let mut report = RetargetReport::default();
    let mut seen: HashSet<(String, Channel)> = HashSet::with_capacity(clip.tracks.len());
    let mut tracks = Vec::with_capacity(clip.tracks.len());

    for track in &clip.tracks {
        let bone = match resolve(convention, &track.bone) {
            Resolution::Mapped(n) => {
                report.mapped += 1;
                n
            }
            Resolution::PassedThrough(n) => {
                report.passed_through += 1;
                n
            }
            Resolution::Unmapped(n) => {
                debug!("retarget: no mapping for bone '{}' ({convention:?})", track.bone);
                report.unmapped += 1;
                n
            }
        };

        if track.channel == Channel::Position && bone == TARGET_ROOT_JOINT {
            report.dropped_root_translation += 1;
            continue;
        }
        if !seen.insert((bone.clone(), track.channel)) {
            report.deduplicated += 1;
            continue;
        }

        let mut out = track.clone();
        out.bone = bone;
        tracks.push(out);
    }

    debug!(
        "retarget '{}' ({convention:?}): {} mapped, {} passed through, {} unmapped, {} root translation dropped, {} deduplicated",
        clip.name,
        report.mapped,
        report.passed_through,
        report.unmapped,
        report.dropped_root_translation,
        report.deduplicated
    );

    (
        AnimationClip {
            name: clip.name.clone(),
            duration: clip.duration,
            tracks,
        },
        report,
    )
}
