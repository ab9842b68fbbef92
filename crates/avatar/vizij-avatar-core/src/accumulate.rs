//! Accumulation of per-joint channel contributions and blending into the skeleton pose.

use hashbrown::HashMap;

use crate::clip::Channel;
use crate::interp::functions::{align_quat, normalize4};
use crate::sampling::Sample;
use crate::skeleton::Skeleton;

/// Accumulator entry storing weighted sums per channel kind.
/// For vectors: component-wise sum and total weight.
/// For quaternions: weighted sum of (x,y,z,w), each contribution aligned to the
/// hemisphere of the first one, normalized at apply time.
#[derive(Clone, Debug)]
enum AccumEntry {
    Vec3 { sum: [f32; 3], w: f32 },
    Quat { first: [f32; 4], sum: [f32; 4], w: f32 },
}

impl AccumEntry {
    fn from_sample(s: &Sample, w: f32) -> Self {
        match *s {
            Sample::Vec3(a) => AccumEntry::Vec3 {
                sum: [a[0] * w, a[1] * w, a[2] * w],
                w,
            },
            Sample::Quat(q) => AccumEntry::Quat {
                first: q,
                sum: [q[0] * w, q[1] * w, q[2] * w, q[3] * w],
                w,
            },
        }
    }

    fn add_sample(&mut self, s: &Sample, w: f32) {
        match (self, s) {
            (AccumEntry::Vec3 { sum, w: ww }, Sample::Vec3(a)) => {
                sum[0] += a[0] * w;
                sum[1] += a[1] * w;
                sum[2] += a[2] * w;
                *ww += w;
            }
            (AccumEntry::Quat { first, sum, w: ww }, Sample::Quat(q)) => {
                let q = align_quat(*first, *q);
                sum[0] += q[0] * w;
                sum[1] += q[1] * w;
                sum[2] += q[2] * w;
                sum[3] += q[3] * w;
                *ww += w;
            }
            _ => {
                // Mismatched kind; ignore to stay fail-soft.
            }
        }
    }
}

/// Accumulates weighted samples from every active action for one evaluation.
///
/// When the total weight on a channel is below 1 the remainder is filled with
/// the bind pose, so a fading-out action blends back to rest instead of
/// snapping.
#[derive(Default)]
pub struct PoseAccumulator {
    map: HashMap<(usize, Channel), AccumEntry>,
}

impl PoseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn add(&mut self, joint: usize, channel: Channel, sample: &Sample, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        self.map
            .entry((joint, channel))
            .and_modify(|entry| entry.add_sample(sample, weight))
            .or_insert_with(|| AccumEntry::from_sample(sample, weight));
    }

    /// Write blended values into the skeleton's current pose and clear.
    pub fn apply(&mut self, skeleton: &mut Skeleton) {
        for ((joint, channel), entry) in self.map.drain() {
            if joint >= skeleton.len() {
                continue;
            }
            let bind = *skeleton.bind(joint);
            match entry {
                AccumEntry::Vec3 { sum, w } => {
                    let rest = match channel {
                        Channel::Scale => bind.scale,
                        _ => bind.translation,
                    };
                    let v = if w >= 1.0 {
                        [sum[0] / w, sum[1] / w, sum[2] / w]
                    } else {
                        let r = 1.0 - w;
                        [
                            sum[0] + rest[0] * r,
                            sum[1] + rest[1] * r,
                            sum[2] + rest[2] * r,
                        ]
                    };
                    let pose = skeleton.pose_mut(joint);
                    match channel {
                        Channel::Scale => pose.scale = v,
                        _ => pose.translation = v,
                    }
                }
                AccumEntry::Quat { first, sum, w } => {
                    let q = if w >= 1.0 {
                        sum
                    } else {
                        let rest = align_quat(first, bind.rotation);
                        let r = 1.0 - w;
                        [
                            sum[0] + rest[0] * r,
                            sum[1] + rest[1] * r,
                            sum[2] + rest[2] * r,
                            sum[3] + rest[3] * r,
                        ]
                    };
                    skeleton.pose_mut(joint).rotation = normalize4(q);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Joint, JointTransform};

    fn single_joint() -> Skeleton {
        Skeleton::new(vec![Joint {
            name: "Hips".into(),
            parent: None,
            bind: JointTransform {
                translation: [0.0, 1.0, 0.0],
                ..JointTransform::IDENTITY
            },
        }])
        .unwrap()
    }

    #[test]
    fn partial_weight_blends_toward_bind() {
        let mut skel = single_joint();
        let mut acc = PoseAccumulator::new();
        acc.add(0, Channel::Position, &Sample::Vec3([0.0, 3.0, 0.0]), 0.5);
        acc.apply(&mut skel);
        assert!((skel.pose(0).translation[1] - 2.0).abs() < 1e-6);
        assert!(acc.is_empty());
    }

    #[test]
    fn overweight_is_normalized() {
        let mut skel = single_joint();
        let mut acc = PoseAccumulator::new();
        acc.add(0, Channel::Position, &Sample::Vec3([2.0, 0.0, 0.0]), 1.0);
        acc.add(0, Channel::Position, &Sample::Vec3([4.0, 0.0, 0.0]), 1.0);
        acc.apply(&mut skel);
        assert!((skel.pose(0).translation[0] - 3.0).abs() < 1e-6);
    }
}
