//! Target skeleton: named joints with a bind (rest) pose and a current pose.
//!
//! Joints are stored densely with parent indices; the name index is built
//! once at construction. Several subsystems write the current pose during a
//! tick (mixer, procedural sway, typing freeze), in that order.

use hashbrown::HashMap;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::AvatarError;
use crate::interp::functions::{dot4, QUAT_IDENTITY};

/// Local translation / rotation (x,y,z,w) / scale of one joint or of the model root.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointTransform {
    pub translation: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for JointTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl JointTransform {
    pub const IDENTITY: JointTransform = JointTransform {
        translation: [0.0, 0.0, 0.0],
        rotation: QUAT_IDENTITY,
        scale: [1.0, 1.0, 1.0],
    };

    /// Component-wise comparison; rotations compare up to sign (q and -q are equal).
    pub fn approx_eq(&self, other: &JointTransform, eps: f32) -> bool {
        let close3 = |a: [f32; 3], b: [f32; 3]| (0..3).all(|i| (a[i] - b[i]).abs() <= eps);
        let rot_close = 1.0 - dot4(self.rotation, other.rotation).abs() <= eps;
        close3(self.translation, other.translation) && close3(self.scale, other.scale) && rot_close
    }

    fn unit_rotation(&self) -> UnitQuaternion<f32> {
        let [x, y, z, w] = self.rotation;
        UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub parent: Option<usize>,
    pub bind: JointTransform,
}

/// World-space placement of a joint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<Joint>,
    pose: Vec<JointTransform>,
    index: HashMap<String, usize>,
    root: usize,
}

impl Skeleton {
    /// Validate and build. Names must be unique, exactly one joint has no
    /// parent, and every parent chain must terminate at that root.
    pub fn new(joints: Vec<Joint>) -> Result<Self, AvatarError> {
        if joints.is_empty() {
            return Err(AvatarError::SkeletonInvalid {
                reason: "skeleton has no joints".into(),
            });
        }
        let mut index = HashMap::with_capacity(joints.len());
        for (i, j) in joints.iter().enumerate() {
            if index.insert(j.name.clone(), i).is_some() {
                return Err(AvatarError::SkeletonInvalid {
                    reason: format!("duplicate joint name '{}'", j.name),
                });
            }
        }

        let roots: Vec<usize> = joints
            .iter()
            .enumerate()
            .filter(|(_, j)| j.parent.is_none())
            .map(|(i, _)| i)
            .collect();
        if roots.len() != 1 {
            return Err(AvatarError::SkeletonInvalid {
                reason: format!("expected exactly one root joint, found {}", roots.len()),
            });
        }

        for (i, j) in joints.iter().enumerate() {
            let mut cursor = j.parent;
            let mut steps = 0usize;
            while let Some(p) = cursor {
                if p >= joints.len() {
                    return Err(AvatarError::SkeletonInvalid {
                        reason: format!("joint '{}' has out-of-range parent {p}", j.name),
                    });
                }
                steps += 1;
                if steps > joints.len() || p == i {
                    return Err(AvatarError::SkeletonInvalid {
                        reason: format!("joint '{}' is part of a parent cycle", j.name),
                    });
                }
                cursor = joints[p].parent;
            }
        }

        let pose = joints.iter().map(|j| j.bind).collect();
        Ok(Self {
            joints,
            pose,
            index,
            root: roots[0],
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    #[inline]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.joints[idx].name
    }

    /// First joint present among `candidates`, in candidate order.
    pub fn find_first<S: AsRef<str>>(&self, candidates: &[S]) -> Option<usize> {
        candidates.iter().find_map(|c| self.index_of(c.as_ref()))
    }

    #[inline]
    pub fn pose(&self, idx: usize) -> &JointTransform {
        &self.pose[idx]
    }

    #[inline]
    pub fn pose_mut(&mut self, idx: usize) -> &mut JointTransform {
        &mut self.pose[idx]
    }

    #[inline]
    pub fn bind(&self, idx: usize) -> &JointTransform {
        &self.joints[idx].bind
    }

    pub fn local_pose(&self, name: &str) -> Option<&JointTransform> {
        self.index_of(name).map(|i| &self.pose[i])
    }

    /// Force every joint back to its rest pose.
    pub fn reset_to_bind(&mut self) {
        for (p, j) in self.pose.iter_mut().zip(self.joints.iter()) {
            *p = j.bind;
        }
    }

    pub fn snapshot(&self) -> Vec<JointTransform> {
        self.pose.clone()
    }

    /// Restore a snapshot taken from this skeleton; mismatched lengths are ignored.
    pub fn restore(&mut self, snapshot: &[JointTransform]) -> bool {
        if snapshot.len() != self.pose.len() {
            return false;
        }
        self.pose.copy_from_slice(snapshot);
        true
    }

    /// World placement of `idx` under `model_root`, composing the parent chain.
    pub fn world_pose(&self, idx: usize, model_root: &JointTransform) -> WorldPose {
        let mut chain = Vec::new();
        let mut cursor = Some(idx);
        while let Some(i) = cursor {
            chain.push(i);
            cursor = self.joints[i].parent;
        }

        let mut position = Vector3::from(model_root.translation);
        let mut rotation = model_root.unit_rotation();
        let mut scale = Vector3::from(model_root.scale);
        for &i in chain.iter().rev() {
            let local = &self.pose[i];
            let t = Vector3::from(local.translation).component_mul(&scale);
            position += rotation * t;
            rotation *= local.unit_rotation();
            scale = scale.component_mul(&Vector3::from(local.scale));
        }
        WorldPose { position, rotation }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joint(name: &str, parent: Option<usize>, t: [f32; 3]) -> Joint {
        Joint {
            name: name.into(),
            parent,
            bind: JointTransform {
                translation: t,
                ..JointTransform::IDENTITY
            },
        }
    }

    #[test]
    fn rejects_duplicate_names_and_multiple_roots() {
        let dup = Skeleton::new(vec![joint("Hips", None, [0.0; 3]), joint("Hips", Some(0), [0.0; 3])]);
        assert!(matches!(dup, Err(AvatarError::SkeletonInvalid { .. })));

        let two_roots = Skeleton::new(vec![joint("A", None, [0.0; 3]), joint("B", None, [0.0; 3])]);
        assert!(matches!(two_roots, Err(AvatarError::SkeletonInvalid { .. })));
    }

    #[test]
    fn rejects_parent_cycles() {
        let cyc = Skeleton::new(vec![
            joint("Root", None, [0.0; 3]),
            joint("A", Some(2), [0.0; 3]),
            joint("B", Some(1), [0.0; 3]),
        ]);
        assert!(matches!(cyc, Err(AvatarError::SkeletonInvalid { .. })));
    }

    #[test]
    fn world_pose_composes_chain() {
        let skel = Skeleton::new(vec![
            joint("Hips", None, [0.0, 1.0, 0.0]),
            joint("Spine", Some(0), [0.0, 0.5, 0.0]),
        ])
        .unwrap();
        let root = JointTransform {
            translation: [2.0, 0.0, 0.0],
            ..JointTransform::IDENTITY
        };
        let wp = skel.world_pose(1, &root);
        assert!((wp.position.x - 2.0).abs() < 1e-6);
        assert!((wp.position.y - 1.5).abs() < 1e-6);
    }
}
