//! Locomotion camera controller.
//!
//! While a full-body clip plays the camera trails the follow anchor: the
//! anchor's yaw rotates a `(lateral, forward)` offset, the camera keeps the
//! height it had when locomotion began, and the orbit target slides
//! horizontally under the anchor at its captured height. Everything captured
//! at `begin` is restored at `end`.

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::LocomotionConfig;
use crate::skeleton::{JointTransform, Skeleton};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSettings {
    pub enable_pan: bool,
    pub enable_rotate: bool,
    pub enable_damping: bool,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            enable_pan: true,
            enable_rotate: true,
            enable_damping: true,
        }
    }
}

/// The rendering host's camera and orbit controls.
pub trait ViewHost {
    fn camera_position(&self) -> [f32; 3];
    fn set_camera_position(&mut self, position: [f32; 3]);
    fn orbit_target(&self) -> [f32; 3];
    fn set_orbit_target(&mut self, target: [f32; 3]);
    fn controls(&self) -> ControlSettings;
    fn set_controls(&mut self, controls: ControlSettings);
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub controls: ControlSettings,
}

impl CameraSnapshot {
    pub fn capture(view: &dyn ViewHost) -> Self {
        Self {
            position: view.camera_position(),
            target: view.orbit_target(),
            controls: view.controls(),
        }
    }

    pub fn restore(&self, view: &mut dyn ViewHost) {
        view.set_camera_position(self.position);
        view.set_orbit_target(self.target);
        view.set_controls(self.controls);
    }
}

/// Camera state reported in outputs while following.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraTelemetry {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub heading: f32,
}

#[derive(Clone, Debug)]
pub struct LocomotionCamera {
    offset: [f32; 2],
    anchor_candidates: Vec<String>,
    snapshot: Option<CameraSnapshot>,
    anchor: Option<usize>,
}

/// Yaw (about +Y) of a rotation's forward (+Z) axis.
pub fn heading_of(rotation: &UnitQuaternion<f32>) -> f32 {
    let forward = rotation * Vector3::z();
    forward.x.atan2(forward.z)
}

impl LocomotionCamera {
    pub fn new(cfg: &LocomotionConfig) -> Self {
        Self {
            offset: cfg.follow_offset,
            anchor_candidates: cfg.anchor_candidates.clone(),
            snapshot: None,
            anchor: None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&CameraSnapshot> {
        self.snapshot.as_ref()
    }

    fn pick_anchor(&self, skeleton: &Skeleton) -> usize {
        skeleton
            .find_first(self.anchor_candidates.as_slice())
            .unwrap_or_else(|| skeleton.root())
    }

    /// Capture the camera, choose the anchor and disable user controls.
    /// A second `begin` while active keeps the first capture.
    pub fn begin(&mut self, view: &mut dyn ViewHost, skeleton: Option<&Skeleton>) {
        if self.snapshot.is_none() {
            self.snapshot = Some(CameraSnapshot::capture(view));
        }
        self.anchor = skeleton.map(|s| self.pick_anchor(s));
        view.set_controls(ControlSettings {
            enable_pan: false,
            enable_rotate: false,
            enable_damping: false,
        });
        debug!("camera: follow started (anchor {:?})", self.anchor);
    }

    /// Place camera and orbit target relative to the anchor's world pose.
    pub fn follow(
        &mut self,
        view: &mut dyn ViewHost,
        skeleton: Option<&Skeleton>,
        model_root: &JointTransform,
    ) -> Option<CameraTelemetry> {
        let snapshot = self.snapshot?;
        let skeleton = skeleton?;
        let anchor = match self.anchor {
            Some(a) if a < skeleton.len() => a,
            _ => {
                let a = self.pick_anchor(skeleton);
                self.anchor = Some(a);
                a
            }
        };

        let world = skeleton.world_pose(anchor, model_root);
        let heading = heading_of(&world.rotation);
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), heading);
        let offset = yaw * Vector3::new(self.offset[0], 0.0, self.offset[1]);

        let position = [
            world.position.x + offset.x,
            snapshot.position[1],
            world.position.z + offset.z,
        ];
        let target = [world.position.x, snapshot.target[1], world.position.z];
        view.set_camera_position(position);
        view.set_orbit_target(target);
        Some(CameraTelemetry {
            position,
            target,
            heading,
        })
    }

    /// Restore everything captured by `begin`.
    pub fn end(&mut self, view: &mut dyn ViewHost) {
        if let Some(snapshot) = self.snapshot.take() {
            snapshot.restore(view);
            debug!("camera: follow ended, view restored");
        }
        self.anchor = None;
    }
}
