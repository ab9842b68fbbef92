//! Procedural secondary motion layered on top of evaluated animation.

use std::f32::consts::TAU;

use crate::config::BreathingConfig;
use crate::interp::functions::{normalize4, quat_from_axis_angle, quat_mul};
use crate::skeleton::Skeleton;

const X_AXIS: [f32; 3] = [1.0, 0.0, 0.0];

/// Slow sinusoidal pitch on the spine chain; neck joints receive half.
#[derive(Clone, Debug, Default)]
pub struct BreathingSway {
    clock: f32,
}

impl BreathingSway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sway angle in radians.
    pub fn angle(&self, cfg: &BreathingConfig) -> f32 {
        if cfg.period_secs <= 0.0 {
            return 0.0;
        }
        cfg.amplitude_rad * (TAU * self.clock / cfg.period_secs).sin()
    }

    pub fn advance(&mut self, dt: f32) {
        self.clock += dt.max(0.0);
    }

    /// Post-multiply the configured joints' rotations by the sway.
    pub fn apply(&self, skeleton: &mut Skeleton, cfg: &BreathingConfig) {
        let angle = self.angle(cfg);
        if angle == 0.0 {
            return;
        }
        for name in &cfg.joints {
            let Some(idx) = skeleton.index_of(name) else {
                continue;
            };
            let scale = if name.to_ascii_lowercase().contains("neck") {
                0.5
            } else {
                1.0
            };
            let delta = quat_from_axis_angle(X_AXIS, angle * scale);
            let pose = skeleton.pose_mut(idx);
            pose.rotation = normalize4(quat_mul(pose.rotation, delta));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Joint, JointTransform};

    #[test]
    fn neck_receives_half_the_sway() {
        let mut skel = Skeleton::new(vec![
            Joint {
                name: "Spine".into(),
                parent: None,
                bind: JointTransform::IDENTITY,
            },
            Joint {
                name: "Neck".into(),
                parent: Some(0),
                bind: JointTransform::IDENTITY,
            },
        ])
        .unwrap();
        let cfg = BreathingConfig {
            period_secs: 4.0,
            ..BreathingConfig::default()
        };
        let mut sway = BreathingSway::new();
        sway.advance(1.0);
        sway.apply(&mut skel, &cfg);
        let spine_x = skel.pose(0).rotation[0];
        let neck_x = skel.pose(1).rotation[0];
        assert!(spine_x > 0.0);
        assert!((neck_x * 2.0 - spine_x).abs() < 1e-4);
    }
}
