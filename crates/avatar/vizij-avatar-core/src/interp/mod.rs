//! Interpolation and smoothing helpers.
//!
//! Keyframe tracks use linear interpolation for vectors and a quaternion NLERP
//! with shortest-arc sign correction. Facial weights use a frame-rate
//! independent exponential approach.

pub mod functions;

pub use functions::{approach, lerp_f32, lerp_vec3, nlerp_quat, smoothing_factor};
