//! Track sampling for keyframe clips.
//!
//! Model:
//! - Each Track has ordered key times in seconds.
//! - Between two keys, vec3 channels interpolate linearly and rotations use
//!   shortest-arc NLERP.
//! - Before the first key the first value holds; after the last key the last
//!   value holds (clamp-when-finished falls out of this).

use crate::clip::{Track, TrackValues};
use crate::interp::functions::{lerp_vec3, nlerp_quat, normalize4};

/// One sampled channel value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Sample {
    Vec3([f32; 3]),
    Quat([f32; 4]),
}

/// Find the segment [i, i+1] that contains time `t`, and return (i, i+1, alpha),
/// where alpha is normalized to [0, 1] between times[i] .. times[i+1].
/// Edge cases:
/// - If t <= first, returns (0, 0, 0).
/// - If t >= last, returns (last, last, 0).
fn find_segment(times: &[f32], t: f32) -> (usize, usize, f32) {
    let n = times.len();
    if n <= 1 || t <= times[0] {
        return (0, 0, 0.0);
    }
    if t >= times[n - 1] {
        return (n - 1, n - 1, 0.0);
    }
    // First key strictly after t; keys are non-decreasing so this is a valid split.
    let hi = times.partition_point(|&k| k <= t);
    let lo = hi - 1;
    let denom = (times[hi] - times[lo]).max(f32::EPSILON);
    (lo, hi, ((t - times[lo]) / denom).clamp(0.0, 1.0))
}

/// Sample a track at clip time `t` (seconds). Returns None for key-less tracks.
pub fn sample_track(track: &Track, t: f32) -> Option<Sample> {
    if track.times.is_empty() {
        return None;
    }
    let (i0, i1, alpha) = find_segment(&track.times, t);
    match &track.values {
        TrackValues::Vec3(keys) => {
            let a = *keys.get(i0)?;
            let b = *keys.get(i1)?;
            Some(Sample::Vec3(if i0 == i1 { a } else { lerp_vec3(a, b, alpha) }))
        }
        TrackValues::Quat(keys) => {
            let a = *keys.get(i0)?;
            let b = *keys.get(i1)?;
            Some(Sample::Quat(if i0 == i1 {
                normalize4(a)
            } else {
                nlerp_quat(a, b, alpha)
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::Channel;

    fn vec_track(keys: &[(f32, f32)]) -> Track {
        Track {
            bone: "Hips".into(),
            channel: Channel::Position,
            times: keys.iter().map(|k| k.0).collect(),
            values: TrackValues::Vec3(keys.iter().map(|k| [k.1, 0.0, 0.0]).collect()),
        }
    }

    #[test]
    fn samples_linear_between_keys_and_clamps_outside() {
        let track = vec_track(&[(0.0, 0.0), (1.0, 2.0), (2.0, 2.0)]);
        assert_eq!(sample_track(&track, 0.5), Some(Sample::Vec3([1.0, 0.0, 0.0])));
        assert_eq!(sample_track(&track, -1.0), Some(Sample::Vec3([0.0, 0.0, 0.0])));
        assert_eq!(sample_track(&track, 5.0), Some(Sample::Vec3([2.0, 0.0, 0.0])));
    }

    #[test]
    fn empty_track_yields_nothing() {
        let track = vec_track(&[]);
        assert_eq!(sample_track(&track, 0.0), None);
    }
}
