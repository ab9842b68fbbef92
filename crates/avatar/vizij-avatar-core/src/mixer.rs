//! Mixer: owns bound actions, advances them, and blends them into the skeleton.
//!
//! Methods:
//! - bind, fade_in, fade_out, set_hook / take_hook, stop / stop_all
//! - fade_primary_gain (gesture overlays)
//! - update (fades, time, finish hooks) then evaluate (sample → accumulate → pose)

use std::sync::Arc;

use crate::accumulate::PoseAccumulator;
use crate::action::{AnimationAction, Fade, FinishHook, Layer, LoopMode};
use crate::clip::AnimationClip;
use crate::ids::{ActionId, IdAllocator};
use crate::sampling::sample_track;
use crate::skeleton::Skeleton;

/// One action that finished during `update`, with its consumed hook.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Finished {
    pub action: ActionId,
    pub hook: Option<FinishHook>,
}

pub struct Mixer {
    ids: IdAllocator,
    actions: Vec<AnimationAction>,
    primary_gain: f32,
    gain_fade: Option<Fade>,
    accum: PoseAccumulator,
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("actions", &self.actions.len())
            .field("primary_gain", &self.primary_gain)
            .finish()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            ids: IdAllocator::new(),
            actions: Vec::new(),
            primary_gain: 1.0,
            gain_fade: None,
            accum: PoseAccumulator::new(),
        }
    }

    /// Bind a clip to the skeleton at weight 0.
    pub fn bind(
        &mut self,
        clip: Arc<AnimationClip>,
        skeleton: &Skeleton,
        mode: LoopMode,
        layer: Layer,
    ) -> ActionId {
        let id = self.ids.alloc_action();
        self.actions
            .push(AnimationAction::new(id, clip, skeleton, mode, layer));
        id
    }

    pub fn action(&self, id: ActionId) -> Option<&AnimationAction> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn action_mut(&mut self, id: ActionId) -> Option<&mut AnimationAction> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    pub fn contains(&self, id: ActionId) -> bool {
        self.action(id).is_some()
    }

    pub fn actions(&self) -> impl Iterator<Item = &AnimationAction> {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn weight(&self, id: ActionId) -> Option<f32> {
        self.action(id).map(|a| a.weight)
    }

    pub fn set_weight(&mut self, id: ActionId, w: f32) {
        if let Some(a) = self.action_mut(id) {
            a.set_weight(w);
        }
    }

    pub fn fade_in(&mut self, id: ActionId, duration: f32) {
        if let Some(a) = self.action_mut(id) {
            a.fade_to(1.0, duration, false);
        }
    }

    /// Fade to zero; with `stop` the action is removed once the fade completes.
    pub fn fade_out(&mut self, id: ActionId, duration: f32, stop: bool) {
        if let Some(a) = self.action_mut(id) {
            a.fade_to(0.0, duration, stop);
        }
    }

    /// Attach a finish hook, detaching and returning any previous one.
    pub fn set_hook(&mut self, id: ActionId, hook: FinishHook) -> Option<FinishHook> {
        self.action_mut(id).and_then(|a| a.set_hook(hook))
    }

    pub fn take_hook(&mut self, id: ActionId) -> Option<FinishHook> {
        self.action_mut(id).and_then(|a| a.take_hook())
    }

    pub fn stop(&mut self, id: ActionId) {
        self.actions.retain(|a| a.id != id);
    }

    pub fn stop_all(&mut self) {
        self.actions.clear();
        self.primary_gain = 1.0;
        self.gain_fade = None;
    }

    #[inline]
    pub fn primary_gain(&self) -> f32 {
        self.primary_gain
    }

    pub fn fade_primary_gain(&mut self, to: f32, duration: f32) {
        let to = to.clamp(0.0, 1.0);
        if duration <= 0.0 {
            self.primary_gain = to;
            self.gain_fade = None;
        } else {
            self.gain_fade = Some(Fade::new(self.primary_gain, to, duration));
        }
    }

    /// Advance fades and clip time. Actions whose fade-out completed with
    /// `stop` are removed. Returns the actions that finished this step.
    pub fn update(&mut self, dt: f32) -> Vec<Finished> {
        if let Some(fade) = self.gain_fade.as_mut() {
            self.primary_gain = fade.step(dt);
            if fade.is_done() {
                self.gain_fade = None;
            }
        }

        let mut finished = Vec::new();
        for action in &mut self.actions {
            if action.advance(dt) {
                finished.push(Finished {
                    action: action.id,
                    hook: action.take_hook(),
                });
            }
        }
        self.actions.retain(|a| !a.is_stopped());
        finished
    }

    /// Sample every weighted action and write the blended result into the
    /// skeleton's current pose. Channels no action touches keep their value.
    pub fn evaluate(&mut self, skeleton: &mut Skeleton) {
        self.accum.clear();
        for action in &self.actions {
            let gain = match action.layer {
                Layer::Primary => self.primary_gain,
                Layer::Gesture | Layer::Locomotion => 1.0,
            };
            let weight = action.weight * gain;
            if weight <= 0.0 {
                continue;
            }
            for (track, joint) in action.clip.tracks.iter().zip(action.bindings()) {
                let Some(joint) = *joint else { continue };
                if let Some(sample) = sample_track(track, action.time) {
                    self.accum.add(joint, track.channel, &sample, weight);
                }
            }
        }
        self.accum.apply(skeleton);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{Channel, Track, TrackValues};
    use crate::skeleton::{Joint, JointTransform};

    fn skeleton() -> Skeleton {
        Skeleton::new(vec![Joint {
            name: "Hips".into(),
            parent: None,
            bind: JointTransform::IDENTITY,
        }])
        .unwrap()
    }

    fn scale_clip(value: f32) -> Arc<AnimationClip> {
        Arc::new(AnimationClip {
            name: "s".into(),
            duration: 1.0,
            tracks: vec![Track {
                bone: "Hips".into(),
                channel: Channel::Scale,
                times: vec![0.0],
                values: TrackValues::Vec3(vec![[value; 3]]),
            }],
        })
    }

    #[test]
    fn paired_fades_blend_and_remove_source() {
        let mut skel = skeleton();
        let mut mixer = Mixer::new();
        let a = mixer.bind(scale_clip(2.0), &skel, LoopMode::Repeat, Layer::Primary);
        let b = mixer.bind(scale_clip(4.0), &skel, LoopMode::Repeat, Layer::Primary);
        mixer.set_weight(a, 1.0);
        mixer.fade_out(a, 1.0, true);
        mixer.fade_in(b, 1.0);

        mixer.update(0.5);
        mixer.evaluate(&mut skel);
        assert!((skel.pose(0).scale[0] - 3.0).abs() < 1e-5);

        mixer.update(0.5);
        assert!(!mixer.contains(a));
        assert_eq!(mixer.weight(b), Some(1.0));
    }

    #[test]
    fn finish_hook_is_reported_once() {
        let skel = skeleton();
        let mut mixer = Mixer::new();
        let a = mixer.bind(scale_clip(1.0), &skel, LoopMode::OnceClamp, Layer::Gesture);
        mixer.set_hook(a, FinishHook::GestureComplete);
        let first = mixer.update(2.0);
        assert_eq!(
            first,
            vec![Finished {
                action: a,
                hook: Some(FinishHook::GestureComplete)
            }]
        );
        assert!(mixer.update(2.0).is_empty());
    }

    #[test]
    fn primary_gain_scales_only_primary_layer() {
        let mut skel = skeleton();
        let mut mixer = Mixer::new();
        let a = mixer.bind(scale_clip(3.0), &skel, LoopMode::Repeat, Layer::Primary);
        mixer.set_weight(a, 1.0);
        mixer.fade_primary_gain(0.5, 0.0);
        mixer.update(0.0);
        mixer.evaluate(&mut skel);
        assert!((skel.pose(0).scale[0] - 2.0).abs() < 1e-5);
    }
}
