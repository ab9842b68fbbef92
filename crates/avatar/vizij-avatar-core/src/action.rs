//! AnimationAction: a retargeted clip bound to the skeleton plus its playback state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clip::AnimationClip;
use crate::ids::ActionId;
use crate::interp::functions::lerp_f32;
use crate::skeleton::Skeleton;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopMode {
    /// Wrap to the start at the end of the clip.
    Repeat,
    /// Play once and hold the final pose.
    OnceClamp,
}

/// Which mixer layer an action contributes to. Only `Primary` is scaled by
/// the primary gain that gesture overlays fade down.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layer {
    Primary,
    Gesture,
    Locomotion,
}

/// What the state machine should do when an action finishes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishHook {
    IntroComplete,
    PlaylistItemComplete,
    GestureComplete,
    LocomotionComplete,
}

/// Linear fade of a scalar from `from` to `to` over `duration` seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Fade {
    pub from: f32,
    pub to: f32,
    pub duration: f32,
    pub elapsed: f32,
}

impl Fade {
    pub fn new(from: f32, to: f32, duration: f32) -> Self {
        Self {
            from,
            to,
            duration: duration.max(0.0),
            elapsed: 0.0,
        }
    }

    /// Advance and return the current value.
    pub fn step(&mut self, dt: f32) -> f32 {
        self.elapsed += dt.max(0.0);
        self.value()
    }

    pub fn value(&self) -> f32 {
        if self.duration <= 0.0 {
            return self.to;
        }
        lerp_f32(self.from, self.to, (self.elapsed / self.duration).clamp(0.0, 1.0))
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.elapsed >= self.duration
    }
}

fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if m < 0.0 {
        m + b
    } else {
        m
    }
}

#[derive(Debug)]
pub struct AnimationAction {
    pub id: ActionId,
    pub clip: Arc<AnimationClip>,
    /// Track index → joint index; `None` keeps the track inert.
    bindings: Vec<Option<usize>>,
    pub weight: f32,
    fade: Option<Fade>,
    stop_after_fade: bool,
    pub mode: LoopMode,
    pub time: f32,
    pub layer: Layer,
    finished: bool,
    stopped: bool,
    hook: Option<FinishHook>,
}

impl AnimationAction {
    pub fn new(
        id: ActionId,
        clip: Arc<AnimationClip>,
        skeleton: &Skeleton,
        mode: LoopMode,
        layer: Layer,
    ) -> Self {
        let bindings = clip
            .tracks
            .iter()
            .map(|t| skeleton.index_of(&t.bone))
            .collect();
        Self {
            id,
            clip,
            bindings,
            weight: 0.0,
            fade: None,
            stop_after_fade: false,
            mode,
            time: 0.0,
            layer,
            finished: false,
            stopped: false,
            hook: None,
        }
    }

    pub fn bindings(&self) -> &[Option<usize>] {
        &self.bindings
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Weight the action is heading to (the fade target, or the current weight).
    pub fn target_weight(&self) -> f32 {
        self.fade.map(|f| f.to).unwrap_or(self.weight)
    }

    pub fn fade_to(&mut self, to: f32, duration: f32, stop_after: bool) {
        self.stop_after_fade = stop_after;
        if duration <= 0.0 {
            self.weight = to;
            self.fade = None;
            if stop_after {
                self.stopped = true;
            }
        } else {
            self.fade = Some(Fade::new(self.weight, to, duration));
        }
    }

    pub fn set_weight(&mut self, w: f32) {
        self.weight = w.clamp(0.0, 1.0);
        self.fade = None;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Attach a hook, returning any hook it replaces.
    pub fn set_hook(&mut self, hook: FinishHook) -> Option<FinishHook> {
        self.hook.replace(hook)
    }

    pub fn take_hook(&mut self) -> Option<FinishHook> {
        self.hook.take()
    }

    /// Advance fade and time. Returns true on the step the action finishes.
    pub fn advance(&mut self, dt: f32) -> bool {
        if let Some(fade) = self.fade.as_mut() {
            self.weight = fade.step(dt);
            if fade.is_done() {
                self.fade = None;
                if self.stop_after_fade {
                    self.stopped = true;
                }
            }
        }

        if self.finished {
            return false;
        }
        let duration = self.clip.duration;
        match self.mode {
            LoopMode::Repeat => {
                self.time = if duration > 0.0 {
                    fmod(self.time + dt, duration)
                } else {
                    0.0
                };
                false
            }
            LoopMode::OnceClamp => {
                self.time += dt;
                if self.time >= duration {
                    self.time = duration;
                    self.finished = true;
                    return true;
                }
                false
            }
        }
    }
}
