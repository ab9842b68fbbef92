//! Gesture overlays: a queue of one-shot clips played one at a time on top of
//! the primary layer without changing the primary state.
//!
//! Per item: wait for the skeleton (bounded), load, fade the primary gain
//! down while the gesture fades in; on finish fade it out, bring the gain
//! back up, and start the next item once the fade has settled.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::action::{FinishHook, Layer, LoopMode};
use crate::assets::{ClipRef, PendingClip};
use crate::ids::ActionId;
use crate::mixer::Mixer;
use crate::outputs::AvatarEvent;
use crate::readiness::{ReadinessWait, WaitStatus};
use crate::retarget::retarget;
use crate::state::{request_clip, ClipLibrary, LayerEnv};

#[derive(Debug)]
struct ActiveGesture {
    clip: ClipRef,
    wait: ReadinessWait,
    pending: Option<PendingClip>,
    action: Option<ActionId>,
}

#[derive(Debug, Default)]
pub struct GestureQueue {
    queue: VecDeque<ClipRef>,
    current: Option<ActiveGesture>,
    settle: f32,
}

impl GestureQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, refs: impl IntoIterator<Item = ClipRef>) {
        self.queue.extend(refs);
    }

    /// Items waiting behind the current one.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.queue.is_empty()
    }

    pub fn current_action(&self) -> Option<ActionId> {
        self.current.as_ref().and_then(|g| g.action)
    }

    /// Drop the queue and the in-flight gesture, restoring the primary gain.
    pub fn cancel(&mut self, mixer: &mut Mixer, env: &mut LayerEnv<'_>, reason: &str) {
        if let Some(g) = self.current.take() {
            if let Some(id) = g.action {
                mixer.take_hook(id);
                mixer.fade_out(id, env.cfg.fades.crossfade_secs, true);
            }
            env.events.push(AvatarEvent::GestureAborted {
                url: g.clip.url().to_string(),
                reason: reason.to_string(),
            });
        }
        for clip in self.queue.drain(..) {
            env.events.push(AvatarEvent::GestureAborted {
                url: clip.url().to_string(),
                reason: reason.to_string(),
            });
        }
        mixer.fade_primary_gain(1.0, env.cfg.fades.crossfade_secs);
        self.settle = 0.0;
    }

    pub fn tick(
        &mut self,
        dt: f32,
        mixer: &mut Mixer,
        library: &ClipLibrary,
        env: &mut LayerEnv<'_>,
    ) {
        if self.settle > 0.0 {
            self.settle -= dt;
            if self.settle > 0.0 {
                return;
            }
        }
        if self.current.is_none() {
            let Some(clip) = self.queue.pop_front() else {
                return;
            };
            debug!("gesture: preparing '{}'", clip.url());
            self.current = Some(ActiveGesture {
                clip,
                wait: ReadinessWait::new(&env.cfg.readiness),
                pending: None,
                action: None,
            });
        }
        let Some(g) = self.current.as_mut() else {
            return;
        };
        if g.action.is_some() {
            return;
        }

        if g.pending.is_none() {
            let has_skeleton = env.skeleton.is_some();
            match g.wait.poll(dt, || has_skeleton) {
                WaitStatus::Ready => {
                    g.pending = Some(request_clip(library, env.assets, &g.clip));
                }
                WaitStatus::Pending => return,
                WaitStatus::TimedOut => {
                    let url = g.clip.url().to_string();
                    warn!("gesture: skeleton not ready after {:.2}s, dropping '{url}'", g.wait.waited());
                    env.events.push(AvatarEvent::ReadinessTimeout {
                        what: "skeleton".into(),
                        waited_secs: g.wait.waited(),
                    });
                    env.events.push(AvatarEvent::GestureAborted {
                        url,
                        reason: g.wait.timeout_error("skeleton").to_string(),
                    });
                    self.current = None;
                    return;
                }
            }
        }

        let Some(pending) = g.pending.as_mut() else {
            return;
        };
        match pending.poll(env.assets) {
            None => {}
            Some(Err(error)) => {
                let url = g.clip.url().to_string();
                env.events.push(AvatarEvent::GestureAborted {
                    url: url.clone(),
                    reason: error.to_string(),
                });
                env.events.push(AvatarEvent::LoadFailed { url, error });
                self.current = None;
            }
            Some(Ok(source)) => {
                g.pending = None;
                let Some(skeleton) = env.skeleton.as_deref() else {
                    return;
                };
                let clip = Arc::new(retarget(&source.clip, source.convention));
                let fade = env.cfg.fades.crossfade_secs;
                let id = mixer.bind(clip, skeleton, LoopMode::OnceClamp, Layer::Gesture);
                mixer.fade_in(id, fade);
                mixer.set_hook(id, FinishHook::GestureComplete);
                mixer.fade_primary_gain(env.cfg.gesture.primary_weight, fade);
                g.action = Some(id);
                info!("gesture: playing '{}'", g.clip.url());
                env.events.push(AvatarEvent::GestureStarted {
                    url: g.clip.url().to_string(),
                });
            }
        }
    }

    /// Handle a GestureComplete hook. Returns false for unknown actions.
    pub fn on_finished(&mut self, action: ActionId, mixer: &mut Mixer, env: &mut LayerEnv<'_>) -> bool {
        let matches = self
            .current
            .as_ref()
            .map_or(false, |g| g.action == Some(action));
        if !matches {
            return false;
        }
        let fade = env.cfg.fades.crossfade_secs;
        mixer.fade_out(action, fade, true);
        mixer.fade_primary_gain(1.0, fade);
        if let Some(g) = self.current.take() {
            env.events.push(AvatarEvent::GestureFinished {
                url: g.clip.url().to_string(),
            });
        }
        self.settle = fade;
        true
    }
}
