//! Animation layer state machine.
//!
//! A base role (intro, idle, playlist, talking) plus at most one modal
//! overlay (typing or locomotion). Overlays suspend base transitions; the
//! gesture queue plays on top of whichever base role is active.
//!
//! Transitions happen in `tick` (driven by the speech flag and finish hooks)
//! or through the entry points the engine forwards (`set_typing`,
//! `play_locomotion`, `play_gestures`, `advance_playlist`).

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::action::{FinishHook, Layer, LoopMode};
use crate::assets::{AssetCache, ClipRef, PendingClip};
use crate::clip::AnimationClip;
use crate::config::AvatarConfig;
use crate::gesture::GestureQueue;
use crate::ids::ActionId;
use crate::mixer::Mixer;
use crate::outputs::AvatarEvent;
use crate::readiness::{ReadinessWait, WaitStatus};
use crate::retarget::{retarget, SkeletonConvention, SourceClip};
use crate::skeleton::{JointTransform, Skeleton};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvatarState {
    Intro,
    #[default]
    Idle,
    PlaylistCycling,
    Typing,
    Talking,
    Locomotion,
}

/// Camera work requested by the state machine, performed by the engine
/// against the view host in request order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CameraCue {
    Begin,
    End,
}

/// Engine-owned state the layer machine reads and writes during a call.
pub struct LayerEnv<'a> {
    pub cfg: &'a AvatarConfig,
    pub skeleton: Option<&'a mut Skeleton>,
    pub model_root: &'a mut JointTransform,
    pub assets: &'a mut AssetCache,
    pub events: &'a mut Vec<AvatarEvent>,
    pub camera: &'a mut Vec<CameraCue>,
}

/// Retargeted clips registered by name. Remembers insertion order so the
/// most recently added of several candidates can be picked.
#[derive(Debug, Default)]
pub struct ClipLibrary {
    clips: HashMap<String, (u64, Arc<AnimationClip>)>,
    next: u64,
}

impl ClipLibrary {
    pub fn insert(&mut self, name: impl Into<String>, clip: Arc<AnimationClip>) {
        self.clips.insert(name.into(), (self.next, clip));
        self.next += 1;
    }

    pub fn get(&self, name: &str) -> Option<Arc<AnimationClip>> {
        self.clips.get(name).map(|(_, c)| c.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// The most recently inserted clip among `names`.
    pub fn most_recent<S: AsRef<str>>(&self, names: &[S]) -> Option<Arc<AnimationClip>> {
        names
            .iter()
            .filter_map(|n| self.clips.get(n.as_ref()))
            .max_by_key(|(order, _)| *order)
            .map(|(_, c)| c.clone())
    }
}

/// Library clips are already in target space; anything else goes through the cache.
pub fn request_clip(library: &ClipLibrary, assets: &mut AssetCache, clip: &ClipRef) -> PendingClip {
    match library.get(clip.url()) {
        Some(found) => PendingClip::resolved(
            clip.url(),
            SourceClip {
                clip: found,
                convention: SkeletonConvention::Native,
            },
        ),
        None => assets.request(clip),
    }
}

fn is_asset_ref(candidate: &str) -> bool {
    candidate.contains('/') || candidate.ends_with(".json")
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BaseState {
    Intro,
    Idle,
    Playlist,
    Talking,
}

#[derive(Debug, Default)]
struct Slots {
    intro: Option<ActionId>,
    idle: Option<ActionId>,
    playlist: Option<ActionId>,
    talking: Option<ActionId>,
}

impl Slots {
    fn prune(&mut self, mixer: &Mixer) {
        for slot in [
            &mut self.intro,
            &mut self.idle,
            &mut self.playlist,
            &mut self.talking,
        ] {
            if slot.is_some_and(|id| !mixer.contains(id)) {
                *slot = None;
            }
        }
    }
}

#[derive(Debug)]
struct TypingOverlay {
    candidates: VecDeque<String>,
    pending: Option<PendingClip>,
    action: Option<ActionId>,
    pose_time: f32,
    inactive_for: f32,
    frozen: Vec<(usize, [f32; 4])>,
    captured: bool,
}

#[derive(Debug)]
struct LocomotionOverlay {
    clip: ClipRef,
    wait: ReadinessWait,
    pending: Option<PendingClip>,
    action: Option<ActionId>,
    /// Seconds left in the closing fade once the clip completed.
    finishing: Option<f32>,
    root_snapshot: JointTransform,
}

#[derive(Debug)]
enum Overlay {
    None,
    Typing(TypingOverlay),
    Locomotion(LocomotionOverlay),
}

/// Outcome of one typing resolution step.
enum TypingStep {
    Waiting,
    Bind(Arc<AnimationClip>),
    Exhausted,
}

#[derive(Debug)]
pub struct AnimationLayers {
    mixer: Mixer,
    library: ClipLibrary,
    base: BaseState,
    overlay: Overlay,
    slots: Slots,
    intro_played: bool,
    /// Bounds how long a configured intro may stay unregistered.
    intro_wait: ReadinessWait,
    playlist_index: Option<usize>,
    gestures: GestureQueue,
}

impl AnimationLayers {
    pub fn new(cfg: &AvatarConfig) -> Self {
        Self {
            mixer: Mixer::new(),
            library: ClipLibrary::default(),
            base: if cfg.rig.intro.is_some() {
                BaseState::Intro
            } else {
                BaseState::Idle
            },
            overlay: Overlay::None,
            slots: Slots::default(),
            intro_played: false,
            intro_wait: ReadinessWait::new(&cfg.readiness),
            playlist_index: None,
            gestures: GestureQueue::new(),
        }
    }

    pub fn state(&self) -> AvatarState {
        match self.overlay {
            Overlay::Typing(_) => AvatarState::Typing,
            Overlay::Locomotion(_) => AvatarState::Locomotion,
            Overlay::None => match self.base {
                BaseState::Intro => AvatarState::Intro,
                BaseState::Idle => AvatarState::Idle,
                BaseState::Playlist => AvatarState::PlaylistCycling,
                BaseState::Talking => AvatarState::Talking,
            },
        }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn library(&self) -> &ClipLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut ClipLibrary {
        &mut self.library
    }

    pub fn gestures(&self) -> &GestureQueue {
        &self.gestures
    }

    pub fn is_locomotion(&self) -> bool {
        matches!(self.overlay, Overlay::Locomotion(_))
    }

    pub fn overlay_active(&self) -> bool {
        !matches!(self.overlay, Overlay::None)
    }

    pub fn playlist_index(&self) -> Option<usize> {
        self.playlist_index
    }

    /// Joints currently held by the typing freeze.
    pub fn frozen_joints(&self) -> &[(usize, [f32; 4])] {
        match &self.overlay {
            Overlay::Typing(t) => &t.frozen,
            _ => &[],
        }
    }

    // -------------------------------------------------------------------------
    // Base roles
    // -------------------------------------------------------------------------

    /// Fade out every base action not belonging to `keep`. Idle stays bound
    /// at weight 0 so it can come back without restarting; the others stop.
    /// Hooks are detached so a fading one-shot cannot trigger a transition.
    fn retire(&mut self, keep: Option<BaseState>, duration: f32) {
        if keep != Some(BaseState::Idle) {
            if let Some(id) = self.slots.idle {
                self.mixer.fade_out(id, duration, false);
            }
        }
        let stop = |slot: &mut Option<ActionId>, mixer: &mut Mixer| {
            if let Some(id) = slot.take() {
                mixer.take_hook(id);
                mixer.fade_out(id, duration, true);
            }
        };
        if keep != Some(BaseState::Intro) {
            stop(&mut self.slots.intro, &mut self.mixer);
        }
        if keep != Some(BaseState::Playlist) {
            stop(&mut self.slots.playlist, &mut self.mixer);
        }
        if keep != Some(BaseState::Talking) {
            stop(&mut self.slots.talking, &mut self.mixer);
        }
    }

    /// Bind (or fade back in) the action for the current base role.
    fn ensure_base(&mut self, env: &mut LayerEnv<'_>, fade: f32) {
        self.slots.prune(&self.mixer);
        let Some(skeleton) = env.skeleton.as_deref() else {
            return;
        };
        let rig = &env.cfg.rig;
        match self.base {
            BaseState::Intro => {
                if self.slots.intro.is_some() {
                    return;
                }
                if self.intro_played || rig.intro.is_none() {
                    debug!("layers: no intro to play, continuing with idle");
                    self.base = BaseState::Idle;
                    self.ensure_base(env, fade);
                    return;
                }
                // Not registered yet: stay in Intro, `wait_for_intro` bounds it.
                let Some(clip) = rig.intro.as_deref().and_then(|n| self.library.get(n)) else {
                    return;
                };
                let id = self
                    .mixer
                    .bind(clip, skeleton, LoopMode::OnceClamp, Layer::Primary);
                self.mixer.set_weight(id, 1.0);
                self.mixer.set_hook(id, FinishHook::IntroComplete);
                self.slots.intro = Some(id);
                self.intro_played = true;
                info!("layers: intro started");
            }
            BaseState::Idle => match self.slots.idle {
                Some(id) => {
                    if self.mixer.action(id).is_some_and(|a| a.target_weight() < 1.0) {
                        self.mixer.fade_in(id, fade);
                    }
                }
                None => {
                    let Some(clip) = rig.idle.as_deref().and_then(|n| self.library.get(n)) else {
                        return;
                    };
                    let id = self
                        .mixer
                        .bind(clip, skeleton, LoopMode::Repeat, Layer::Primary);
                    self.mixer.fade_in(id, fade);
                    self.slots.idle = Some(id);
                }
            },
            BaseState::Playlist => {
                if self.slots.playlist.is_some() {
                    return;
                }
                let index = self.playlist_index.unwrap_or(0);
                let clip = rig.playlist.get(index).and_then(|n| self.library.get(n));
                match clip {
                    Some(clip) => {
                        let id = self
                            .mixer
                            .bind(clip, skeleton, LoopMode::OnceClamp, Layer::Primary);
                        self.mixer.fade_in(id, fade);
                        self.mixer.set_hook(id, FinishHook::PlaylistItemComplete);
                        self.slots.playlist = Some(id);
                        self.playlist_index = Some(index);
                    }
                    None => {
                        warn!("layers: playlist item {index} is not in the clip library");
                        self.base = BaseState::Idle;
                        self.ensure_base(env, fade);
                    }
                }
            }
            BaseState::Talking => {
                if self.slots.talking.is_some() {
                    return;
                }
                if let Some(clip) = self.library.most_recent(rig.talking.as_slice()) {
                    let id = self
                        .mixer
                        .bind(clip, skeleton, LoopMode::Repeat, Layer::Primary);
                    self.mixer.fade_in(id, fade);
                    self.slots.talking = Some(id);
                }
            }
        }
    }

    /// Give up on an intro clip that never gets registered.
    fn wait_for_intro(&mut self, dt: f32, env: &mut LayerEnv<'_>) {
        if self.base != BaseState::Intro || self.intro_played || self.slots.intro.is_some() {
            return;
        }
        if env.skeleton.is_none() {
            return;
        }
        let Some(name) = env.cfg.rig.intro.as_deref() else {
            return;
        };
        let library = &self.library;
        if self.intro_wait.poll(dt, || library.contains(name)) == WaitStatus::TimedOut {
            let waited = self.intro_wait.waited();
            warn!("layers: intro '{name}' not registered after {waited:.2}s, continuing with idle");
            env.events.push(AvatarEvent::ReadinessTimeout {
                what: format!("intro '{name}'"),
                waited_secs: waited,
            });
            self.intro_played = true;
        }
    }

    fn enter_talking(&mut self, env: &mut LayerEnv<'_>) {
        let fade = env.cfg.fades.crossfade_secs;
        info!("layers: talking");
        // Without a talking clip the current base action keeps playing.
        if self
            .library
            .most_recent(env.cfg.rig.talking.as_slice())
            .is_some()
        {
            self.retire(Some(BaseState::Talking), fade);
        }
        self.base = BaseState::Talking;
        self.ensure_base(env, fade);
    }

    fn leave_talking(&mut self, env: &mut LayerEnv<'_>) {
        let fade = env.cfg.fades.crossfade_secs;
        self.base = if env.cfg.rig.playlist.is_empty() {
            BaseState::Idle
        } else {
            BaseState::Playlist
        };
        info!("layers: talking finished, resuming {:?}", self.base);
        self.retire(Some(self.base), fade);
        self.ensure_base(env, fade);
    }

    /// Move to the next playlist item (wrapping). While talking only the
    /// index advances; overlays ignore the request.
    pub fn advance_playlist(&mut self, env: &mut LayerEnv<'_>) {
        let len = env.cfg.rig.playlist.len();
        if len == 0 {
            debug!("layers: advance_playlist with an empty playlist");
            return;
        }
        if self.overlay_active() {
            debug!("layers: advance_playlist ignored during {:?}", self.state());
            return;
        }
        let next = self.playlist_index.map_or(0, |i| (i + 1) % len);
        self.playlist_index = Some(next);
        if self.base == BaseState::Talking {
            return;
        }
        let fade = env.cfg.fades.crossfade_secs;
        if let Some(id) = self.slots.playlist.take() {
            self.mixer.take_hook(id);
            self.mixer.fade_out(id, fade, true);
        }
        self.retire(Some(BaseState::Playlist), fade);
        self.base = BaseState::Playlist;
        self.ensure_base(env, fade);
    }

    // -------------------------------------------------------------------------
    // Typing overlay
    // -------------------------------------------------------------------------

    pub fn set_typing(&mut self, on: bool, env: &mut LayerEnv<'_>) {
        if self.is_locomotion() {
            debug!("layers: typing request ignored during locomotion");
            return;
        }
        let typing = matches!(self.overlay, Overlay::Typing(_));
        match (typing, on) {
            (true, true) => {
                if let Overlay::Typing(t) = &mut self.overlay {
                    t.inactive_for = 0.0;
                }
            }
            (true, false) => self.release_typing(env),
            (false, true) => {
                info!("layers: typing started");
                self.overlay = Overlay::Typing(TypingOverlay {
                    candidates: env.cfg.typing.clip_candidates.iter().cloned().collect(),
                    pending: None,
                    action: None,
                    pose_time: 0.0,
                    inactive_for: 0.0,
                    frozen: Vec::new(),
                    captured: false,
                });
            }
            (false, false) => {}
        }
    }

    fn release_typing(&mut self, env: &mut LayerEnv<'_>) {
        if let Overlay::Typing(t) = std::mem::replace(&mut self.overlay, Overlay::None) {
            if let Some(id) = t.action {
                self.mixer.fade_out(id, env.cfg.fades.crossfade_secs, true);
            }
            info!("layers: typing released");
        }
    }

    fn resolve_typing(&mut self, env: &mut LayerEnv<'_>) -> TypingStep {
        let Overlay::Typing(t) = &mut self.overlay else {
            return TypingStep::Waiting;
        };
        loop {
            if let Some(pending) = t.pending.as_mut() {
                match pending.poll(env.assets) {
                    None => return TypingStep::Waiting,
                    Some(Ok(source)) => {
                        t.pending = None;
                        return TypingStep::Bind(Arc::new(retarget(
                            &source.clip,
                            source.convention,
                        )));
                    }
                    Some(Err(error)) => {
                        let url = pending.url().to_string();
                        debug!("layers: typing candidate '{url}' failed, trying next");
                        env.events.push(AvatarEvent::LoadFailed { url, error });
                        t.pending = None;
                    }
                }
            }
            let Some(candidate) = t.candidates.pop_front() else {
                return TypingStep::Exhausted;
            };
            if let Some(clip) = self.library.get(&candidate) {
                return TypingStep::Bind(clip);
            }
            if is_asset_ref(&candidate) {
                t.pending = Some(env.assets.request(&ClipRef::Url(candidate)));
            } else {
                debug!("layers: typing candidate '{candidate}' is not a known clip");
            }
        }
    }

    fn tick_typing(&mut self, dt: f32, env: &mut LayerEnv<'_>) {
        let timeout = env.cfg.typing.release_timeout_secs;
        let freeze_delay = env.cfg.typing.freeze_delay_secs;
        let fade = env.cfg.fades.crossfade_secs;

        let needs_pose = match &mut self.overlay {
            Overlay::Typing(t) => {
                t.inactive_for += dt;
                if t.inactive_for >= timeout {
                    info!("layers: typing idle for {timeout}s, releasing");
                    self.release_typing(env);
                    return;
                }
                t.action.is_none()
            }
            _ => return,
        };

        if needs_pose {
            if env.skeleton.is_none() {
                return;
            }
            match self.resolve_typing(env) {
                TypingStep::Waiting => return,
                TypingStep::Exhausted => {
                    warn!("layers: no typing pose could be loaded");
                    self.release_typing(env);
                    return;
                }
                TypingStep::Bind(clip) => {
                    let Some(skeleton) = env.skeleton.as_deref() else {
                        return;
                    };
                    let id = self
                        .mixer
                        .bind(clip, skeleton, LoopMode::OnceClamp, Layer::Primary);
                    self.mixer.fade_in(id, fade);
                    self.retire(None, fade);
                    if let Overlay::Typing(t) = &mut self.overlay {
                        t.action = Some(id);
                    }
                }
            }
        }

        let Overlay::Typing(t) = &mut self.overlay else {
            return;
        };
        t.pose_time += dt;
        if !t.captured && t.pose_time >= freeze_delay {
            if let Some(skeleton) = env.skeleton.as_deref() {
                t.frozen = env
                    .cfg
                    .typing
                    .frozen_joints
                    .iter()
                    .filter_map(|name| skeleton.index_of(name))
                    .map(|idx| (idx, skeleton.pose(idx).rotation))
                    .collect();
                t.captured = true;
                debug!("layers: typing freeze holds {} joints", t.frozen.len());
            }
        }
    }

    /// Overwrite frozen joint rotations; runs after all other pose writers.
    pub fn apply_freeze(&self, skeleton: &mut Skeleton) {
        for &(idx, rotation) in self.frozen_joints() {
            if idx < skeleton.len() {
                skeleton.pose_mut(idx).rotation = rotation;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Locomotion overlay
    // -------------------------------------------------------------------------

    pub fn play_locomotion(&mut self, clip: ClipRef, env: &mut LayerEnv<'_>) {
        let url = clip.url().to_string();
        if let Overlay::Locomotion(current) = &mut self.overlay {
            if let Some(id) = current.action.take() {
                if let Some(hook) = self.mixer.take_hook(id) {
                    debug!("layers: detached {hook:?} from superseded locomotion");
                }
                self.mixer.stop(id);
            }
            env.events.push(AvatarEvent::LocomotionFinished {
                url: current.clip.url().to_string(),
                completed: false,
            });
            current.clip = clip;
            current.wait = ReadinessWait::new(&env.cfg.readiness);
            current.pending = None;
            current.finishing = None;
            info!("layers: locomotion replaced by '{url}'");
            env.events.push(AvatarEvent::LocomotionStarted { url });
            return;
        }

        if matches!(self.overlay, Overlay::Typing(_)) {
            self.overlay = Overlay::None;
        }
        self.gestures
            .cancel(&mut self.mixer, env, "locomotion started");
        self.mixer.stop_all();
        self.slots = Slots::default();
        if let Some(skeleton) = env.skeleton.as_deref_mut() {
            skeleton.reset_to_bind();
        }
        env.camera.push(CameraCue::Begin);
        self.overlay = Overlay::Locomotion(LocomotionOverlay {
            clip,
            wait: ReadinessWait::new(&env.cfg.readiness),
            pending: None,
            action: None,
            finishing: None,
            root_snapshot: *env.model_root,
        });
        info!("layers: locomotion '{url}' requested");
        env.events.push(AvatarEvent::LocomotionStarted { url });
    }

    fn tick_locomotion(&mut self, dt: f32, env: &mut LayerEnv<'_>) {
        let Overlay::Locomotion(l) = &mut self.overlay else {
            return;
        };
        if let Some(left) = l.finishing.as_mut() {
            *left -= dt;
            if *left <= 0.0 {
                self.finish_locomotion(env, true);
            }
            return;
        }
        if l.action.is_some() {
            return;
        }

        if l.pending.is_none() {
            let has_skeleton = env.skeleton.is_some();
            match l.wait.poll(dt, || has_skeleton) {
                WaitStatus::Ready => {
                    l.pending = Some(request_clip(&self.library, env.assets, &l.clip));
                }
                WaitStatus::Pending => return,
                WaitStatus::TimedOut => {
                    let waited = l.wait.waited();
                    warn!("layers: skeleton not ready after {waited:.2}s, aborting locomotion");
                    env.events.push(AvatarEvent::ReadinessTimeout {
                        what: "skeleton".into(),
                        waited_secs: waited,
                    });
                    self.finish_locomotion(env, false);
                    return;
                }
            }
        }

        let Some(pending) = l.pending.as_mut() else {
            return;
        };
        match pending.poll(env.assets) {
            None => {}
            Some(Err(error)) => {
                let url = l.clip.url().to_string();
                env.events.push(AvatarEvent::LoadFailed { url, error });
                self.finish_locomotion(env, false);
            }
            Some(Ok(source)) => {
                l.pending = None;
                let Some(skeleton) = env.skeleton.as_deref() else {
                    return;
                };
                let clip = Arc::new(retarget(&source.clip, source.convention));
                let id = self
                    .mixer
                    .bind(clip, skeleton, LoopMode::OnceClamp, Layer::Locomotion);
                self.mixer.fade_in(id, env.cfg.fades.locomotion_secs);
                if let Some(previous) = self.mixer.set_hook(id, FinishHook::LocomotionComplete) {
                    debug!("layers: replaced hook {previous:?}");
                }
                l.action = Some(id);
                debug!("layers: locomotion '{}' bound", l.clip.url());
            }
        }
    }

    /// Restore bind pose, model root and camera, then fade idle back in.
    fn finish_locomotion(&mut self, env: &mut LayerEnv<'_>, completed: bool) {
        let Overlay::Locomotion(l) = std::mem::replace(&mut self.overlay, Overlay::None) else {
            return;
        };
        if let Some(id) = l.action {
            self.mixer.take_hook(id);
            self.mixer.stop(id);
        }
        if let Some(skeleton) = env.skeleton.as_deref_mut() {
            skeleton.reset_to_bind();
        }
        *env.model_root = l.root_snapshot;
        env.camera.push(CameraCue::End);
        self.base = BaseState::Idle;
        let fade = env.cfg.fades.crossfade_secs;
        self.ensure_base(env, fade);
        info!(
            "layers: locomotion '{}' {}",
            l.clip.url(),
            if completed { "completed" } else { "aborted" }
        );
        env.events.push(AvatarEvent::LocomotionFinished {
            url: l.clip.url().to_string(),
            completed,
        });
    }

    // -------------------------------------------------------------------------
    // Gestures
    // -------------------------------------------------------------------------

    pub fn play_gestures(&mut self, refs: Vec<ClipRef>, env: &mut LayerEnv<'_>) {
        if self.is_locomotion() {
            for clip in refs {
                env.events.push(AvatarEvent::GestureAborted {
                    url: clip.url().to_string(),
                    reason: "locomotion active".into(),
                });
            }
            return;
        }
        self.gestures.enqueue(refs);
    }

    pub fn cancel_gestures(&mut self, env: &mut LayerEnv<'_>) {
        self.gestures.cancel(&mut self.mixer, env, "cancelled");
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// All bindings are invalid after the skeleton changes; start over from
    /// the base role.
    pub fn on_skeleton_replaced(&mut self, env: &mut LayerEnv<'_>) {
        match self.overlay {
            Overlay::Locomotion(_) => self.finish_locomotion(env, false),
            Overlay::Typing(_) => self.overlay = Overlay::None,
            Overlay::None => {}
        }
        self.gestures.cancel(&mut self.mixer, env, "skeleton replaced");
        self.mixer.stop_all();
        self.slots = Slots::default();
        self.ensure_base(env, 0.0);
    }

    fn on_hook(&mut self, action: ActionId, hook: FinishHook, env: &mut LayerEnv<'_>) {
        match hook {
            FinishHook::IntroComplete => {
                if self.slots.intro == Some(action) && !self.overlay_active() {
                    let fade = env.cfg.fades.intro_secs;
                    info!("layers: intro complete");
                    self.base = BaseState::Idle;
                    self.retire(Some(BaseState::Idle), fade);
                    self.ensure_base(env, fade);
                }
            }
            FinishHook::PlaylistItemComplete => {
                if self.slots.playlist == Some(action) && env.cfg.rig.playlist_auto_advance {
                    self.advance_playlist(env);
                }
            }
            FinishHook::GestureComplete => {
                self.gestures.on_finished(action, &mut self.mixer, env);
            }
            FinishHook::LocomotionComplete => {
                let fade = env.cfg.fades.locomotion_secs;
                if let Overlay::Locomotion(l) = &mut self.overlay {
                    if l.action == Some(action) && l.finishing.is_none() {
                        self.mixer.fade_out(action, fade, false);
                        l.finishing = Some(fade);
                    }
                }
            }
        }
    }

    /// Advance one frame: mixer time and hooks, overlays, base transitions,
    /// then the gesture queue. `talking` is the scheduler's talking flag.
    pub fn tick(&mut self, dt: f32, talking: bool, env: &mut LayerEnv<'_>) {
        for finished in self.mixer.update(dt) {
            if let Some(hook) = finished.hook {
                self.on_hook(finished.action, hook, env);
            }
        }

        match self.overlay {
            Overlay::Typing(_) => self.tick_typing(dt, env),
            Overlay::Locomotion(_) => self.tick_locomotion(dt, env),
            Overlay::None => {}
        }

        if !self.overlay_active() {
            match (self.base, talking) {
                (BaseState::Talking, false) => self.leave_talking(env),
                (base, true) if base != BaseState::Talking => self.enter_talking(env),
                _ => {}
            }
            self.wait_for_intro(dt, env);
            let fade = env.cfg.fades.crossfade_secs;
            self.ensure_base(env, fade);
        }

        self.gestures.tick(dt, &mut self.mixer, &self.library, env);
    }
}
