//! AvatarEngine: data ownership and public API.
//!
//! Methods:
//! - new, set_skeleton, add_clip, set_model_root
//! - speak / stop_speech / apply_reply (audio-clock lip-sync)
//! - play_locomotion, set_typing, play_gestures, cancel_gestures, advance_playlist
//! - tick: speech → layers → camera cues → pose (bind → mixer → sway → freeze)
//!   → camera follow → face → outputs

use std::sync::Arc;

use log::{debug, info, warn};

use crate::assets::{AssetCache, AssetLoader, ClipRef};
use crate::blendshape::BlendshapeController;
use crate::camera::{LocomotionCamera, ViewHost};
use crate::clip::AnimationClip;
use crate::config::AvatarConfig;
use crate::emotion::Emotion;
use crate::error::AvatarError;
use crate::ids::{IdAllocator, UtteranceId};
use crate::outputs::{AvatarEvent, JointPose, MorphWeight, Outputs};
use crate::procedural::BreathingSway;
use crate::request::{BackendReply, SpeechRequest};
use crate::retarget::{retarget_with_report, RetargetReport, SkeletonConvention};
use crate::skeleton::{JointTransform, Skeleton};
use crate::speech::{AudioDevice, SpeechScheduler, SpeechSignal};
use crate::state::{AnimationLayers, AvatarState, CameraCue, LayerEnv};

/// Scene-side state the layer machine borrows during a call.
#[derive(Debug)]
struct Stage {
    skeleton: Option<Skeleton>,
    model_root: JointTransform,
    assets: AssetCache,
    events: Vec<AvatarEvent>,
    camera_cues: Vec<CameraCue>,
}

impl Stage {
    fn env<'a>(&'a mut self, cfg: &'a AvatarConfig) -> LayerEnv<'a> {
        LayerEnv {
            cfg,
            skeleton: self.skeleton.as_mut(),
            model_root: &mut self.model_root,
            assets: &mut self.assets,
            events: &mut self.events,
            camera: &mut self.camera_cues,
        }
    }
}

#[derive(Debug)]
pub struct AvatarEngine {
    cfg: AvatarConfig,
    ids: IdAllocator,
    stage: Stage,
    layers: AnimationLayers,
    speech: SpeechScheduler,
    face: BlendshapeController,
    camera: LocomotionCamera,
    breathing: BreathingSway,
    reported_state: Option<AvatarState>,
    outputs: Outputs,
}

impl AvatarEngine {
    /// Fails with `AvatarError::Config` when `cfg` does not validate.
    pub fn new(cfg: AvatarConfig, loader: Box<dyn AssetLoader>) -> Result<Self, AvatarError> {
        cfg.validate()?;
        let face = BlendshapeController::new(
            cfg.smoothing.clone(),
            cfg.blink.clone(),
            cfg.gaze.clone(),
            cfg.emotion.clone(),
            cfg.seed,
        );
        Ok(Self {
            ids: IdAllocator::new(),
            stage: Stage {
                skeleton: None,
                model_root: JointTransform::IDENTITY,
                assets: AssetCache::new(loader),
                events: Vec::new(),
                camera_cues: Vec::new(),
            },
            layers: AnimationLayers::new(&cfg),
            speech: SpeechScheduler::new(&cfg.speech),
            face,
            camera: LocomotionCamera::new(&cfg.locomotion),
            breathing: BreathingSway::new(),
            reported_state: None,
            outputs: Outputs::default(),
            cfg,
        })
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.cfg
    }

    // -------------------------------------------------------------------------
    // Rig setup
    // -------------------------------------------------------------------------

    /// Install (or replace) the target skeleton. Existing bindings restart
    /// from the base role.
    pub fn set_skeleton(&mut self, skeleton: Skeleton) {
        info!("engine: skeleton set ({} joints)", skeleton.len());
        self.stage.skeleton = Some(skeleton);
        let mut env = self.stage.env(&self.cfg);
        self.layers.on_skeleton_replaced(&mut env);
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.stage.skeleton.as_ref()
    }

    /// Retarget `clip` and register it under `name` (replacing any clip of that name).
    pub fn add_clip(
        &mut self,
        name: &str,
        clip: &AnimationClip,
        convention: SkeletonConvention,
    ) -> Result<RetargetReport, AvatarError> {
        clip.validate_basic()?;
        let (retargeted, report) = retarget_with_report(clip, convention);
        self.layers
            .library_mut()
            .insert(name, Arc::new(retargeted));
        Ok(report)
    }

    pub fn has_clip(&self, name: &str) -> bool {
        self.layers.library().contains(name)
    }

    pub fn model_root(&self) -> &JointTransform {
        &self.stage.model_root
    }

    pub fn set_model_root(&mut self, root: JointTransform) {
        self.stage.model_root = root;
    }

    // -------------------------------------------------------------------------
    // Speech
    // -------------------------------------------------------------------------

    /// Start an utterance, superseding any in flight.
    pub fn speak(
        &mut self,
        request: SpeechRequest,
        device: &mut dyn AudioDevice,
    ) -> Result<UtteranceId, AvatarError> {
        let id = self.ids.alloc_utterance();
        self.face.clear_speech_targets();
        let result = self.speech.speak(id, &request.audio, request.cues, device);
        self.drain_speech_signals();
        result?;
        self.face.set_emotion(request.emotion);
        Ok(id)
    }

    pub fn stop_speech(&mut self, device: &mut dyn AudioDevice) {
        self.speech.stop(device);
        self.face.clear_speech_targets();
        self.drain_speech_signals();
    }

    pub fn speech_active(&self) -> bool {
        self.speech.speech_active()
    }

    /// Apply a full backend reply: speech (when audio is present), emotion,
    /// gestures and locomotion. Only the first locomotion reference plays.
    pub fn apply_reply(
        &mut self,
        reply: BackendReply,
        device: &mut dyn AudioDevice,
    ) -> Result<Option<UtteranceId>, AvatarError> {
        let utterance = match reply.speech_request() {
            Some(request) => Some(self.speak(request, device)?),
            None => {
                self.face.set_emotion(reply.emotion());
                None
            }
        };
        if !reply.gestures.is_empty() {
            self.play_gestures(reply.gestures.clone());
        }
        if let Some(first) = reply.locomotion.first() {
            if reply.locomotion.len() > 1 {
                debug!(
                    "engine: {} locomotion refs received, playing the first",
                    reply.locomotion.len()
                );
            }
            self.play_locomotion(first.clone());
        }
        Ok(utterance)
    }

    fn drain_speech_signals(&mut self) {
        for signal in self.speech.drain_signals() {
            let event = match signal {
                SpeechSignal::Started(utterance) => AvatarEvent::SpeechStarted { utterance },
                SpeechSignal::AudioEnded(_) => {
                    self.face.clear_speech_targets();
                    continue;
                }
                SpeechSignal::Finished(utterance) => {
                    self.face.set_emotion(Emotion::Neutral);
                    AvatarEvent::SpeechFinished { utterance }
                }
                SpeechSignal::Superseded { old, by } => AvatarEvent::SpeechSuperseded {
                    utterance: old,
                    by,
                },
            };
            self.stage.events.push(event);
        }
    }

    // -------------------------------------------------------------------------
    // Layer entry points
    // -------------------------------------------------------------------------

    pub fn play_locomotion(&mut self, clip: ClipRef) {
        let mut env = self.stage.env(&self.cfg);
        self.layers.play_locomotion(clip, &mut env);
    }

    pub fn set_typing(&mut self, on: bool) {
        let mut env = self.stage.env(&self.cfg);
        self.layers.set_typing(on, &mut env);
    }

    pub fn play_gestures(&mut self, refs: Vec<ClipRef>) {
        let mut env = self.stage.env(&self.cfg);
        self.layers.play_gestures(refs, &mut env);
    }

    pub fn cancel_gestures(&mut self) {
        let mut env = self.stage.env(&self.cfg);
        self.layers.cancel_gestures(&mut env);
    }

    pub fn advance_playlist(&mut self) {
        let mut env = self.stage.env(&self.cfg);
        self.layers.advance_playlist(&mut env);
    }

    pub fn state(&self) -> AvatarState {
        self.layers.state()
    }

    pub fn layers(&self) -> &AnimationLayers {
        &self.layers
    }

    pub fn blendshape_weight(&self, key: &str) -> f32 {
        self.face.weight(key)
    }

    pub fn camera_following(&self) -> bool {
        self.camera.is_active()
    }

    /// Times the asset loader was invoked.
    pub fn asset_fetch_count(&self) -> usize {
        self.stage.assets.fetch_count()
    }

    // -------------------------------------------------------------------------
    // Frame
    // -------------------------------------------------------------------------

    /// Step the avatar by `dt` seconds and produce this frame's outputs.
    pub fn tick(
        &mut self,
        dt: f32,
        audio: &mut dyn AudioDevice,
        view: &mut dyn ViewHost,
    ) -> &Outputs {
        let dt = if dt.is_finite() {
            dt.clamp(0.0, self.cfg.max_dt)
        } else {
            warn!("engine: non-finite dt ignored");
            0.0
        };

        // 1) Speech: audio clock → face targets
        self.speech.update(dt, audio);
        self.drain_speech_signals();
        match self.speech.current_cue() {
            Some(cue) => {
                self.face.set_viseme(Some(&cue.viseme));
                self.face.set_jaw(cue.jaw);
            }
            None => self.face.clear_speech_targets(),
        }
        let talking = self.speech.drives_talking();

        // 2) Layers: hooks, overlays, base transitions, gestures
        {
            let mut env = self.stage.env(&self.cfg);
            self.layers.tick(dt, talking, &mut env);
        }

        // 3) Camera capture/restore requested by the layers
        for cue in std::mem::take(&mut self.stage.camera_cues) {
            match cue {
                CameraCue::Begin => self.camera.begin(view, self.stage.skeleton.as_ref()),
                CameraCue::End => self.camera.end(view),
            }
        }

        // 4-6) Pose: bind → mixer → breathing → typing freeze
        self.breathing.advance(dt);
        if let Some(skeleton) = self.stage.skeleton.as_mut() {
            skeleton.reset_to_bind();
            self.layers.mixer_mut().evaluate(skeleton);
            if self.cfg.breathing.enabled && !self.layers.is_locomotion() {
                self.breathing.apply(skeleton, &self.cfg.breathing);
            }
            self.layers.apply_freeze(skeleton);
        }

        // 7) Camera follow reads the final world transforms
        let camera = self
            .camera
            .follow(view, self.stage.skeleton.as_ref(), &self.stage.model_root);

        // 8) Face
        self.face
            .update(dt, talking, !self.layers.overlay_active());

        // 9) Outputs
        let state = self.layers.state();
        if self.reported_state != Some(state) {
            if let Some(from) = self.reported_state {
                self.stage
                    .events
                    .push(AvatarEvent::StateChanged { from, to: state });
            }
            self.reported_state = Some(state);
        }

        self.outputs.clear();
        if let Some(skeleton) = self.stage.skeleton.as_ref() {
            self.outputs
                .joints
                .extend(skeleton.joints().iter().enumerate().map(|(i, j)| JointPose {
                    name: j.name.clone(),
                    transform: *skeleton.pose(i),
                }));
        }
        self.outputs.morphs.extend(
            self.face
                .collect()
                .into_iter()
                .map(|(key, weight)| MorphWeight { key, weight }),
        );
        self.outputs.model_root = self.stage.model_root;
        self.outputs.camera = camera;
        self.outputs.state = state;
        self.outputs.events.append(&mut self.stage.events);
        &self.outputs
    }
}

#[cfg(test)]
mod tests {
    use futures::future::{FutureExt, LocalBoxFuture};

    use super::*;
    use crate::camera::ControlSettings;
    use crate::speech::{SpeechAudio, VoiceId};

    struct NoAssets;

    impl AssetLoader for NoAssets {
        fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>> {
            futures::future::ready(Err(AvatarError::asset_load(url, "offline"))).boxed_local()
        }
    }

    #[derive(Default)]
    struct Clock(f64);

    impl AudioDevice for Clock {
        fn current_time(&self) -> f64 {
            self.0
        }
        fn start(&mut self, _audio: &SpeechAudio, _at: f64) -> Result<VoiceId, AvatarError> {
            Ok(VoiceId(1))
        }
        fn stop(&mut self, _voice: VoiceId) {}
    }

    #[derive(Default)]
    struct View {
        position: [f32; 3],
        target: [f32; 3],
        controls: ControlSettings,
    }

    impl ViewHost for View {
        fn camera_position(&self) -> [f32; 3] {
            self.position
        }
        fn set_camera_position(&mut self, position: [f32; 3]) {
            self.position = position;
        }
        fn orbit_target(&self) -> [f32; 3] {
            self.target
        }
        fn set_orbit_target(&mut self, target: [f32; 3]) {
            self.target = target;
        }
        fn controls(&self) -> ControlSettings {
            self.controls
        }
        fn set_controls(&mut self, controls: ControlSettings) {
            self.controls = controls;
        }
    }

    fn offline_engine() -> AvatarEngine {
        AvatarEngine::new(AvatarConfig::default(), Box::new(NoAssets)).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = AvatarConfig::default();
        cfg.max_dt = 0.0;
        let err = AvatarEngine::new(cfg, Box::new(NoAssets)).err();
        assert!(matches!(err, Some(AvatarError::Config { .. })));
    }

    #[test]
    fn ticks_without_skeleton_or_clips() {
        let mut engine = offline_engine();
        let (mut clock, mut view) = (Clock::default(), View::default());
        let out = engine.tick(1.0 / 60.0, &mut clock, &mut view);
        assert!(out.joints.is_empty());
        assert_eq!(out.state, AvatarState::Idle);
        assert!(out.events.is_empty());
    }

    #[test]
    fn non_finite_and_huge_dt_are_tamed() {
        let mut engine = offline_engine();
        let (mut clock, mut view) = (Clock::default(), View::default());
        engine.tick(f32::NAN, &mut clock, &mut view);
        engine.tick(f32::INFINITY, &mut clock, &mut view);
        engine.tick(-1.0, &mut clock, &mut view);
        let out = engine.tick(1.0e6, &mut clock, &mut view);
        assert!(out.morphs.iter().all(|m| m.weight.is_finite()));
    }

    #[test]
    fn speak_and_stop_emit_lifecycle_events() {
        let mut engine = offline_engine();
        let (mut clock, mut view) = (Clock::default(), View::default());
        let request = SpeechRequest {
            audio: SpeechAudio {
                key: "hi".into(),
                duration: 1.0,
            },
            cues: Vec::new(),
            emotion: Emotion::Happy,
        };
        let id = engine.speak(request, &mut clock).unwrap();
        assert!(engine.speech_active());
        engine.stop_speech(&mut clock);
        let out = engine.tick(0.0, &mut clock, &mut view);
        assert_eq!(
            out.events,
            vec![
                AvatarEvent::SpeechStarted { utterance: id },
                AvatarEvent::SpeechFinished { utterance: id },
            ]
        );
        assert!(!engine.speech_active());
    }
}
