#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use vizij_avatar_core::{
    parse_clip_json, parse_skeleton_json, AnimationClip, AssetLoader, AudioDevice, AvatarConfig,
    AvatarEngine, AvatarError, AvatarEvent, ControlSettings, Outputs, Skeleton,
    SkeletonConvention, SpeechAudio, ViewHost, VoiceId,
};

pub fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

pub fn skeleton() -> Skeleton {
    let json = vizij_test_fixtures::skeletons::json("native-humanoid").expect("skeleton fixture");
    parse_skeleton_json(&json).expect("parse skeleton fixture")
}

pub fn clip(name: &str) -> AnimationClip {
    let json = vizij_test_fixtures::clips::json(name).expect("clip fixture");
    parse_clip_json(&json).expect("parse clip fixture")
}

/// Config with the random face processes and breathing off, so poses and
/// weights are fully determined by the clips.
pub fn quiet_config() -> AvatarConfig {
    let mut cfg = AvatarConfig::default();
    cfg.blink.enabled = false;
    cfg.gaze.enabled = false;
    cfg.breathing.enabled = false;
    cfg
}

// -----------------------------------------------------------------------------
// Host doubles
// -----------------------------------------------------------------------------

/// Audio clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualAudio {
    pub now: f64,
    pub started: Vec<(VoiceId, String, f64)>,
    pub stopped: Vec<VoiceId>,
    pub reject: bool,
    pub next: u64,
}

impl ManualAudio {
    pub fn advance(&mut self, dt: f32) {
        self.now += dt as f64;
    }
}

impl AudioDevice for ManualAudio {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn start(&mut self, audio: &SpeechAudio, at: f64) -> Result<VoiceId, AvatarError> {
        if self.reject {
            return Err(AvatarError::Audio {
                reason: "device suspended".into(),
            });
        }
        self.next += 1;
        let voice = VoiceId(self.next);
        self.started.push((voice, audio.key.clone(), at));
        Ok(voice)
    }

    fn stop(&mut self, voice: VoiceId) {
        self.stopped.push(voice);
    }
}

#[derive(Debug)]
pub struct RecordingView {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub controls: ControlSettings,
}

impl Default for RecordingView {
    fn default() -> Self {
        Self {
            position: [0.0, 1.6, 3.0],
            target: [0.0, 1.4, 0.0],
            controls: ControlSettings::default(),
        }
    }
}

impl ViewHost for RecordingView {
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

/// Resolves immediately from an in-memory map of URL → bytes.
#[derive(Clone, Debug, Default)]
pub struct MapLoader {
    files: Rc<HashMap<String, Vec<u8>>>,
}

impl MapLoader {
    /// Every fixture clip, addressed by its manifest path (`clips/idle.json`).
    pub fn fixtures() -> Self {
        Self {
            files: Rc::new(vizij_test_fixtures::clips::by_url().expect("clip fixtures")),
        }
    }
}

impl AssetLoader for MapLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>> {
        let result = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| AvatarError::asset_load(url, "not found"));
        futures::future::ready(result).boxed_local()
    }
}

type Reply = oneshot::Sender<Result<Vec<u8>, AvatarError>>;

/// Holds every fetch open until the test answers it.
#[derive(Clone, Default)]
pub struct DeferredLoader {
    pending: Rc<RefCell<Vec<(String, Reply)>>>,
}

impl DeferredLoader {
    pub fn open_requests(&self) -> Vec<String> {
        self.pending.borrow().iter().map(|(u, _)| u.clone()).collect()
    }

    /// Answer the oldest open request for `url`.
    pub fn answer(&self, url: &str, result: Result<Vec<u8>, AvatarError>) {
        let mut pending = self.pending.borrow_mut();
        let idx = pending
            .iter()
            .position(|(u, _)| u == url)
            .expect("no open request for url");
        let (_, tx) = pending.remove(idx);
        let _ = tx.send(result);
    }
}

impl AssetLoader for DeferredLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.borrow_mut().push((url.to_string(), tx));
        let url = url.to_string();
        async move {
            rx.await
                .unwrap_or_else(|_| Err(AvatarError::asset_load(url, "request dropped")))
        }
        .boxed_local()
    }
}

// -----------------------------------------------------------------------------
// Engine harness
// -----------------------------------------------------------------------------

pub struct Rig {
    pub engine: AvatarEngine,
    pub audio: ManualAudio,
    pub view: RecordingView,
    /// Every event emitted since the harness was built.
    pub events: Vec<AvatarEvent>,
}

impl Rig {
    /// Register `clips` (library name, fixture name) in native convention,
    /// then install the fixture skeleton.
    pub fn new(cfg: AvatarConfig, clips: &[(&str, &str)]) -> Self {
        Self::with_loader(cfg, clips, Box::new(MapLoader::fixtures()))
    }

    pub fn with_loader(
        cfg: AvatarConfig,
        clips: &[(&str, &str)],
        loader: Box<dyn AssetLoader>,
    ) -> Self {
        let mut engine = AvatarEngine::new(cfg, loader).expect("engine");
        for (name, fixture) in clips {
            engine
                .add_clip(name, &clip(fixture), SkeletonConvention::Native)
                .expect("add clip");
        }
        engine.set_skeleton(skeleton());
        Self {
            engine,
            audio: ManualAudio::default(),
            view: RecordingView::default(),
            events: Vec::new(),
        }
    }

    /// One frame; the audio clock advances with the frame clock.
    pub fn tick(&mut self, dt: f32) -> Outputs {
        self.audio.advance(dt);
        let out = self
            .engine
            .tick(dt, &mut self.audio, &mut self.view)
            .clone();
        self.events.extend(out.events.iter().cloned());
        out
    }

    pub fn run(&mut self, dt: f32, frames: usize) -> Outputs {
        let mut last = Outputs::default();
        for _ in 0..frames {
            last = self.tick(dt);
        }
        last
    }

    pub fn count(&self, pred: impl Fn(&AvatarEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}
