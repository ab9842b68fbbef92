use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::{FutureExt, LocalBoxFuture};
use vizij_avatar_core::{
    parse_clip_json, parse_skeleton_json, retarget, AssetLoader, AudioDevice, AvatarConfig,
    AvatarEngine, AvatarError, ControlSettings, SkeletonConvention, SpeechAudio, SpeechRequest,
    ViewHost, VisemeCue, VoiceId,
};

struct Offline;

impl AssetLoader for Offline {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>> {
        futures::future::ready(Err(AvatarError::asset_load(url, "offline"))).boxed_local()
    }
}

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

struct View([f32; 3], [f32; 3], ControlSettings);

impl ViewHost for View {
    fn camera_position(&self) -> [f32; 3] {
        self.0
    }
    fn set_camera_position(&mut self, position: [f32; 3]) {
        self.0 = position;
    }
    fn orbit_target(&self) -> [f32; 3] {
        self.1
    }
    fn set_orbit_target(&mut self, target: [f32; 3]) {
        self.1 = target;
    }
    fn controls(&self) -> ControlSettings {
        self.2
    }
    fn set_controls(&mut self, controls: ControlSettings) {
        self.2 = controls;
    }
}

fn talking_engine() -> (AvatarEngine, Clock) {
    let mut engine =
        AvatarEngine::new(AvatarConfig::default(), Box::new(Offline)).expect("default config");
    for (name, fixture) in [("idle", "idle"), ("talking", "talking")] {
        let json = vizij_test_fixtures::clips::json(fixture).expect("clip fixture");
        let clip = parse_clip_json(&json).expect("parse clip");
        engine
            .add_clip(name, &clip, SkeletonConvention::Native)
            .expect("add clip");
    }
    let skel = vizij_test_fixtures::skeletons::json("native-humanoid").expect("skeleton fixture");
    engine.set_skeleton(parse_skeleton_json(&skel).expect("parse skeleton"));

    let mut clock = Clock(0.0);
    let cues = ["A", "B", "C", "D", "E", "F", "G", "H", "X"]
        .iter()
        .enumerate()
        .map(|(i, l)| VisemeCue::from_label(i as f64 * 0.1, l))
        .collect();
    engine
        .speak(
            SpeechRequest {
                audio: SpeechAudio {
                    key: "bench".into(),
                    duration: 1.0e6,
                },
                cues,
                emotion: Default::default(),
            },
            &mut clock,
        )
        .expect("speak");
    (engine, clock)
}

fn bench_tick(c: &mut Criterion) {
    let (mut engine, mut clock) = talking_engine();
    let mut view = View([0.0, 1.6, 3.0], [0.0, 1.4, 0.0], ControlSettings::default());
    c.bench_function("avatar_tick_talking", |b| {
        b.iter(|| {
            clock.0 += 1.0 / 60.0;
            let out = engine.tick(black_box(1.0 / 60.0), &mut clock, &mut view);
            black_box(out.joints.len());
        })
    });
}

fn bench_retarget(c: &mut Criterion) {
    let json = vizij_test_fixtures::clips::json("walk-mocap").expect("clip fixture");
    let clip = parse_clip_json(&json).expect("parse clip");
    c.bench_function("retarget_motion_capture", |b| {
        b.iter(|| retarget(black_box(&clip), SkeletonConvention::MotionCapture))
    });
}

criterion_group!(benches, bench_tick, bench_retarget);
criterion_main!(benches);
