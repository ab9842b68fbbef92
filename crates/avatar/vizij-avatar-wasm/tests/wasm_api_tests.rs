#![cfg(target_arch = "wasm32")]
use js_sys::{Array, Function, Promise, Reflect, JSON};
use serde_wasm_bindgen as swb;
use vizij_avatar_core::{AvatarEvent, AvatarState, Outputs};
use vizij_avatar_wasm::{abi_version, VizijAvatar};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;
use wasm_bindgen_test::*;

const SKELETON: &str = include_str!("../../../../fixtures/skeletons/native_humanoid.json");
const IDLE: &str = include_str!("../../../../fixtures/clips/idle.json");
const WAVE: &str = include_str!("../../../../fixtures/clips/wave_prefixed.json");

wasm_bindgen_test_configure!(run_in_browser);

fn js_eval(body: &str) -> JsValue {
    Function::new_no_args(body).call0(&JsValue::NULL).unwrap()
}

fn parse(text: &str) -> JsValue {
    JSON::parse(text).unwrap()
}

fn audio_host() -> JsValue {
    js_eval(
        "return { t: 0, started: [], stopped: null,
            currentTime() { return this.t; },
            start(key, at, duration) { this.started.push(key); return 7; },
            stop(voice) { this.stopped = voice; } };",
    )
}

fn view_host() -> JsValue {
    js_eval(
        "return { p: [0, 1.6, 3], t: [0, 1.4, 0],
            c: { enable_pan: true, enable_rotate: true, enable_damping: true },
            cameraPosition() { return this.p; }, setCameraPosition(p) { this.p = p; },
            orbitTarget() { return this.t; }, setOrbitTarget(t) { this.t = t; },
            controls() { return this.c; }, setControls(c) { this.c = c; } };",
    )
}

fn offline_loader() -> Function {
    Function::new_with_args("url", "return Promise.reject(new Error('offline: ' + url));")
}

fn avatar(audio: &JsValue) -> VizijAvatar {
    let config = parse(r#"{ "blink": { "enabled": false }, "gaze": { "enabled": false } }"#);
    VizijAvatar::new(config, audio.clone(), view_host(), offline_loader()).unwrap()
}

fn tick(avatar: &mut VizijAvatar, dt: f32) -> Outputs {
    swb::from_value(avatar.tick(dt).unwrap()).unwrap()
}

async fn next_macrotask() {
    let p: Promise = js_eval("return new Promise(r => setTimeout(r, 0));").into();
    JsFuture::from(p).await.unwrap();
}

#[wasm_bindgen_test]
fn abi_is_1() {
    assert_eq!(abi_version(), 1);
}

#[wasm_bindgen_test]
fn construct_with_defaults() {
    let eng = VizijAvatar::new(
        JsValue::UNDEFINED,
        audio_host(),
        view_host(),
        offline_loader(),
    );
    assert!(eng.is_ok());
}

/// it should refuse to run without audio and view hosts
#[wasm_bindgen_test]
fn construct_requires_hosts() {
    let eng = VizijAvatar::new(JsValue::NULL, JsValue::NULL, view_host(), offline_loader());
    assert!(eng.is_err());
}

#[wasm_bindgen_test]
fn malformed_config_is_rejected() {
    let eng = VizijAvatar::new(
        JsValue::from_str("{ not json"),
        audio_host(),
        view_host(),
        offline_loader(),
    );
    assert!(eng.is_err());
}

#[wasm_bindgen_test]
fn skeleton_and_idle_clip_produce_a_pose() {
    let mut eng = avatar(&audio_host());
    eng.set_skeleton(parse(SKELETON)).unwrap();
    eng.add_clip("idle".into(), parse(IDLE), JsValue::UNDEFINED)
        .unwrap();

    let out = tick(&mut eng, 1.0 / 60.0);
    assert_eq!(out.state, AvatarState::Idle);
    assert!(out.joint("Head").is_some());
    assert!(out.joint("Spine").is_some());
}

/// it should retarget a vendor-prefixed clip and report the dropped root translation
#[wasm_bindgen_test]
fn prefixed_clip_reports_retarget() {
    let mut eng = avatar(&audio_host());
    let report = eng
        .add_clip("wave".into(), parse(WAVE), JsValue::from_str("prefixed"))
        .unwrap();
    let report: serde_json::Value = swb::from_value(report).unwrap();
    assert_eq!(report["dropped_root_translation"].as_f64(), Some(1.0));
}

#[wasm_bindgen_test]
fn unknown_convention_is_an_error() {
    let mut eng = avatar(&audio_host());
    let res = eng.add_clip("wave".into(), parse(WAVE), JsValue::from_str("blender"));
    assert!(res.is_err());
}

#[wasm_bindgen_test]
fn speak_starts_audio_on_host() {
    let audio = audio_host();
    let mut eng = avatar(&audio);
    let request = parse(
        r#"{ "audio": { "key": "utt-1", "duration": 1.0 },
             "cues": [{ "onset": 0.0, "viseme": "viseme_aa", "jaw": 0.5 }] }"#,
    );
    let id = eng.speak(request).unwrap();

    let started: Array = Reflect::get(&audio, &"started".into()).unwrap().into();
    assert_eq!(started.length(), 1);
    assert_eq!(started.get(0).as_string().as_deref(), Some("utt-1"));

    let out = tick(&mut eng, 1.0 / 60.0);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, AvatarEvent::SpeechStarted { utterance } if utterance.0 == id)));

    eng.stop_speech();
    let stopped = Reflect::get(&audio, &"stopped".into()).unwrap();
    assert_eq!(stopped.as_f64(), Some(7.0));
}

/// it should surface a rejected clip fetch as a load failure event
#[wasm_bindgen_test]
async fn rejected_fetch_reports_load_failed() {
    let mut eng = avatar(&audio_host());
    eng.set_skeleton(parse(SKELETON)).unwrap();
    eng.play_gestures(parse(r#"["clips/missing.json"]"#)).unwrap();

    let mut events = Vec::new();
    for _ in 0..10 {
        events.extend(tick(&mut eng, 0.05).events);
        next_macrotask().await;
    }
    assert!(events.iter().any(
        |e| matches!(e, AvatarEvent::LoadFailed { url, .. } if url == "clips/missing.json")
    ));
}

#[wasm_bindgen_test]
fn reply_without_audio_returns_null() {
    let mut eng = avatar(&audio_host());
    let res = eng
        .apply_reply(parse(r#"{ "text": "hi", "emotion": "happy" }"#))
        .unwrap();
    assert!(res.is_null());
}
