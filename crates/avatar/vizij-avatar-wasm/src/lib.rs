use futures::future::{FutureExt, LocalBoxFuture};
use js_sys::{Function, Promise, Reflect, JSON};
use serde::de::DeserializeOwned;
use serde_wasm_bindgen as swb;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

use vizij_avatar_core::{
    parse_clip_json, parse_skeleton_json, AssetLoader, AudioDevice, AvatarConfig, AvatarEngine,
    AvatarError, BackendReply, ClipRef, ControlSettings, JointTransform, Outputs,
    SkeletonConvention, SpeechAudio, SpeechRequest, ViewHost, VoiceId,
};

fn jsvalue_is_undefined_or_null(v: &JsValue) -> bool {
    v.is_undefined() || v.is_null()
}

fn js_error_text(v: &JsValue) -> String {
    v.as_string()
        .or_else(|| {
            Reflect::get(v, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{v:?}"))
}

/// JSON text of a JS value; the core parsers take `&str`.
fn stringify(value: &JsValue, ctx: &str) -> Result<String, JsError> {
    if let Some(s) = value.as_string() {
        return Ok(s);
    }
    JSON::stringify(value)
        .map_err(|e| JsError::new(&format!("{ctx} stringify error: {}", js_error_text(&e))))?
        .as_string()
        .ok_or_else(|| JsError::new(&format!("{ctx}: stringify produced non-string")))
}

fn from_js<T: DeserializeOwned>(value: JsValue, ctx: &str) -> Result<T, JsError> {
    swb::from_value(value).map_err(|e| JsError::new(&format!("{ctx} error: {e}")))
}

/// Look up `name` on a host object and call it with `this` bound to the object.
fn call_method(host: &JsValue, name: &str, args: &[JsValue]) -> Result<JsValue, JsValue> {
    let f: Function = Reflect::get(host, &JsValue::from_str(name))?
        .dyn_into()
        .map_err(|_| JsValue::from_str(&format!("host method '{name}' missing")))?;
    match args {
        [] => f.call0(host),
        [a] => f.call1(host, a),
        [a, b] => f.call2(host, a, b),
        [a, b, c] => f.call3(host, a, b, c),
        _ => Err(JsValue::from_str("too many arguments")),
    }
}

// -----------------------------------------------------------------------------
// Host adapters
// -----------------------------------------------------------------------------

/// `{ currentTime(): number, start(key, at, duration): number, stop(voice) }`,
/// typically backed by an `AudioContext`.
struct JsAudio {
    host: JsValue,
}

impl AudioDevice for JsAudio {
    fn current_time(&self) -> f64 {
        call_method(&self.host, "currentTime", &[])
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn start(&mut self, audio: &SpeechAudio, at: f64) -> Result<VoiceId, AvatarError> {
        let voice = call_method(
            &self.host,
            "start",
            &[
                JsValue::from_str(&audio.key),
                JsValue::from_f64(at),
                JsValue::from_f64(audio.duration),
            ],
        )
        .map_err(|e| AvatarError::Audio {
            reason: js_error_text(&e),
        })?;
        Ok(VoiceId(voice.as_f64().unwrap_or(0.0) as u64))
    }

    fn stop(&mut self, voice: VoiceId) {
        if let Err(e) = call_method(&self.host, "stop", &[JsValue::from_f64(voice.0 as f64)]) {
            log::warn!("audio host stop failed: {}", js_error_text(&e));
        }
    }
}

/// Camera and orbit controls of the rendering host.
struct JsView {
    host: JsValue,
}

impl JsView {
    fn get<T: DeserializeOwned>(&self, method: &str) -> Option<T> {
        call_method(&self.host, method, &[])
            .ok()
            .and_then(|v| swb::from_value(v).ok())
    }

    fn set<T: serde::Serialize>(&self, method: &str, value: &T) {
        let Ok(arg) = swb::to_value(value) else {
            return;
        };
        if let Err(e) = call_method(&self.host, method, &[arg]) {
            log::warn!("view host {method} failed: {}", js_error_text(&e));
        }
    }
}

impl ViewHost for JsView {
    fn camera_position(&self) -> [f32; 3] {
        self.get("cameraPosition").unwrap_or_default()
    }
    fn set_camera_position(&mut self, position: [f32; 3]) {
        self.set("setCameraPosition", &position);
    }
    fn orbit_target(&self) -> [f32; 3] {
        self.get("orbitTarget").unwrap_or_default()
    }
    fn set_orbit_target(&mut self, target: [f32; 3]) {
        self.set("setOrbitTarget", &target);
    }
    fn controls(&self) -> ControlSettings {
        self.get("controls").unwrap_or_default()
    }
    fn set_controls(&mut self, controls: ControlSettings) {
        self.set("setControls", &controls);
    }
}

/// `loadClip(url) -> Promise<string | object>` resolving to clip JSON.
struct JsClipLoader {
    f: Function,
}

impl AssetLoader for JsClipLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>> {
        let url = url.to_string();
        let called = self.f.call1(&JsValue::UNDEFINED, &JsValue::from_str(&url));
        async move {
            let value = called.map_err(|e| AvatarError::asset_load(&url, js_error_text(&e)))?;
            let resolved = JsFuture::from(Promise::resolve(&value))
                .await
                .map_err(|e| AvatarError::asset_load(&url, js_error_text(&e)))?;
            let text = match resolved.as_string() {
                Some(s) => s,
                None => JSON::stringify(&resolved)
                    .ok()
                    .and_then(|s| s.as_string())
                    .ok_or_else(|| AvatarError::asset_load(&url, "loader returned no JSON"))?,
            };
            Ok(text.into_bytes())
        }
        .boxed_local()
    }
}

// -----------------------------------------------------------------------------
// Public wrapper
// -----------------------------------------------------------------------------

#[wasm_bindgen]
pub struct VizijAvatar {
    core: AvatarEngine,
    audio: JsAudio,
    view: JsView,
}

#[wasm_bindgen]
impl VizijAvatar {
    /// Create an avatar engine bound to the host's audio clock, camera and clip loader.
    /// Example:
    ///   new VizijAvatar({ speech: { cooldown_secs: 1.5 } }, audioHost, viewHost, url => fetch(url).then(r => r.text()))
    #[wasm_bindgen(constructor)]
    pub fn new(
        config: JsValue,
        audio: JsValue,
        view: JsValue,
        load_clip: Function,
    ) -> Result<VizijAvatar, JsError> {
        console_error_panic_hook::set_once();

        let cfg = if jsvalue_is_undefined_or_null(&config) {
            AvatarConfig::default()
        } else {
            AvatarConfig::from_json_str(&stringify(&config, "config")?)?
        };
        if jsvalue_is_undefined_or_null(&audio) || jsvalue_is_undefined_or_null(&view) {
            return Err(JsError::new("audio and view hosts are required"));
        }

        Ok(VizijAvatar {
            core: AvatarEngine::new(cfg, Box::new(JsClipLoader { f: load_clip }))?,
            audio: JsAudio { host: audio },
            view: JsView { host: view },
        })
    }

    /// Install the target skeleton: `{ joints: [{ name, parent?, position?, rotation?, scale? }] }`.
    #[wasm_bindgen(js_name = set_skeleton)]
    pub fn set_skeleton(&mut self, skeleton_json: JsValue) -> Result<(), JsError> {
        let s = stringify(&skeleton_json, "set_skeleton")?;
        self.core.set_skeleton(parse_skeleton_json(&s)?);
        Ok(())
    }

    /// Register a keyframe clip (three.js JSON) under `name`, retargeted from
    /// `convention` ("native" | "prefixed" | "motion_capture"). Returns the retarget report.
    #[wasm_bindgen(js_name = add_clip)]
    pub fn add_clip(
        &mut self,
        name: String,
        clip_json: JsValue,
        convention: JsValue,
    ) -> Result<JsValue, JsError> {
        let convention: SkeletonConvention = if jsvalue_is_undefined_or_null(&convention) {
            SkeletonConvention::default()
        } else {
            from_js(convention, "convention")?
        };
        let clip = parse_clip_json(&stringify(&clip_json, "add_clip")?)?;
        let report = self.core.add_clip(&name, &clip, convention)?;
        Ok(swb::to_value(&report)?)
    }

    /// Start an utterance from `{ audio: { key, duration }, cues: [...], emotion? }`.
    pub fn speak(&mut self, request: JsValue) -> Result<u32, JsError> {
        let request: SpeechRequest = from_js(request, "speak")?;
        Ok(self.core.speak(request, &mut self.audio)?.0)
    }

    /// Apply a full backend reply. Returns the utterance id, or null when the reply had no audio.
    #[wasm_bindgen(js_name = apply_reply)]
    pub fn apply_reply(&mut self, reply: JsValue) -> Result<JsValue, JsError> {
        let reply: BackendReply = from_js(reply, "apply_reply")?;
        Ok(match self.core.apply_reply(reply, &mut self.audio)? {
            Some(id) => JsValue::from_f64(id.0 as f64),
            None => JsValue::NULL,
        })
    }

    #[wasm_bindgen(js_name = stop_speech)]
    pub fn stop_speech(&mut self) {
        self.core.stop_speech(&mut self.audio);
    }

    /// `clip` is a URL string or `{ url, convention }`.
    #[wasm_bindgen(js_name = play_locomotion)]
    pub fn play_locomotion(&mut self, clip: JsValue) -> Result<(), JsError> {
        let clip: ClipRef = from_js(clip, "play_locomotion")?;
        self.core.play_locomotion(clip);
        Ok(())
    }

    #[wasm_bindgen(js_name = play_gestures)]
    pub fn play_gestures(&mut self, clips: JsValue) -> Result<(), JsError> {
        let clips: Vec<ClipRef> = from_js(clips, "play_gestures")?;
        self.core.play_gestures(clips);
        Ok(())
    }

    #[wasm_bindgen(js_name = cancel_gestures)]
    pub fn cancel_gestures(&mut self) {
        self.core.cancel_gestures();
    }

    #[wasm_bindgen(js_name = set_typing)]
    pub fn set_typing(&mut self, on: bool) {
        self.core.set_typing(on);
    }

    #[wasm_bindgen(js_name = advance_playlist)]
    pub fn advance_playlist(&mut self) {
        self.core.advance_playlist();
    }

    #[wasm_bindgen(js_name = set_model_root)]
    pub fn set_model_root(&mut self, root: JsValue) -> Result<(), JsError> {
        let root: JointTransform = from_js(root, "set_model_root")?;
        self.core.set_model_root(root);
        Ok(())
    }

    /// Current layer state ("Idle", "Talking", ...).
    pub fn state(&self) -> Result<JsValue, JsError> {
        Ok(swb::to_value(&self.core.state())?)
    }

    /// Step by dt (seconds). Returns Outputs JSON: joints, morphs, model_root, camera, state, events.
    pub fn tick(&mut self, dt: f32) -> Result<JsValue, JsError> {
        let out: &Outputs = self.core.tick(dt, &mut self.audio, &mut self.view);
        swb::to_value(out).map_err(|e| JsError::new(&format!("outputs error: {e}")))
    }
}

/// Numeric ABI version for compatibility checks at init.
#[wasm_bindgen]
pub fn abi_version() -> u32 {
    1
}
