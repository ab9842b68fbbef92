//! Blendshape controller: named facial weights smoothed toward targets.
//!
//! Every weight moves as `w += (target - w) * (1 - exp(-rate * dt))` with a
//! per-category rate, so the result does not depend on the frame rate. Only
//! `hard_reset` sets weights discontinuously.

use std::f32::consts::TAU;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::config::{BlinkConfig, EmotionConfig, GazeConfig, SmoothingConfig};
use crate::emotion::Emotion;
use crate::interp::functions::approach;
use crate::speech::VISEMES;

pub const JAW_OPEN: &str = "jawOpen";
pub const BLINK_KEYS: [&str; 2] = ["eyeBlinkLeft", "eyeBlinkRight"];
pub const GAZE_KEYS: [&str; 8] = [
    "eyeLookUpLeft",
    "eyeLookUpRight",
    "eyeLookDownLeft",
    "eyeLookDownRight",
    "eyeLookInLeft",
    "eyeLookInRight",
    "eyeLookOutLeft",
    "eyeLookOutRight",
];

/// Weights below this are reported as exactly zero.
const EPS: f32 = 1e-4;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightCategory {
    Viseme,
    Jaw,
    Emotion,
    Blink,
    Gaze,
}

#[derive(Clone, Debug)]
struct Weight {
    current: f32,
    target: f32,
    category: WeightCategory,
    /// Report this weight even when it is zero (it was non-zero or reset).
    needs_clear: bool,
}

impl Weight {
    fn new(category: WeightCategory) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            category,
            needs_clear: false,
        }
    }
}

/// Periodic random event of fixed duration (blinks, saccades).
#[derive(Clone, Debug)]
struct RandomPulse {
    next_in: f32,
    active_left: f32,
}

impl RandomPulse {
    fn new(rng: &mut fastrand::Rng, min: f32, max: f32) -> Self {
        Self {
            next_in: random_interval(rng, min, max),
            active_left: 0.0,
        }
    }

    /// Returns Some(true) on the step a new event starts, Some(false) while it
    /// continues, None when idle.
    fn step(&mut self, dt: f32, rng: &mut fastrand::Rng, min: f32, max: f32, duration: f32) -> Option<bool> {
        if self.active_left > 0.0 {
            self.active_left -= dt;
            return Some(false);
        }
        self.next_in -= dt;
        if self.next_in <= 0.0 {
            self.next_in = random_interval(rng, min, max);
            self.active_left = duration;
            return Some(true);
        }
        None
    }
}

fn random_interval(rng: &mut fastrand::Rng, min: f32, max: f32) -> f32 {
    min + rng.f32() * (max - min).max(0.0)
}

#[derive(Clone, Debug)]
pub struct BlendshapeController {
    weights: HashMap<String, Weight>,
    smoothing: SmoothingConfig,
    blink_cfg: BlinkConfig,
    gaze_cfg: GazeConfig,
    emotion_cfg: EmotionConfig,
    emotion: Emotion,
    activity: f32,
    clock: f32,
    rng: fastrand::Rng,
    blink: RandomPulse,
    gaze: RandomPulse,
    gaze_dir: [f32; 2],
}

impl BlendshapeController {
    pub fn new(
        smoothing: SmoothingConfig,
        blink: BlinkConfig,
        gaze: GazeConfig,
        emotion: EmotionConfig,
        seed: u64,
    ) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let blink_pulse = RandomPulse::new(&mut rng, blink.min_interval_secs, blink.max_interval_secs);
        let gaze_pulse = RandomPulse::new(&mut rng, gaze.min_interval_secs, gaze.max_interval_secs);
        let mut weights = HashMap::new();
        for (name, _) in VISEMES {
            weights.insert(name.to_string(), Weight::new(WeightCategory::Viseme));
        }
        weights.insert(JAW_OPEN.to_string(), Weight::new(WeightCategory::Jaw));
        for key in BLINK_KEYS {
            weights.insert(key.to_string(), Weight::new(WeightCategory::Blink));
        }
        for key in GAZE_KEYS {
            weights.insert(key.to_string(), Weight::new(WeightCategory::Gaze));
        }
        for e in Emotion::ALL {
            for (key, _) in e.profile() {
                weights
                    .entry(key.to_string())
                    .or_insert_with(|| Weight::new(WeightCategory::Emotion));
            }
        }
        Self {
            weights,
            smoothing,
            blink_cfg: blink,
            gaze_cfg: gaze,
            emotion_cfg: emotion,
            emotion: Emotion::Neutral,
            activity: 0.0,
            clock: 0.0,
            rng,
            blink: blink_pulse,
            gaze: gaze_pulse,
            gaze_dir: [0.0, 0.0],
        }
    }

    pub fn weight(&self, key: &str) -> f32 {
        self.weights.get(key).map(|w| w.current).unwrap_or(0.0)
    }

    pub fn target(&self, key: &str) -> f32 {
        self.weights.get(key).map(|w| w.target).unwrap_or(0.0)
    }

    pub fn emotion(&self) -> Emotion {
        self.emotion
    }

    pub fn activity(&self) -> f32 {
        self.activity
    }

    fn set_target(&mut self, key: &str, category: WeightCategory, value: f32) {
        let value = value.clamp(0.0, 1.0);
        match self.weights.get_mut(key) {
            Some(w) => w.target = value,
            None => {
                let mut w = Weight::new(category);
                w.target = value;
                self.weights.insert(key.to_string(), w);
            }
        }
    }

    fn set_category_targets(&mut self, category: WeightCategory, value: f32) {
        for w in self.weights.values_mut().filter(|w| w.category == category) {
            w.target = value;
        }
    }

    /// Target 1 for `viseme`, 0 for every other viseme. `None` clears all.
    pub fn set_viseme(&mut self, viseme: Option<&str>) {
        self.set_category_targets(WeightCategory::Viseme, 0.0);
        if let Some(name) = viseme {
            self.set_target(name, WeightCategory::Viseme, 1.0);
        }
    }

    pub fn set_jaw(&mut self, amount: f32) {
        self.set_target(JAW_OPEN, WeightCategory::Jaw, amount);
    }

    pub fn clear_speech_targets(&mut self) {
        self.set_category_targets(WeightCategory::Viseme, 0.0);
        self.set_category_targets(WeightCategory::Jaw, 0.0);
    }

    pub fn set_emotion(&mut self, emotion: Emotion) {
        self.emotion = emotion;
    }

    /// Zero every weight and target immediately; each is reported once so the
    /// host clears it.
    pub fn hard_reset(&mut self) {
        for w in self.weights.values_mut() {
            w.current = 0.0;
            w.target = 0.0;
            w.needs_clear = true;
        }
        self.activity = 0.0;
        self.gaze_dir = [0.0, 0.0];
    }

    /// Advance one frame. `talking` drives the emotion activity envelope;
    /// `procedural` enables the blink and gaze processes.
    pub fn update(&mut self, dt: f32, talking: bool, procedural: bool) {
        let dt = dt.max(0.0);
        self.clock += dt;

        self.update_emotion_targets(dt, talking);
        self.update_blink(dt, procedural);
        self.update_gaze(dt, procedural);

        let rates = &self.smoothing;
        for w in self.weights.values_mut() {
            let rate = match w.category {
                WeightCategory::Viseme => rates.viseme,
                WeightCategory::Jaw => rates.jaw,
                WeightCategory::Emotion => rates.emotion,
                WeightCategory::Blink => rates.blink,
                WeightCategory::Gaze => rates.gaze,
            };
            w.current = approach(w.current, w.target, rate, dt).clamp(0.0, 1.0);
        }
    }

    fn update_emotion_targets(&mut self, dt: f32, talking: bool) {
        let cfg = &self.emotion_cfg;
        self.activity = if talking {
            approach(self.activity, 1.0, cfg.activity_rise, dt)
        } else {
            approach(self.activity, 0.0, cfg.activity_decay, dt)
        };
        let depth = cfg.liveliness_depth.clamp(0.0, 1.0);
        let phase = if cfg.liveliness_period_secs > 0.0 {
            (TAU * self.clock / cfg.liveliness_period_secs).sin()
        } else {
            0.0
        };
        let liveliness = (1.0 - depth + depth * phase).max(0.0);
        let scale = liveliness * self.activity;

        self.set_category_targets(WeightCategory::Emotion, 0.0);
        for (key, base) in self.emotion.profile() {
            self.set_target(key, WeightCategory::Emotion, base * scale);
        }
    }

    fn update_blink(&mut self, dt: f32, procedural: bool) {
        let cfg = &self.blink_cfg;
        let closed = if procedural && cfg.enabled {
            self.blink
                .step(dt, &mut self.rng, cfg.min_interval_secs, cfg.max_interval_secs, cfg.duration_secs)
                .is_some()
        } else {
            false
        };
        let v = if closed { 1.0 } else { 0.0 };
        for key in BLINK_KEYS {
            self.set_target(key, WeightCategory::Blink, v);
        }
    }

    fn update_gaze(&mut self, dt: f32, procedural: bool) {
        let cfg = &self.gaze_cfg;
        let step = if procedural && cfg.enabled {
            self.gaze
                .step(dt, &mut self.rng, cfg.min_interval_secs, cfg.max_interval_secs, cfg.duration_secs)
        } else {
            None
        };
        match step {
            Some(true) => {
                let amount = cfg.max_amount.clamp(0.0, 1.0);
                self.gaze_dir = [
                    (self.rng.f32() * 2.0 - 1.0) * amount,
                    (self.rng.f32() * 2.0 - 1.0) * amount * 0.5,
                ];
            }
            Some(false) => {}
            None => self.gaze_dir = [0.0, 0.0],
        }

        // Horizontal: positive looks to the avatar's left (left eye out, right eye in).
        let [h, v] = self.gaze_dir;
        let targets = [
            ("eyeLookOutLeft", h.max(0.0)),
            ("eyeLookInRight", h.max(0.0)),
            ("eyeLookInLeft", (-h).max(0.0)),
            ("eyeLookOutRight", (-h).max(0.0)),
            ("eyeLookUpLeft", v.max(0.0)),
            ("eyeLookUpRight", v.max(0.0)),
            ("eyeLookDownLeft", (-v).max(0.0)),
            ("eyeLookDownRight", (-v).max(0.0)),
        ];
        for (key, value) in targets {
            self.set_target(key, WeightCategory::Gaze, value);
        }
    }

    /// Weights to send to the host this frame, sorted by key. Zero weights are
    /// skipped unless they need clearing.
    pub fn collect(&mut self) -> Vec<(String, f32)> {
        let mut out = Vec::new();
        for (key, w) in self.weights.iter_mut() {
            let value = if w.current < EPS { 0.0 } else { w.current };
            if value > 0.0 {
                out.push((key.clone(), value));
                w.needs_clear = true;
            } else if w.needs_clear {
                out.push((key.clone(), 0.0));
                w.needs_clear = false;
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> BlendshapeController {
        BlendshapeController::new(
            SmoothingConfig::default(),
            BlinkConfig::default(),
            GazeConfig::default(),
            EmotionConfig::default(),
            7,
        )
    }

    #[test]
    fn viseme_targets_are_exclusive() {
        let mut c = controller();
        c.set_viseme(Some("viseme_aa"));
        c.set_viseme(Some("viseme_O"));
        assert_eq!(c.target("viseme_aa"), 0.0);
        assert_eq!(c.target("viseme_O"), 1.0);
    }

    #[test]
    fn hard_reset_reports_zero_once() {
        let mut c = controller();
        c.hard_reset();
        let first = c.collect();
        assert!(first.iter().any(|(k, v)| k == "jawOpen" && *v == 0.0));
        assert!(c.collect().is_empty());
    }

    #[test]
    fn blink_process_closes_eyes_eventually() {
        let mut c = controller();
        let mut saw_blink = false;
        for _ in 0..(8 * 60) {
            c.update(1.0 / 60.0, false, true);
            if c.weight("eyeBlinkLeft") > 0.5 {
                saw_blink = true;
            }
        }
        assert!(saw_blink);
    }
}
