mod common;

use common::approx;
use vizij_avatar_core::config::{BlinkConfig, EmotionConfig, GazeConfig, SmoothingConfig};
use vizij_avatar_core::{BlendshapeController, Emotion};

fn controller(seed: u64) -> BlendshapeController {
    BlendshapeController::new(
        SmoothingConfig::default(),
        BlinkConfig {
            enabled: false,
            ..Default::default()
        },
        GazeConfig {
            enabled: false,
            ..Default::default()
        },
        EmotionConfig::default(),
        seed,
    )
}

fn drive(c: &mut BlendshapeController, dt: f32, frames: usize) {
    for _ in 0..frames {
        c.update(dt, true, true);
    }
}

/// it should converge identically at 30 and 120 frames per second
#[test]
fn smoothing_is_frame_rate_independent() {
    let mut slow = controller(1);
    let mut fast = controller(1);
    for c in [&mut slow, &mut fast] {
        c.set_viseme(Some("viseme_aa"));
        c.set_jaw(0.7);
    }
    drive(&mut slow, 1.0 / 30.0, 3);
    drive(&mut fast, 1.0 / 120.0, 12);

    for key in ["viseme_aa", "jawOpen"] {
        approx(slow.weight(key), fast.weight(key), 1e-4);
    }
    assert!(slow.weight("viseme_aa") > 0.5);
}

/// it should keep every weight within 0..=1
#[test]
fn weights_stay_clamped() {
    let mut c = controller(3);
    c.set_jaw(4.0);
    c.set_emotion(Emotion::Excited);
    drive(&mut c, 0.25, 20);
    for (key, w) in c.collect() {
        assert!((0.0..=1.0).contains(&w), "{key} = {w}");
    }
    approx(c.weight("jawOpen"), 1.0, 1e-3);
}

/// it should report a weight once at zero after it decays
#[test]
fn cleared_weights_are_reported_once() {
    let mut c = controller(5);
    c.set_viseme(Some("viseme_O"));
    drive(&mut c, 0.1, 5);
    assert!(c.collect().iter().any(|(k, w)| k == "viseme_O" && *w > 0.0));

    c.clear_speech_targets();
    drive(&mut c, 0.5, 10);
    let first = c.collect();
    assert!(first.iter().any(|(k, w)| k == "viseme_O" && *w == 0.0));
    assert!(!c.collect().iter().any(|(k, _)| k == "viseme_O"));
}

/// it should blink on its own when the procedural layer is enabled
#[test]
fn blink_eventually_fires() {
    let mut c = BlendshapeController::new(
        SmoothingConfig::default(),
        BlinkConfig::default(),
        GazeConfig {
            enabled: false,
            ..Default::default()
        },
        EmotionConfig::default(),
        11,
    );
    let mut peak: f32 = 0.0;
    for _ in 0..(60 * 8) {
        c.update(1.0 / 60.0, false, true);
        peak = peak.max(c.weight("eyeBlinkLeft"));
    }
    assert!(peak > 0.5, "peak blink weight {peak}");

    let mut quiet = controller(11);
    for _ in 0..(60 * 8) {
        quiet.update(1.0 / 60.0, false, false);
    }
    assert_eq!(quiet.weight("eyeBlinkLeft"), 0.0);
}
