//! Audio-clock-driven viseme scheduling.
//!
//! One utterance is in flight at a time. Playback is scheduled on the audio
//! device's clock `lookahead_secs` in the future and the active cue is chosen
//! from `device.current_time() - start_at`, never from frame dt, so mouth
//! shapes stay locked to the waveform even when frames stall.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::SpeechConfig;
use crate::error::AvatarError;
use crate::ids::UtteranceId;

/// Handle the audio device returns for a scheduled buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// A decoded speech buffer known to the host's audio device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeechAudio {
    /// Host-side handle of the decoded buffer.
    pub key: String,
    /// Seconds.
    pub duration: f64,
}

/// Audio output with its own clock (an `AudioContext` in browsers).
pub trait AudioDevice {
    /// Current time of the audio clock in seconds.
    fn current_time(&self) -> f64;
    /// Schedule `audio` to start at `at` on the audio clock.
    fn start(&mut self, audio: &SpeechAudio, at: f64) -> Result<VoiceId, AvatarError>;
    /// Stop and release a voice. Unknown or finished voices are ignored.
    fn stop(&mut self, voice: VoiceId);
}

pub const SILENCE: &str = "viseme_sil";

/// Oculus viseme blendshape names with their default jaw opening.
pub const VISEMES: [(&str, f32); 15] = [
    ("viseme_sil", 0.0),
    ("viseme_PP", 0.0),
    ("viseme_FF", 0.1),
    ("viseme_TH", 0.3),
    ("viseme_DD", 0.3),
    ("viseme_kk", 0.2),
    ("viseme_CH", 0.3),
    ("viseme_SS", 0.2),
    ("viseme_nn", 0.2),
    ("viseme_RR", 0.3),
    ("viseme_aa", 0.7),
    ("viseme_E", 0.5),
    ("viseme_I", 0.3),
    ("viseme_O", 0.5),
    ("viseme_U", 0.3),
];

/// Rhubarb mouth shapes → Oculus visemes.
fn rhubarb_viseme(label: &str) -> Option<&'static str> {
    Some(match label {
        "A" => "viseme_PP",
        "B" => "viseme_kk",
        "C" => "viseme_I",
        "D" => "viseme_aa",
        "E" => "viseme_O",
        "F" => "viseme_U",
        "G" => "viseme_FF",
        "H" => "viseme_TH",
        "X" => SILENCE,
        _ => return None,
    })
}

pub fn default_jaw(viseme: &str) -> f32 {
    VISEMES
        .iter()
        .find(|(name, _)| *name == viseme)
        .map(|(_, jaw)| *jaw)
        .unwrap_or(0.0)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisemeCue {
    /// Seconds from the start of the audio.
    pub onset: f64,
    pub viseme: String,
    /// Jaw opening in [0, 1].
    pub jaw: f32,
}

impl VisemeCue {
    /// Build a cue from a Rhubarb letter or a `viseme_*` name. Unknown labels
    /// become silence.
    pub fn from_label(onset: f64, label: &str) -> Self {
        let label = label.trim();
        let viseme = if label.starts_with("viseme_") {
            label.to_string()
        } else if let Some(v) = rhubarb_viseme(label) {
            v.to_string()
        } else {
            debug!("speech: unknown mouth shape '{label}', using silence");
            SILENCE.to_string()
        };
        let jaw = default_jaw(&viseme);
        Self { onset, viseme, jaw }
    }

    pub fn silence(onset: f64) -> Self {
        Self {
            onset,
            viseme: SILENCE.to_string(),
            jaw: 0.0,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.viseme == SILENCE
    }
}

/// Sort by onset, keep the later cue when two share an onset, drop cues at or
/// past the end of the audio and append a trailing silence at `duration`.
pub fn prepare_cues(mut cues: Vec<VisemeCue>, duration: f64) -> Vec<VisemeCue> {
    cues.retain(|c| c.onset.is_finite() && c.onset >= 0.0 && c.onset < duration);
    cues.sort_by(|a, b| a.onset.total_cmp(&b.onset));

    let mut out: Vec<VisemeCue> = Vec::with_capacity(cues.len() + 1);
    for mut cue in cues {
        cue.jaw = cue.jaw.clamp(0.0, 1.0);
        match out.last_mut() {
            Some(last) if last.onset == cue.onset => *last = cue,
            _ => out.push(cue),
        }
    }
    if duration.is_finite() && duration > 0.0 {
        out.push(VisemeCue::silence(duration));
    }
    out
}

/// Lifecycle notifications drained by the engine each tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpeechSignal {
    Started(UtteranceId),
    AudioEnded(UtteranceId),
    Finished(UtteranceId),
    Superseded { old: UtteranceId, by: UtteranceId },
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Phase {
    Idle,
    Playing,
    CoolDown { left: f32 },
}

#[derive(Debug)]
pub struct SpeechScheduler {
    lookahead: f64,
    cooldown: f32,
    phase: Phase,
    speech_active: bool,
    has_cues: bool,
    cues: Vec<VisemeCue>,
    cursor: Option<usize>,
    utterance: Option<UtteranceId>,
    voice: Option<VoiceId>,
    start_at: f64,
    duration: f64,
    signals: Vec<SpeechSignal>,
}

impl SpeechScheduler {
    pub fn new(cfg: &SpeechConfig) -> Self {
        Self {
            lookahead: cfg.lookahead_secs,
            cooldown: cfg.cooldown_secs,
            phase: Phase::Idle,
            speech_active: false,
            has_cues: false,
            cues: Vec::new(),
            cursor: None,
            utterance: None,
            voice: None,
            start_at: 0.0,
            duration: 0.0,
            signals: Vec::new(),
        }
    }

    /// True from `speak` until the cool-down after the audio ends has elapsed.
    #[inline]
    pub fn speech_active(&self) -> bool {
        self.speech_active
    }

    /// Whether the current utterance should put the body into the talking role.
    #[inline]
    pub fn drives_talking(&self) -> bool {
        self.speech_active && self.has_cues
    }

    pub fn utterance(&self) -> Option<UtteranceId> {
        self.utterance
    }

    pub fn start_at(&self) -> f64 {
        self.start_at
    }

    pub fn cues(&self) -> &[VisemeCue] {
        &self.cues
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_cooling_down(&self) -> bool {
        matches!(self.phase, Phase::CoolDown { .. })
    }

    /// The cue driving the mouth right now; None before the start timestamp
    /// and after the audio ends.
    pub fn current_cue(&self) -> Option<&VisemeCue> {
        match self.phase {
            Phase::Playing => self.cursor.and_then(|i| self.cues.get(i)),
            _ => None,
        }
    }

    /// Begin a new utterance, superseding any in flight.
    pub fn speak(
        &mut self,
        id: UtteranceId,
        audio: &SpeechAudio,
        cues: Vec<VisemeCue>,
        device: &mut dyn AudioDevice,
    ) -> Result<(), AvatarError> {
        if let Some(voice) = self.voice.take() {
            device.stop(voice);
        }
        if let Some(old) = self.utterance.take() {
            info!("speech: utterance {} superseded by {}", old.0, id.0);
            self.signals.push(SpeechSignal::Superseded { old, by: id });
        }
        self.reset();

        if !audio.duration.is_finite() || audio.duration < 0.0 {
            return Err(AvatarError::Audio {
                reason: format!("invalid audio duration {}", audio.duration),
            });
        }

        let start_at = device.current_time() + self.lookahead;
        let voice = device.start(audio, start_at)?;

        self.has_cues = !cues.is_empty();
        self.cues = prepare_cues(cues, audio.duration);
        self.start_at = start_at;
        self.duration = audio.duration;
        self.voice = Some(voice);
        self.phase = Phase::Playing;
        self.speech_active = true;
        self.utterance = Some(id);
        self.signals.push(SpeechSignal::Started(id));
        debug!(
            "speech: utterance {} scheduled at {:.3}s for {:.3}s with {} cues",
            id.0,
            self.start_at,
            self.duration,
            self.cues.len()
        );
        Ok(())
    }

    /// Stop immediately without cool-down.
    pub fn stop(&mut self, device: &mut dyn AudioDevice) {
        if let Some(voice) = self.voice.take() {
            device.stop(voice);
        }
        if let Some(id) = self.utterance.take() {
            self.signals.push(SpeechSignal::Finished(id));
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.speech_active = false;
        self.has_cues = false;
        self.cues.clear();
        self.cursor = None;
    }

    pub fn update(&mut self, dt: f32, device: &dyn AudioDevice) {
        match self.phase {
            Phase::Idle => {}
            Phase::Playing => {
                let elapsed = device.current_time() - self.start_at;
                if elapsed < 0.0 {
                    return;
                }
                // Monotonic: the cursor only moves forward.
                let mut next = self.cursor.map_or(0, |i| i + 1);
                while next < self.cues.len() && self.cues[next].onset <= elapsed {
                    self.cursor = Some(next);
                    next += 1;
                }
                if elapsed >= self.duration {
                    self.voice = None;
                    self.phase = Phase::CoolDown {
                        left: self.cooldown,
                    };
                    if let Some(id) = self.utterance {
                        self.signals.push(SpeechSignal::AudioEnded(id));
                    }
                }
            }
            Phase::CoolDown { left } => {
                let left = left - dt.max(0.0);
                if left > 0.0 {
                    self.phase = Phase::CoolDown { left };
                    return;
                }
                let id = self.utterance.take();
                self.reset();
                if let Some(id) = id {
                    self.signals.push(SpeechSignal::Finished(id));
                }
            }
        }
    }

    pub fn drain_signals(&mut self) -> Vec<SpeechSignal> {
        std::mem::take(&mut self.signals)
    }
}
