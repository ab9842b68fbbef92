//! Inbound shapes: the conversational backend's reply and the speech request
//! the engine derives from it.
//!
//! Lip-sync arrives either as Rhubarb output (`lipsync.mouthCues`) or as a
//! pre-labelled `visemeCues` list; when both are present `visemeCues` wins.

use serde::{Deserialize, Deserializer, Serialize};

use crate::assets::ClipRef;
use crate::emotion::Emotion;
use crate::speech::{SpeechAudio, VisemeCue};

/// How long a trailing non-silent labelled cue lasts when the reply gives no duration.
const LAST_CUE_HOLD_SECS: f64 = 0.15;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MouthCue {
    pub start: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f64>,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lipsync {
    #[serde(default)]
    pub mouth_cues: Vec<MouthCue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledCue {
    pub onset: f64,
    pub label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub audio: Option<SpeechAudio>,
    #[serde(default)]
    pub lipsync: Option<Lipsync>,
    #[serde(default)]
    pub viseme_cues: Option<Vec<LabeledCue>>,
    /// Free-form emotion name; unknown names become neutral.
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default, alias = "gestureClipRefs", deserialize_with = "one_or_many")]
    pub gestures: Vec<ClipRef>,
    #[serde(default, alias = "locomotionClipRefs", deserialize_with = "one_or_many")]
    pub locomotion: Vec<ClipRef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(ClipRef),
    Many(Vec<ClipRef>),
    Null(()),
}

fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<ClipRef>, D::Error> {
    Ok(match OneOrMany::deserialize(d)? {
        OneOrMany::One(r) => vec![r],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// Everything `AvatarEngine::speak` needs for one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub audio: SpeechAudio,
    pub cues: Vec<VisemeCue>,
    #[serde(default)]
    pub emotion: Emotion,
}

impl BackendReply {
    pub fn emotion(&self) -> Emotion {
        self.emotion
            .as_deref()
            .map(Emotion::parse_lenient)
            .unwrap_or_default()
    }

    /// Cues from whichever lip-sync representation is present.
    pub fn cues(&self) -> Vec<VisemeCue> {
        if let Some(labeled) = &self.viseme_cues {
            return labeled
                .iter()
                .map(|c| VisemeCue::from_label(c.onset, &c.label))
                .collect();
        }
        self.lipsync
            .as_ref()
            .map(|l| {
                l.mouth_cues
                    .iter()
                    .map(|c| VisemeCue::from_label(c.start, &c.value))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// End of the lip-sync track: the latest mouth cue end, or the last
    /// labelled onset (held briefly when that cue is not silence).
    pub fn cue_end(&self) -> f64 {
        let mouth_end = self
            .lipsync
            .iter()
            .flat_map(|l| l.mouth_cues.iter())
            .map(|c| c.end.unwrap_or(c.start))
            .fold(0.0, f64::max);
        let labeled_end = self
            .viseme_cues
            .iter()
            .flatten()
            .max_by(|a, b| a.onset.total_cmp(&b.onset))
            .map(|last| {
                let cue = VisemeCue::from_label(last.onset, &last.label);
                if cue.is_silence() {
                    cue.onset
                } else {
                    cue.onset + LAST_CUE_HOLD_SECS
                }
            })
            .unwrap_or(0.0);
        mouth_end.max(labeled_end)
    }

    /// A speech request when the reply carries audio. A non-positive duration
    /// falls back to `cue_end`.
    pub fn speech_request(&self) -> Option<SpeechRequest> {
        let mut audio = self.audio.clone()?;
        if audio.duration.is_nan() || audio.duration <= 0.0 {
            audio.duration = self.cue_end();
        }
        Some(SpeechRequest {
            audio,
            cues: self.cues(),
            emotion: self.emotion(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rhubarb_reply_with_aliases() {
        let json = r#"{
            "text": "hi",
            "audio": { "key": "utt-1", "duration": 1.5 },
            "lipsync": { "mouthCues": [ { "start": 0.0, "end": 0.5, "value": "A" }, { "start": 0.5, "value": "B" } ] },
            "emotion": "Happy",
            "gestureClipRefs": ["clips/wave.json", { "url": "clips/nod.json", "convention": "prefixed" }],
            "locomotionClipRefs": { "url": "clips/walk.json", "convention": "motion_capture" }
        }"#;
        let reply: BackendReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.gestures.len(), 2);
        assert_eq!(reply.locomotion.len(), 1);
        let req = reply.speech_request().unwrap();
        assert_eq!(req.emotion, Emotion::Happy);
        assert_eq!(req.cues[1].viseme, "viseme_kk");
    }

    #[test]
    fn viseme_cues_take_precedence() {
        let reply = BackendReply {
            lipsync: Some(Lipsync {
                mouth_cues: vec![MouthCue {
                    start: 0.0,
                    end: None,
                    value: "D".into(),
                }],
            }),
            viseme_cues: Some(vec![LabeledCue {
                onset: 0.1,
                label: "viseme_O".into(),
            }]),
            ..Default::default()
        };
        let cues = reply.cues();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].viseme, "viseme_O");
    }

    #[test]
    fn labeled_cues_alone_give_a_duration() {
        let reply = BackendReply {
            audio: Some(SpeechAudio {
                key: "utt".into(),
                duration: 0.0,
            }),
            viseme_cues: Some(vec![
                LabeledCue {
                    onset: 0.0,
                    label: "viseme_O".into(),
                },
                LabeledCue {
                    onset: 0.4,
                    label: "viseme_sil".into(),
                },
            ]),
            ..Default::default()
        };
        let req = reply.speech_request().unwrap();
        assert!((req.audio.duration - 0.4).abs() < 1e-9);

        let open_ended = BackendReply {
            viseme_cues: Some(vec![LabeledCue {
                onset: 0.3,
                label: "viseme_aa".into(),
            }]),
            ..Default::default()
        };
        assert!((open_ended.cue_end() - 0.45).abs() < 1e-9);
    }
}
