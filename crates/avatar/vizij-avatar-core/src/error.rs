//! Error types for the avatar engine.
//!
//! Every failure is recoverable: callers log it, abort the requested
//! transition and let the engine fall back to idle.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AvatarError {
    /// Clip JSON could not be decoded.
    #[error("clip parse error: {reason}")]
    ClipParse { reason: String },

    /// Clip decoded but violates a structural invariant.
    #[error("invalid clip '{clip}': {reason}")]
    InvalidClip { clip: String, reason: String },

    /// Skeleton description is malformed (duplicate names, missing root, cycles).
    #[error("invalid skeleton: {reason}")]
    SkeletonInvalid { reason: String },

    /// The asset store could not produce the requested resource.
    #[error("asset load failed for '{url}': {reason}")]
    AssetLoad { url: String, reason: String },

    /// No clip with this name is registered.
    #[error("clip not found: {name}")]
    ClipNotFound { name: String },

    /// A dependent subsystem did not become ready in time.
    #[error("timed out after {waited_secs}s waiting for {what}")]
    NotReady { what: String, waited_secs: f32 },

    /// The audio device refused to schedule playback.
    #[error("audio device error: {reason}")]
    Audio { reason: String },

    /// Configuration failed to parse or validate.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl AvatarError {
    pub fn clip_parse(reason: impl Into<String>) -> Self {
        AvatarError::ClipParse {
            reason: reason.into(),
        }
    }

    pub fn asset_load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        AvatarError::AssetLoad {
            url: url.into(),
            reason: reason.into(),
        }
    }
}
