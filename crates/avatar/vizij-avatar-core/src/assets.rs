//! Asynchronous, deduplicated clip loading.
//!
//! The host supplies an `AssetLoader` returning a future of raw clip JSON.
//! `AssetCache` wraps each in-flight load in a `Shared` future keyed by URL so
//! concurrent requests for the same URL await one fetch. Nothing blocks: the
//! engine polls `PendingClip`s once per tick with `now_or_never`.

use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use hashbrown::HashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::clip::AnimationClip;
use crate::error::AvatarError;
use crate::loader::parse_clip_bytes;
use crate::retarget::{SkeletonConvention, SourceClip};

/// Resolves a URL to raw clip JSON bytes.
pub trait AssetLoader {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, AvatarError>>;
}

/// Reference to a clip asset: a bare URL (native convention) or a URL with
/// an explicit source convention.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClipRef {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        convention: SkeletonConvention,
    },
}

impl ClipRef {
    pub fn url(&self) -> &str {
        match self {
            ClipRef::Url(u) => u,
            ClipRef::Detailed { url, .. } => url,
        }
    }

    pub fn convention(&self) -> SkeletonConvention {
        match self {
            ClipRef::Url(_) => SkeletonConvention::Native,
            ClipRef::Detailed { convention, .. } => *convention,
        }
    }
}

impl From<&str> for ClipRef {
    fn from(url: &str) -> Self {
        ClipRef::Url(url.to_string())
    }
}

type LoadResult = Result<Arc<AnimationClip>, AvatarError>;
type SharedLoad = Shared<LocalBoxFuture<'static, LoadResult>>;

pub struct AssetCache {
    loader: Box<dyn AssetLoader>,
    in_flight: HashMap<String, SharedLoad>,
    ready: HashMap<String, Arc<AnimationClip>>,
    fetches: usize,
}

impl std::fmt::Debug for AssetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetCache")
            .field("in_flight", &self.in_flight.len())
            .field("ready", &self.ready.len())
            .field("fetches", &self.fetches)
            .finish()
    }
}

impl AssetCache {
    pub fn new(loader: Box<dyn AssetLoader>) -> Self {
        Self {
            loader,
            in_flight: HashMap::new(),
            ready: HashMap::new(),
            fetches: 0,
        }
    }

    /// Number of times the loader was invoked.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    pub fn is_cached(&self, url: &str) -> bool {
        self.ready.contains_key(url)
    }

    pub fn is_loading(&self, url: &str) -> bool {
        self.in_flight.contains_key(url)
    }

    /// Start (or join) a load for `clip`.
    pub fn request(&mut self, clip: &ClipRef) -> PendingClip {
        let url = clip.url().to_string();
        let convention = clip.convention();
        if let Some(parsed) = self.ready.get(&url) {
            return PendingClip {
                url,
                convention,
                state: PendingState::Resolved(Ok(parsed.clone())),
            };
        }
        if let Some(shared) = self.in_flight.get(&url) {
            debug!("assets: joining in-flight load of '{url}'");
            return PendingClip {
                url,
                convention,
                state: PendingState::Waiting(shared.clone()),
            };
        }

        debug!("assets: fetching '{url}'");
        self.fetches += 1;
        let fetch = self.loader.fetch(&url);
        let shared = async move {
            let bytes = fetch.await?;
            parse_clip_bytes(&bytes).map(Arc::new)
        }
        .boxed_local()
        .shared();
        self.in_flight.insert(url.clone(), shared.clone());
        PendingClip {
            url,
            convention,
            state: PendingState::Waiting(shared),
        }
    }

    fn complete(&mut self, url: &str, result: &LoadResult) {
        self.in_flight.remove(url);
        match result {
            Ok(clip) => {
                self.ready.insert(url.to_string(), clip.clone());
            }
            Err(e) => warn!("assets: load of '{url}' failed: {e}"),
        }
    }
}

enum PendingState {
    Waiting(SharedLoad),
    Resolved(LoadResult),
    Taken,
}

/// A requested clip; poll once per tick until it yields.
pub struct PendingClip {
    url: String,
    convention: SkeletonConvention,
    state: PendingState,
}

impl std::fmt::Debug for PendingClip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            PendingState::Waiting(_) => "waiting",
            PendingState::Resolved(_) => "resolved",
            PendingState::Taken => "taken",
        };
        f.debug_struct("PendingClip")
            .field("url", &self.url)
            .field("state", &state)
            .finish()
    }
}

impl PendingClip {
    /// An already-available clip (e.g. from the engine's clip library).
    pub fn resolved(url: impl Into<String>, source: SourceClip) -> Self {
        Self {
            url: url.into(),
            convention: source.convention,
            state: PendingState::Resolved(Ok(source.clip)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the result exactly once; `None` while the load is in flight
    /// and after the result was taken.
    pub fn poll(&mut self, cache: &mut AssetCache) -> Option<Result<SourceClip, AvatarError>> {
        let result = match std::mem::replace(&mut self.state, PendingState::Taken) {
            PendingState::Taken => return None,
            PendingState::Resolved(r) => r,
            PendingState::Waiting(mut shared) => match (&mut shared).now_or_never() {
                Some(r) => {
                    cache.complete(&self.url, &r);
                    r
                }
                None => {
                    self.state = PendingState::Waiting(shared);
                    return None;
                }
            },
        };
        let convention = self.convention;
        Some(result.map(|clip| SourceClip { clip, convention }))
    }
}
