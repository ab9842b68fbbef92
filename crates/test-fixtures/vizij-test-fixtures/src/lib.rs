//! Shared test fixtures: skeletons, keyframe clips and backend replies.
//!
//! Everything is listed in `fixtures/manifest.json` at the workspace root and
//! looked up by name.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    clips: HashMap<String, String>,
    skeletons: HashMap<String, String>,
    replies: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Clip,
    Skeleton,
    Reply,
}

impl Kind {
    fn entries(self) -> &'static HashMap<String, String> {
        match self {
            Kind::Clip => &MANIFEST.clips,
            Kind::Skeleton => &MANIFEST.skeletons,
            Kind::Reply => &MANIFEST.replies,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Kind::Clip => "clip",
            Kind::Skeleton => "skeleton",
            Kind::Reply => "reply",
        }
    }

    fn names(self) -> Vec<String> {
        let mut names: Vec<String> = self.entries().keys().cloned().collect();
        names.sort();
        names
    }

    /// Manifest-relative path of `name`.
    fn relative(self, name: &str) -> Result<&'static str> {
        self.entries()
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("no {} fixture named '{name}'", self.label()))
    }

    fn text(self, name: &str) -> Result<String> {
        read_fixture(self.relative(name)?)
    }
}

fn absolute(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../../fixtures")
        .join(rel)
}

fn read_fixture(rel: &str) -> Result<String> {
    let path = absolute(rel);
    fs::read_to_string(&path).with_context(|| format!("reading fixture {}", path.display()))
}

/// Keyframe clips in the three.js JSON shape.
pub mod clips {
    use super::*;

    pub fn keys() -> Vec<String> {
        Kind::Clip.names()
    }

    pub fn json(name: &str) -> Result<String> {
        Kind::Clip.text(name)
    }

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        json(name).map(String::into_bytes)
    }

    /// Manifest-relative path, usable as an asset URL in tests.
    pub fn url(name: &str) -> Result<String> {
        Kind::Clip.relative(name).map(str::to_string)
    }

    /// Contents for every clip keyed by its manifest-relative path.
    pub fn by_url() -> Result<HashMap<String, Vec<u8>>> {
        let mut out = HashMap::new();
        for rel in MANIFEST.clips.values() {
            out.insert(rel.clone(), read_fixture(rel)?.into_bytes());
        }
        Ok(out)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        Kind::Clip.relative(name).map(absolute)
    }
}

pub mod skeletons {
    use super::*;

    pub fn keys() -> Vec<String> {
        Kind::Skeleton.names()
    }

    pub fn json(name: &str) -> Result<String> {
        Kind::Skeleton.text(name)
    }
}

/// Conversational backend replies (speech, lip-sync, emotion, clip refs).
pub mod replies {
    use super::*;

    pub fn keys() -> Vec<String> {
        Kind::Reply.names()
    }

    pub fn json(name: &str) -> Result<String> {
        Kind::Reply.text(name)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let text = json(name)?;
        serde_json::from_str(&text).with_context(|| format!("decoding reply fixture '{name}'"))
    }
}
