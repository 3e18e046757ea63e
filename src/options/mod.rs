//! The canonical `TransformOptions` model (C10's output type).
//!
//! `TransformOptions` is the single materialized representation of request intent
//! that every downstream component (Key Utility, Transform Client, Cache-Tag
//! Generator) consumes. It is always fully resolved before it reaches any of them —
//! no component re-derives intent from the raw request.

pub mod resolver;

use serde::{Deserialize, Serialize};

/// The transformation family requested. Exhaustive enumeration replaces the
/// reflection-driven mode dispatch the original system used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// Full video transcode/resize.
    Video,
    /// A single extracted frame.
    Frame,
    /// A contact-sheet grid of frames.
    Spritesheet,
    /// Audio-only extraction.
    Audio,
}

impl Default for TransformMode {
    fn default() -> Self {
        TransformMode::Video
    }
}

impl TransformMode {
    /// Lower-case identifier used in cache keys, tags, and the query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Video => "video",
            TransformMode::Frame => "frame",
            TransformMode::Spritesheet => "spritesheet",
            TransformMode::Audio => "audio",
        }
    }

    /// Parse the `mode` query parameter, rejecting anything outside the enumeration.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(TransformMode::Video),
            "frame" => Some(TransformMode::Frame),
            "spritesheet" => Some(TransformMode::Spritesheet),
            "audio" => Some(TransformMode::Audio),
            _ => None,
        }
    }
}

/// How a derivative's dimensions came to be selected, recorded for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappedFrom {
    /// Selected by the IMQuery resolver (C9).
    Imquery,
    /// Selected explicitly via the `derivative` query parameter.
    Explicit,
}

/// The fully resolved, materialized transform request.
///
/// Once the Option Resolver (and, when applicable, the IMQuery Resolver) have run,
/// every subsequent component treats this struct as ground truth: the key derivation,
/// the upstream URL, the cache tags, and the stored metadata all read from here rather
/// than re-inspecting the raw request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Transformation family.
    pub mode: TransformMode,
    /// Named derivative, if one was resolved (explicitly or via IMQuery).
    pub derivative: Option<String>,
    /// Canonical width in pixels.
    pub width: Option<u32>,
    /// Canonical height in pixels.
    pub height: Option<u32>,
    /// Quality preset.
    pub quality: Option<String>,
    /// Compression preset.
    pub compression: Option<String>,
    /// Container/codec format.
    pub format: Option<String>,
    /// Frame/audio start offset, as a duration string (e.g. `"5s"`).
    pub time: Option<String>,
    /// Clip duration, as a duration string.
    pub duration: Option<String>,
    /// Spritesheet column count.
    pub cols: Option<u32>,
    /// Spritesheet row count.
    pub rows: Option<u32>,
    /// Spritesheet sampling interval, as a duration string.
    pub interval: Option<String>,
    /// Cache-busting version; resolved separately by the Version Store, defaults to 1.
    pub version: u32,
    /// Pre-resolution requested width, preserved for diagnostics when IMQuery remaps it.
    pub requested_width: Option<u32>,
    /// Pre-resolution requested height, preserved for diagnostics when IMQuery remaps it.
    pub requested_height: Option<u32>,
    /// Provenance of the resolved derivative, if any.
    pub mapped_from: Option<MappedFrom>,
    /// Whether the inbound request carried any recognized IMQuery parameter.
    pub imquery: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            mode: TransformMode::default(),
            derivative: None,
            width: None,
            height: None,
            quality: None,
            compression: None,
            format: None,
            time: None,
            duration: None,
            cols: None,
            rows: None,
            interval: None,
            version: 1,
            requested_width: None,
            requested_height: None,
            mapped_from: None,
            imquery: false,
        }
    }
}

impl TransformOptions {
    /// True if a derivative has been resolved — per the Data Model invariant, once
    /// true, `width`/`height`/`quality`/`compression`/`format` reflect the
    /// derivative's canonical values rather than the raw request.
    pub fn has_derivative(&self) -> bool {
        self.derivative.is_some()
    }
}
