use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::timeline::Resolution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaClass {
    Image,
    Video,
    Audio,
}

impl MediaClass {
    /// Floor that rejects truncated transfers; it does not validate codecs.
    pub fn min_bytes(&self) -> usize {
        match self {
            MediaClass::Image => 1024,
            MediaClass::Video => 100 * 1024,
            MediaClass::Audio => 50_000,
        }
    }

    fn mime_prefix(&self) -> &'static str {
        match self {
            MediaClass::Image => "image/",
            MediaClass::Video => "video/",
            MediaClass::Audio => "audio/",
        }
    }
}

impl fmt::Display for MediaClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaClass::Image => "image",
            MediaClass::Video => "video",
            MediaClass::Audio => "audio",
        })
    }
}

/// The slots a scene (or job) can fill from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
    Music,
    SoundEffect,
}

impl AssetKind {
    pub fn media_class(&self) -> MediaClass {
        match self {
            AssetKind::Image => MediaClass::Image,
            AssetKind::Video => MediaClass::Video,
            AssetKind::Music | AssetKind::SoundEffect => MediaClass::Audio,
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AssetKind::Image => "png",
            AssetKind::Video => "mp4",
            AssetKind::Music | AssetKind::SoundEffect => "mp3",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
            AssetKind::Music => "music",
            AssetKind::SoundEffect => "sound effect",
        })
    }
}

/// One ranked option for filling an asset slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetCandidate {
    pub source: String,
    pub locator: String,
    pub size: Option<Resolution>,
    pub duration_secs: Option<f64>,
}

impl AssetCandidate {
    pub fn new(source: impl Into<String>, locator: impl Into<String>) -> Self {
        AssetCandidate {
            source: source.into(),
            locator: locator.into(),
            size: None,
            duration_secs: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(Resolution::new(width, height));
        self
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn label(&self) -> String {
        match self.size {
            Some(size) => format!("{} {}x{}", self.source, size.width, size.height),
            None => self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetHint {
    pub frame: Resolution,
    pub duration_secs: Option<f64>,
}

/// Orders candidates so the closest match to the target comes first:
/// candidates that cover the frame (smallest such first), then smaller
/// alternatives from largest down, then candidates without size metadata.
/// Duration distance breaks ties. The sort is stable, so provider order
/// survives among equals.
pub fn rank_candidates(candidates: &mut [AssetCandidate], target: &TargetHint) {
    candidates.sort_by(|a, b| {
        let (tier_a, fit_a) = resolution_key(a, target.frame);
        let (tier_b, fit_b) = resolution_key(b, target.frame);
        tier_a
            .cmp(&tier_b)
            .then(fit_a.cmp(&fit_b))
            .then_with(|| {
                let da = duration_distance(a, target.duration_secs);
                let db = duration_distance(b, target.duration_secs);
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
    });
}

fn resolution_key(candidate: &AssetCandidate, frame: Resolution) -> (u8, i128) {
    match candidate.size {
        Some(size) if size.width >= frame.width && size.height >= frame.height => {
            (0, size.area() as i128 - frame.area() as i128)
        }
        Some(size) => (1, -(size.area() as i128)),
        None => (2, 0),
    }
}

fn duration_distance(candidate: &AssetCandidate, target: Option<f64>) -> f64 {
    match (candidate.duration_secs, target) {
        (Some(have), Some(want)) => (have - want).abs(),
        _ => 0.0,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("payload is empty")]
    Empty,
    #[error("{class} payload too small: {size} bytes (minimum {min})")]
    TooSmall {
        class: MediaClass,
        size: usize,
        min: usize,
    },
    #[error("expected {class} content, got `{declared}`")]
    ContentTypeMismatch { class: MediaClass, declared: String },
    #[error("payload is not recognizable as {class}")]
    Unrecognized { class: MediaClass },
}

/// Rejects empty, truncated, or mistyped payloads. An explicit media type
/// must match the expected class; a missing or generic one falls back to
/// sniffing the leading bytes.
pub fn validate_payload(
    bytes: &[u8],
    class: MediaClass,
    declared_type: Option<&str>,
) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() < class.min_bytes() {
        return Err(ValidationError::TooSmall {
            class,
            size: bytes.len(),
            min: class.min_bytes(),
        });
    }

    let essence = declared_type
        .and_then(|t| t.split(';').next())
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());

    match essence {
        Some(t) if t.starts_with(class.mime_prefix()) => Ok(()),
        Some(t) if is_media_type(&t) => Err(ValidationError::ContentTypeMismatch {
            class,
            declared: t,
        }),
        _ => match sniff_media_class(bytes) {
            Some(found) if found == class => Ok(()),
            Some(found) => Err(ValidationError::ContentTypeMismatch {
                class,
                declared: found.to_string(),
            }),
            None => Err(ValidationError::Unrecognized { class }),
        },
    }
}

fn is_media_type(essence: &str) -> bool {
    ["image/", "video/", "audio/", "text/"]
        .iter()
        .any(|prefix| essence.starts_with(prefix))
        || essence == "application/json"
}

/// Identifies common container signatures.
pub fn sniff_media_class(bytes: &[u8]) -> Option<MediaClass> {
    let starts = |sig: &[u8]| bytes.starts_with(sig);

    if starts(b"\x89PNG\r\n\x1a\n") || starts(b"\xFF\xD8\xFF") || starts(b"GIF8") {
        return Some(MediaClass::Image);
    }
    if starts(b"RIFF") && bytes.len() >= 12 {
        return match &bytes[8..12] {
            b"WEBP" => Some(MediaClass::Image),
            b"WAVE" => Some(MediaClass::Audio),
            b"AVI " => Some(MediaClass::Video),
            _ => None,
        };
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return match &bytes[8..12] {
            b"M4A " | b"M4B " => Some(MediaClass::Audio),
            _ => Some(MediaClass::Video),
        };
    }
    if starts(b"\x1A\x45\xDF\xA3") {
        return Some(MediaClass::Video);
    }
    if starts(b"ID3") || starts(b"OggS") || starts(b"fLaC") {
        return Some(MediaClass::Audio);
    }
    // Bare MPEG audio frame sync.
    if bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0 {
        return Some(MediaClass::Audio);
    }
    None
}
