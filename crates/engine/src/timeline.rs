use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::framing::{FrameFit, KenBurns};
use crate::subtitles::Animation;

pub const TICKS_PER_SECOND: i64 = 48000;

pub fn secs_to_ticks(secs: f64) -> i64 {
    (secs * TICKS_PER_SECOND as f64).round() as i64
}

pub fn ticks_to_secs(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    pub fps: u32,
    pub resolution: Resolution,
    pub sample_rate: u32,
    pub crossfade_ticks: i64,
    pub zoom_factor: f64,
    pub music_gain: f64,
    pub sfx_gain: f64,
}

impl RenderSettings {
    pub fn new(resolution: Resolution) -> Self {
        RenderSettings {
            fps: 24,
            resolution,
            sample_rate: 44100,
            crossfade_ticks: secs_to_ticks(0.6),
            zoom_factor: 0.04,
            music_gain: 0.3,
            sfx_gain: 0.35,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualKind {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualSource {
    pub kind: VisualKind,
    pub path: PathBuf,
    pub size: Resolution,
}

/// Caption drawn over a scene clip. Ticks are relative to the clip start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionEvent {
    pub start_ticks: i64,
    pub end_ticks: i64,
    pub text: String,
    pub font_file: PathBuf,
    pub font_size: u32,
    pub animation: Animation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionStyle {
    pub color: String,
    pub stroke_color: String,
    pub stroke_width: u32,
    pub top_margin: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        CaptionStyle {
            color: "white".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 1,
            top_margin: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneClip {
    pub index: usize,
    pub visual: VisualSource,
    pub fit: FrameFit,
    pub zoom: Option<KenBurns>,
    pub narration: PathBuf,
    pub sfx: Option<PathBuf>,
    pub timeline_start_ticks: i64,
    pub duration_ticks: i64,
    pub fade_in_ticks: i64,
    pub captions: Vec<CaptionEvent>,
}

impl SceneClip {
    pub fn end_ticks(&self) -> i64 {
        self.timeline_start_ticks + self.duration_ticks
    }
}

/// Background music looped by whole repeats of the source, then trimmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicBed {
    pub path: PathBuf,
    pub source_ticks: i64,
    pub repeats: u64,
    pub duration_ticks: i64,
    pub gain: f64,
}

impl MusicBed {
    /// Returns `None` when the source has no usable length.
    pub fn covering(path: PathBuf, source_ticks: i64, total_ticks: i64, gain: f64) -> Option<Self> {
        if source_ticks <= 0 || total_ticks <= 0 {
            return None;
        }
        let whole = total_ticks / source_ticks;
        let repeats = (whole + i64::from(total_ticks % source_ticks != 0))
            .max(1)
            .unsigned_abs();
        Some(MusicBed {
            path,
            source_ticks,
            repeats,
            duration_ticks: total_ticks,
            gain,
        })
    }

    pub fn covered_ticks(&self) -> i64 {
        self.source_ticks
            .saturating_mul(i64::try_from(self.repeats).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub settings: RenderSettings,
    pub caption_style: CaptionStyle,
    pub clips: Vec<SceneClip>,
    pub music: Option<MusicBed>,
}

impl Timeline {
    pub fn new(settings: RenderSettings, caption_style: CaptionStyle) -> Self {
        Timeline {
            settings,
            caption_style,
            clips: Vec::new(),
            music: None,
        }
    }

    pub fn duration_ticks(&self) -> i64 {
        self.clips.iter().map(|c| c.end_ticks()).max().unwrap_or(0)
    }
}
