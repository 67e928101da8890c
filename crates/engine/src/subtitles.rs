//! Caption pacing: narration text is cut into short word groups that share the
//! narration time evenly, each with a size class and an entrance animation.

use serde::{Deserialize, Serialize};

use crate::timeline::Resolution;

pub const MAX_WORDS_PER_SEGMENT: usize = 6;

const LANDSCAPE_BASE_FONT: u32 = 65;
const PORTRAIT_BASE_FONT: u32 = 45;
const FADE_OUT_SECS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FontClass {
    Emphasized,
    Supporting,
    Regular,
}

impl FontClass {
    pub fn for_index(index: usize, total: usize) -> Self {
        if total <= 1 {
            FontClass::Regular
        } else if index % 2 == 0 {
            FontClass::Emphasized
        } else {
            FontClass::Supporting
        }
    }

    pub fn scale(&self) -> f64 {
        match self {
            FontClass::Emphasized => 1.3,
            FontClass::Supporting => 0.85,
            FontClass::Regular => 1.0,
        }
    }

    pub fn size(&self, base: u32) -> u32 {
        (base as f64 * self.scale()) as u32
    }
}

/// Wider frames get a larger base size; an explicit override wins.
pub fn base_font_size(frame: Resolution, override_size: Option<u32>) -> u32 {
    match override_size {
        Some(size) => size,
        None if frame.is_landscape() => LANDSCAPE_BASE_FONT,
        None => PORTRAIT_BASE_FONT,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Animation {
    PopScale,
    SlideFade,
    Bounce,
    ZoomFade,
}

/// Scale curve applied to the caption during its entrance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleCurve {
    Constant,
    /// Linear from `from` to 1.0 over `over` seconds.
    Linear { from: f64, over: f64 },
    /// Rises from 0.7 towards 1.2 over `over` seconds, then snaps to 1.0.
    Bounce { over: f64 },
}

impl ScaleCurve {
    pub fn value_at(&self, t: f64) -> f64 {
        match *self {
            ScaleCurve::Constant => 1.0,
            ScaleCurve::Linear { from, over } => {
                if t < over {
                    from + (1.0 - from) * (t / over)
                } else {
                    1.0
                }
            }
            ScaleCurve::Bounce { over } => {
                if t < over {
                    let p = t / over;
                    0.7 + 0.5 * (1.0 - (p - 1.0).powi(2))
                } else {
                    1.0
                }
            }
        }
    }
}

impl Animation {
    pub const ALL: [Animation; 4] = [
        Animation::PopScale,
        Animation::SlideFade,
        Animation::Bounce,
        Animation::ZoomFade,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }

    pub fn scale_curve(&self, duration_secs: f64) -> ScaleCurve {
        match self {
            Animation::PopScale => ScaleCurve::Linear {
                from: 0.5,
                over: (duration_secs * 0.3).min(0.2),
            },
            Animation::SlideFade => ScaleCurve::Constant,
            Animation::Bounce => ScaleCurve::Bounce { over: 0.25 },
            Animation::ZoomFade => ScaleCurve::Linear { from: 0.6, over: 0.15 },
        }
    }

    pub fn fade_in_secs(&self) -> f64 {
        match self {
            Animation::SlideFade => 0.15,
            Animation::ZoomFade => 0.1,
            Animation::PopScale | Animation::Bounce => 0.0,
        }
    }

    /// Every variant fades out, unless the caption is too short to notice.
    pub fn fade_out_secs(&self, duration_secs: f64) -> f64 {
        if duration_secs > 0.3 {
            FADE_OUT_SECS
        } else {
            0.0
        }
    }

    /// Horizontal slide distance as a fraction of frame width, and its length.
    pub fn slide(&self) -> Option<(f64, f64)> {
        match self {
            Animation::SlideFade => Some((0.1, 0.2)),
            _ => None,
        }
    }

    pub fn alpha_at(&self, t: f64, duration_secs: f64) -> f64 {
        let fade_in = self.fade_in_secs();
        let fade_out = self.fade_out_secs(duration_secs);
        let rising = if fade_in > 0.0 && t < fade_in { t / fade_in } else { 1.0 };
        let falling = if fade_out > 0.0 && t > duration_secs - fade_out {
            (duration_secs - t) / fade_out
        } else {
            1.0
        };
        rising.min(falling).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub index: usize,
    pub text: String,
    /// Offset from the start of the scene.
    pub start_ticks: i64,
    pub duration_ticks: i64,
    pub font_class: FontClass,
    pub animation: Animation,
}

impl SubtitleSegment {
    pub fn end_ticks(&self) -> i64 {
        self.start_ticks + self.duration_ticks
    }
}

/// Word groups of at most `MAX_WORDS_PER_SEGMENT`, split on whitespace.
pub fn chunk_words(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(MAX_WORDS_PER_SEGMENT)
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// Spreads `duration_ticks` evenly across the chunks of `text`. Leftover ticks
/// from the integer division go one each to the leading segments, so the
/// durations always add up to the full scene.
pub fn pace_subtitles(text: &str, duration_ticks: i64) -> Vec<SubtitleSegment> {
    let chunks = chunk_words(text);
    if chunks.is_empty() || duration_ticks <= 0 {
        return Vec::new();
    }

    let count = chunks.len();
    let base = duration_ticks / count as i64;
    let remainder = duration_ticks % count as i64;

    let mut cursor = 0i64;
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let duration = base + if (index as i64) < remainder { 1 } else { 0 };
            let segment = SubtitleSegment {
                index,
                text,
                start_ticks: cursor,
                duration_ticks: duration,
                font_class: FontClass::for_index(index, count),
                animation: Animation::for_index(index),
            };
            cursor += duration;
            segment
        })
        .collect()
}

/// Greedy word wrap against an average glyph width of 0.55 em.
pub fn wrap_caption(text: &str, font_size: u32, max_width_px: u32) -> String {
    let glyph_px = (font_size as f64 * 0.55).max(1.0);
    let max_chars = ((max_width_px as f64 / glyph_px).floor() as usize).max(1);

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}
