use serde::{Deserialize, Serialize};

use crate::timeline::Resolution;

/// Uniform scale that covers the target frame, followed by a centered crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameFit {
    pub scale: f64,
    pub scaled: Resolution,
    pub crop_x: u32,
    pub crop_y: u32,
    pub output: Resolution,
}

/// Returns `None` for degenerate source or target sizes.
pub fn fit_to_frame(source: Resolution, target: Resolution) -> Option<FrameFit> {
    if source.width == 0 || source.height == 0 || target.width == 0 || target.height == 0 {
        return None;
    }

    let width_ratio = target.width as f64 / source.width as f64;
    let height_ratio = target.height as f64 / source.height as f64;
    let scale = width_ratio.max(height_ratio);

    // Rounding can land one pixel short of the frame; never let that letterbox.
    let scaled = Resolution {
        width: ((source.width as f64 * scale).round() as u32).max(target.width),
        height: ((source.height as f64 * scale).round() as u32).max(target.height),
    };

    Some(FrameFit {
        scale,
        scaled,
        crop_x: (scaled.width - target.width) / 2,
        crop_y: (scaled.height - target.height) / 2,
        output: target,
    })
}

/// Linear zoom from 1.0 to `1 + zoom_factor` over the clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KenBurns {
    pub zoom_factor: f64,
    pub duration_ticks: i64,
}

impl KenBurns {
    pub fn new(zoom_factor: f64, duration_ticks: i64) -> Option<Self> {
        if zoom_factor <= 0.0 || duration_ticks <= 0 {
            return None;
        }
        Some(KenBurns {
            zoom_factor,
            duration_ticks,
        })
    }

    pub fn scale_at(&self, ticks: i64) -> f64 {
        let progress = (ticks as f64 / self.duration_ticks as f64).clamp(0.0, 1.0);
        1.0 + self.zoom_factor * progress
    }

    pub fn frame_count(&self, fps: u32) -> u64 {
        let frames = self.duration_ticks as f64 * fps as f64 / crate::timeline::TICKS_PER_SECOND as f64;
        (frames.round() as u64).max(1)
    }
}
