use thiserror::Error;

use crate::scene::Scene;

pub const MIN_SCENE_SECS: f64 = 3.0;

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("planning service returned no scenes")]
    NoScenes,
    #[error("target duration must be positive, got {0}")]
    InvalidTarget(f64),
}

/// Keeps the first `max_scenes` scenes (trailing scenes are dropped, not
/// sampled), then rescales every duration by `target / sum(raw)` and floors
/// the result at `MIN_SCENE_SECS`. The floor can push the total slightly over
/// the target; that drift is accepted.
pub fn normalize_durations(
    mut scenes: Vec<Scene>,
    target_total_secs: f64,
    max_scenes: usize,
) -> Result<Vec<Scene>, NormalizeError> {
    if !target_total_secs.is_finite() || target_total_secs <= 0.0 {
        return Err(NormalizeError::InvalidTarget(target_total_secs));
    }

    scenes.truncate(max_scenes);
    if scenes.is_empty() {
        return Err(NormalizeError::NoScenes);
    }

    // Raw estimates from the planner are floored before they are summed.
    for scene in scenes.iter_mut() {
        scene.duration_secs = if scene.duration_secs.is_finite() {
            scene.duration_secs.max(MIN_SCENE_SECS)
        } else {
            MIN_SCENE_SECS
        };
    }

    let raw_total: f64 = scenes.iter().map(|s| s.duration_secs).sum();
    let scale = target_total_secs / raw_total;
    for scene in scenes.iter_mut() {
        scene.duration_secs = (scene.duration_secs * scale).max(MIN_SCENE_SECS);
    }

    Ok(scenes)
}
