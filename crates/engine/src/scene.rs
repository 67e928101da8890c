use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::subtitles::SubtitleSegment;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneAssets {
    pub image: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub narration_audio: Option<PathBuf>,
    pub sound_effect: Option<PathBuf>,
}

/// One timed unit of narrative. Drafted by the planner, filled in during
/// asset resolution, read by the composer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub title: String,
    pub narration: String,
    pub visual_prompt: String,
    pub search_query: Option<String>,
    pub music_keywords: Option<String>,
    pub sfx_keywords: Option<String>,
    pub duration_secs: f64,
    pub subtitle: Option<String>,
    #[serde(default)]
    pub assets: SceneAssets,
    #[serde(default)]
    pub narration_secs: Option<f64>,
    #[serde(default)]
    pub subtitles: Vec<SubtitleSegment>,
}

impl Scene {
    pub fn draft(
        title: impl Into<String>,
        narration: impl Into<String>,
        visual_prompt: impl Into<String>,
        duration_secs: f64,
    ) -> Self {
        Scene {
            title: title.into(),
            narration: narration.into(),
            visual_prompt: visual_prompt.into(),
            search_query: None,
            music_keywords: None,
            sfx_keywords: None,
            duration_secs,
            subtitle: None,
            assets: SceneAssets::default(),
            narration_secs: None,
            subtitles: Vec::new(),
        }
    }

    pub fn subtitle_text(&self) -> &str {
        self.subtitle.as_deref().unwrap_or(&self.narration)
    }

    pub fn is_render_eligible(&self) -> bool {
        self.assets.narration_audio.is_some()
            && (self.assets.image.is_some() || self.assets.video.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_needs_narration_and_a_visual() {
        let mut scene = Scene::draft("Shore", "Waves arrive.", "a calm shore", 5.0);
        assert!(!scene.is_render_eligible());

        scene.assets.image = Some(PathBuf::from("scene_0.png"));
        assert!(!scene.is_render_eligible());

        scene.assets.narration_audio = Some(PathBuf::from("scene_0.mp3"));
        assert!(scene.is_render_eligible());

        scene.assets.image = None;
        scene.assets.video = Some(PathBuf::from("scene_0.mp4"));
        assert!(scene.is_render_eligible());
    }

    #[test]
    fn subtitle_defaults_to_narration() {
        let mut scene = Scene::draft("Shore", "Waves arrive.", "a calm shore", 5.0);
        assert_eq!(scene.subtitle_text(), "Waves arrive.");
        scene.subtitle = Some("Waves.".to_string());
        assert_eq!(scene.subtitle_text(), "Waves.");
    }
}
