use engine::compiler::{compile_timeline, MusicInput, SceneInput, StyledSegment};
use engine::subtitles::base_font_size;
use engine::timeline::{secs_to_ticks, Timeline};
use tracing::warn;

use super::PreparedScene;
use crate::config::{Aspect, Settings};
use crate::error::PipelineError;
use crate::media::fonts::{locate_with_fallback, TypefaceLocator};

/// Turns prepared scenes into a timeline: sizes and locates a typeface for
/// every subtitle segment, then hands layout to the engine.
pub(crate) async fn build_timeline(
    prepared: Vec<PreparedScene>,
    music: Option<MusicInput>,
    settings: &Settings,
    aspect: Aspect,
    fonts: &dyn TypefaceLocator,
) -> Result<Timeline, PipelineError> {
    let base_size = base_font_size(settings.frame_size(aspect), settings.subtitle_fontsize);

    let mut inputs = Vec::with_capacity(prepared.len());
    for prepared in prepared {
        let narration = match &prepared.scene.assets.narration_audio {
            Some(path) if prepared.scene.is_render_eligible() => path.clone(),
            _ => {
                return Err(PipelineError::Render(format!(
                    "scene {} is missing narration or a visual",
                    prepared.index
                )))
            }
        };
        let captions = style_captions(&prepared, base_size, &settings.subtitle_font, fonts).await;

        inputs.push(SceneInput {
            index: prepared.index,
            planned_ticks: secs_to_ticks(prepared.scene.duration_secs),
            visual: Some(prepared.visual),
            narration,
            narration_ticks: prepared.narration_ticks,
            sfx: prepared.scene.assets.sound_effect.clone(),
            captions,
        });
    }

    Ok(compile_timeline(
        inputs,
        music,
        settings.render_settings(aspect),
        settings.caption_style(),
    )?)
}

async fn style_captions(
    prepared: &PreparedScene,
    base_size: u32,
    typeface: &str,
    fonts: &dyn TypefaceLocator,
) -> Vec<StyledSegment> {
    let mut styled = Vec::with_capacity(prepared.scene.subtitles.len());
    for segment in &prepared.scene.subtitles {
        match locate_with_fallback(fonts, typeface).await {
            Ok(font_file) => styled.push(StyledSegment {
                font_size: segment.font_class.size(base_size),
                segment: segment.clone(),
                font_file,
            }),
            Err(e) => warn!(
                scene = prepared.index,
                segment = segment.index,
                error = %e,
                "no usable typeface, dropping subtitle segment"
            ),
        }
    }
    styled
}
