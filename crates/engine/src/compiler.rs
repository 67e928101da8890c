use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::framing::{fit_to_frame, KenBurns};
use crate::subtitles::{wrap_caption, SubtitleSegment};
use crate::timeline::*;

/// Per-scene composition stages, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStage {
    LoadVisual,
    FitToFrame,
    ApplyZoom,
    AttachAudio,
    OverlaySubtitles,
    ApplyCrossfade,
    Append,
}

impl fmt::Display for ComposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComposeStage::LoadVisual => "load visual",
            ComposeStage::FitToFrame => "fit to frame",
            ComposeStage::ApplyZoom => "apply zoom",
            ComposeStage::AttachAudio => "attach audio",
            ComposeStage::OverlaySubtitles => "overlay subtitles",
            ComposeStage::ApplyCrossfade => "apply crossfade",
            ComposeStage::Append => "append",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("no scenes to compose")]
    Empty,
    #[error("scene {index}: {stage} failed: {reason}")]
    Scene {
        index: usize,
        stage: ComposeStage,
        reason: String,
    },
}

/// A subtitle segment paired with the font file that can render it.
#[derive(Debug, Clone)]
pub struct StyledSegment {
    pub segment: SubtitleSegment,
    pub font_file: PathBuf,
    pub font_size: u32,
}

/// Everything the composer needs about one resolved scene.
#[derive(Debug, Clone)]
pub struct SceneInput {
    pub index: usize,
    pub planned_ticks: i64,
    pub visual: Option<VisualSource>,
    pub narration: PathBuf,
    pub narration_ticks: i64,
    pub sfx: Option<PathBuf>,
    pub captions: Vec<StyledSegment>,
}

#[derive(Debug, Clone)]
pub struct MusicInput {
    pub path: PathBuf,
    pub source_ticks: i64,
}

/// Builds the full timeline from resolved scenes, in the given order.
///
/// Each clip lasts at least as long as its narration plus the crossfade that
/// will eat into its tail, and never less than its planned duration. Clips
/// after the first fade in and start `crossfade` before the previous clip
/// ends, so neighbours dissolve instead of cutting.
pub fn compile_timeline(
    scenes: Vec<SceneInput>,
    music: Option<MusicInput>,
    settings: RenderSettings,
    caption_style: CaptionStyle,
) -> Result<Timeline, CompileError> {
    if scenes.is_empty() {
        return Err(CompileError::Empty);
    }

    let mut timeline = Timeline::new(settings, caption_style);
    let count = scenes.len();
    let mut cursor = 0i64;

    for (position, scene) in scenes.into_iter().enumerate() {
        let is_first = position == 0;
        let is_last = position + 1 == count;
        let clip = compose_scene(scene, &timeline.settings, is_first, is_last, &mut cursor)?;
        timeline.clips.push(clip);
    }

    let total = timeline.duration_ticks();
    timeline.music = music.and_then(|m| {
        MusicBed::covering(m.path, m.source_ticks, total, timeline.settings.music_gain)
    });

    Ok(timeline)
}

fn compose_scene(
    scene: SceneInput,
    settings: &RenderSettings,
    is_first: bool,
    is_last: bool,
    cursor: &mut i64,
) -> Result<SceneClip, CompileError> {
    let index = scene.index;
    let fail = |stage: ComposeStage, reason: &str| CompileError::Scene {
        index,
        stage,
        reason: reason.to_string(),
    };

    let visual = scene
        .visual
        .ok_or_else(|| fail(ComposeStage::LoadVisual, "scene has neither image nor video"))?;

    let fit = fit_to_frame(visual.size, settings.resolution).ok_or_else(|| {
        fail(
            ComposeStage::FitToFrame,
            &format!("unusable source size {}x{}", visual.size.width, visual.size.height),
        )
    })?;

    if scene.narration_ticks <= 0 {
        return Err(fail(ComposeStage::AttachAudio, "narration has no duration"));
    }
    let crossfade = settings.crossfade_ticks.max(0);
    let tail = if is_last { 0 } else { crossfade };
    let duration_ticks = scene
        .planned_ticks
        .max(scene.narration_ticks + tail)
        .max(crossfade * 2 + 1);

    let zoom = KenBurns::new(settings.zoom_factor, duration_ticks);

    let caption_width = settings.resolution.width * 9 / 10;
    let captions = scene
        .captions
        .into_iter()
        .filter(|c| c.segment.start_ticks < duration_ticks)
        .map(|c| CaptionEvent {
            start_ticks: c.segment.start_ticks,
            end_ticks: c.segment.end_ticks().min(duration_ticks),
            text: wrap_caption(&c.segment.text, c.font_size, caption_width),
            font_file: c.font_file,
            font_size: c.font_size,
            animation: c.segment.animation,
        })
        .collect();

    let fade_in_ticks = if is_first { 0 } else { crossfade };
    let timeline_start_ticks = if is_first { 0 } else { *cursor - crossfade };
    *cursor = timeline_start_ticks + duration_ticks;

    Ok(SceneClip {
        index,
        visual,
        fit,
        zoom,
        narration: scene.narration,
        sfx: scene.sfx,
        timeline_start_ticks,
        duration_ticks,
        fade_in_ticks,
        captions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitles::pace_subtitles;

    fn settings() -> RenderSettings {
        RenderSettings::new(Resolution::new(1920, 1080))
    }

    fn scene(index: usize, planned_secs: f64, narration_secs: f64) -> SceneInput {
        SceneInput {
            index,
            planned_ticks: secs_to_ticks(planned_secs),
            visual: Some(VisualSource {
                kind: VisualKind::Image,
                path: PathBuf::from(format!("scene_{index}.png")),
                size: Resolution::new(3000, 2000),
            }),
            narration: PathBuf::from(format!("scene_{index}.mp3")),
            narration_ticks: secs_to_ticks(narration_secs),
            sfx: None,
            captions: Vec::new(),
        }
    }

    #[test]
    fn scenes_overlap_by_the_crossfade() {
        let timeline = compile_timeline(
            vec![scene(0, 10.0, 5.0), scene(1, 10.0, 5.0), scene(2, 10.0, 5.0)],
            None,
            settings(),
            CaptionStyle::default(),
        )
        .unwrap();

        let crossfade = secs_to_ticks(0.6);
        let clips = &timeline.clips;
        assert_eq!(clips[0].timeline_start_ticks, 0);
        assert_eq!(clips[0].fade_in_ticks, 0);
        for pair in clips.windows(2) {
            assert_eq!(pair[1].timeline_start_ticks, pair[0].end_ticks() - crossfade);
            assert_eq!(pair[1].fade_in_ticks, crossfade);
        }
        assert_eq!(timeline.duration_ticks(), secs_to_ticks(30.0) - 2 * crossfade);
    }

    #[test]
    fn clips_never_end_before_their_narration() {
        let timeline = compile_timeline(
            vec![scene(0, 3.0, 7.5), scene(1, 3.0, 4.0)],
            None,
            settings(),
            CaptionStyle::default(),
        )
        .unwrap();
        let crossfade = secs_to_ticks(0.6);
        // The first clip keeps its narration clear of the next fade-in.
        assert_eq!(timeline.clips[0].duration_ticks, secs_to_ticks(7.5) + crossfade);
        assert_eq!(timeline.clips[1].duration_ticks, secs_to_ticks(4.0));
        for clip in &timeline.clips {
            assert!(clip.duration_ticks >= secs_to_ticks(3.0));
        }
    }

    #[test]
    fn every_clip_is_fitted_and_zoomed() {
        let timeline = compile_timeline(
            vec![scene(0, 5.0, 4.0)],
            None,
            settings(),
            CaptionStyle::default(),
        )
        .unwrap();
        let clip = &timeline.clips[0];
        assert_eq!(clip.fit.output, Resolution::new(1920, 1080));
        let zoom = clip.zoom.unwrap();
        assert!((zoom.scale_at(clip.duration_ticks) - 1.04).abs() < 1e-12);
    }

    #[test]
    fn background_music_covers_the_assembled_length() {
        let mut no_fade = settings();
        no_fade.crossfade_ticks = 0;
        let timeline = compile_timeline(
            vec![scene(0, 20.0, 5.0), scene(1, 15.0, 5.0)],
            Some(MusicInput {
                path: PathBuf::from("bg.mp3"),
                source_ticks: secs_to_ticks(10.0),
            }),
            no_fade,
            CaptionStyle::default(),
        )
        .unwrap();
        let music = timeline.music.unwrap();
        assert_eq!(music.duration_ticks, secs_to_ticks(35.0));
        assert_eq!(music.repeats, 4);
        assert!((music.gain - 0.3).abs() < 1e-12);
    }

    #[test]
    fn captions_are_wrapped_and_kept_inside_the_clip() {
        let mut input = scene(0, 4.0, 4.0);
        input.captions = pace_subtitles("one two three four five six seven", secs_to_ticks(4.0))
            .into_iter()
            .map(|segment| StyledSegment {
                segment,
                font_file: PathBuf::from("/fonts/DejaVuSans.ttf"),
                font_size: 84,
            })
            .collect();
        let timeline =
            compile_timeline(vec![input], None, settings(), CaptionStyle::default()).unwrap();
        let captions = &timeline.clips[0].captions;
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[1].end_ticks, secs_to_ticks(4.0));
        assert_eq!(captions[0].start_ticks, 0);
    }

    #[test]
    fn missing_visual_is_reported_with_its_stage() {
        let mut input = scene(3, 4.0, 4.0);
        input.visual = None;
        let err = compile_timeline(vec![input], None, settings(), CaptionStyle::default())
            .unwrap_err();
        match err {
            CompileError::Scene { index, stage, .. } => {
                assert_eq!(index, 3);
                assert_eq!(stage, ComposeStage::LoadVisual);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_scene_list_is_rejected() {
        assert!(matches!(
            compile_timeline(Vec::new(), None, settings(), CaptionStyle::default()),
            Err(CompileError::Empty)
        ));
    }
}
