use std::path::{Path, PathBuf};

use crate::compiler::CompileError;
use crate::subtitles::ScaleCurve;
use crate::timeline::{
    ticks_to_secs, CaptionEvent, CaptionStyle, SceneClip, Timeline, VisualKind,
};

/// Encoder parameters for the final file.
#[derive(Debug, Clone)]
pub struct EncodeProfile {
    pub video_codec: String,
    pub audio_codec: String,
    pub video_bitrate: String,
    pub audio_bitrate: String,
    pub preset: String,
    pub threads: u32,
    pub pixel_format: String,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        EncodeProfile {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            video_bitrate: "8000k".to_string(),
            audio_bitrate: "192k".to_string(),
            preset: "slow".to_string(),
            threads: 4,
            pixel_format: "yuv420p".to_string(),
        }
    }
}

/// Two ffmpeg invocations: the audio mix is rendered to a side file first,
/// then the video pass muxes it in.
#[derive(Debug, Clone)]
pub struct RenderCommand {
    pub audio_pass: Vec<String>,
    /// Same mix without music or sound effects. Present only when the full
    /// mix has beds to drop.
    pub narration_only_audio_pass: Option<Vec<String>>,
    pub video_pass: Vec<String>,
    pub temp_audio_path: PathBuf,
    pub output_path: PathBuf,
}

pub fn temp_audio_path(output_path: &Path) -> PathBuf {
    output_path.with_extension("temp-audio.m4a")
}

/// Generate the ffmpeg argument lists for a compiled timeline.
pub fn generate_render_commands(
    timeline: &Timeline,
    output_path: PathBuf,
    profile: &EncodeProfile,
) -> Result<RenderCommand, CompileError> {
    if timeline.clips.is_empty() {
        return Err(CompileError::Empty);
    }

    let temp_audio = temp_audio_path(&output_path);
    let has_beds = timeline.music.is_some() || timeline.clips.iter().any(|c| c.sfx.is_some());

    let audio_pass = audio_pass_args(timeline, &temp_audio, profile, true);
    let narration_only_audio_pass =
        has_beds.then(|| audio_pass_args(timeline, &temp_audio, profile, false));
    let video_pass = video_pass_args(timeline, &temp_audio, &output_path, profile);

    Ok(RenderCommand {
        audio_pass,
        narration_only_audio_pass,
        video_pass,
        temp_audio_path: temp_audio,
        output_path,
    })
}

fn secs(ticks: i64) -> String {
    format!("{:.3}", ticks_to_secs(ticks))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn audio_pass_args(
    timeline: &Timeline,
    temp_audio: &Path,
    profile: &EncodeProfile,
    with_beds: bool,
) -> Vec<String> {
    let settings = &timeline.settings;
    let format = format!(
        "aformat=sample_rates={}:channel_layouts=stereo",
        settings.sample_rate
    );
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
    let mut filters = Vec::new();
    let mut input = 0usize;

    let mut clip_labels = Vec::with_capacity(timeline.clips.len());
    for (k, clip) in timeline.clips.iter().enumerate() {
        let duration = secs(clip.duration_ticks);
        args.push("-i".into());
        args.push(path_arg(&clip.narration));
        filters.push(format!(
            "[{input}:a]{format},apad,atrim=duration={duration},asetpts=PTS-STARTPTS[na{k}]"
        ));
        input += 1;

        match clip.sfx.as_ref().filter(|_| with_beds) {
            Some(sfx) => {
                args.push("-i".into());
                args.push(path_arg(sfx));
                filters.push(format!(
                    "[{input}:a]{format},volume={:.3},apad,atrim=duration={duration},asetpts=PTS-STARTPTS[sx{k}]",
                    settings.sfx_gain
                ));
                filters.push(format!(
                    "[na{k}][sx{k}]amix=inputs=2:duration=first:normalize=0[ca{k}]"
                ));
                input += 1;
                clip_labels.push(format!("ca{k}"));
            }
            None => clip_labels.push(format!("na{k}")),
        }
    }

    let voice = join_audio(&clip_labels, settings.crossfade_ticks, &mut filters);

    let mut out_label = voice.clone();
    if let Some(music) = timeline.music.as_ref().filter(|_| with_beds) {
        args.push("-stream_loop".into());
        args.push(music.repeats.saturating_sub(1).to_string());
        args.push("-i".into());
        args.push(path_arg(&music.path));
        filters.push(format!(
            "[{input}:a]{format},atrim=duration={},asetpts=PTS-STARTPTS,volume={:.3}[music]",
            secs(music.duration_ticks),
            music.gain
        ));
        filters.push(format!(
            "[{voice}][music]amix=inputs=2:duration=first:normalize=0[mix]"
        ));
        out_label = "mix".to_string();
    }

    args.push("-filter_complex".into());
    args.push(filters.join(";"));
    args.push("-map".into());
    args.push(format!("[{out_label}]"));
    args.push("-c:a".into());
    args.push(profile.audio_codec.clone());
    args.push("-b:a".into());
    args.push(profile.audio_bitrate.clone());
    args.push("-ar".into());
    args.push(settings.sample_rate.to_string());
    args.push(path_arg(temp_audio));
    args
}

/// Chains per-clip audio with overlapping crossfades, or plain concat when
/// crossfading is off. Returns the label of the joined stream.
fn join_audio(labels: &[String], crossfade_ticks: i64, filters: &mut Vec<String>) -> String {
    if labels.len() == 1 {
        return labels[0].clone();
    }
    if crossfade_ticks <= 0 {
        let inputs: String = labels.iter().map(|l| format!("[{l}]")).collect();
        filters.push(format!("{inputs}concat=n={}:v=0:a=1[voice]", labels.len()));
        return "voice".to_string();
    }
    let mut current = labels[0].clone();
    for (k, next) in labels.iter().enumerate().skip(1) {
        let out = format!("ax{k}");
        filters.push(format!(
            "[{current}][{next}]acrossfade=d={}:c1=tri:c2=tri[{out}]",
            secs(crossfade_ticks)
        ));
        current = out;
    }
    current
}

fn video_pass_args(
    timeline: &Timeline,
    temp_audio: &Path,
    output_path: &Path,
    profile: &EncodeProfile,
) -> Vec<String> {
    let settings = &timeline.settings;
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-y".into()];
    let mut filters = Vec::new();

    for (k, clip) in timeline.clips.iter().enumerate() {
        let duration = secs(clip.duration_ticks);
        match clip.visual.kind {
            VisualKind::Image => {
                args.extend([
                    "-loop".into(),
                    "1".into(),
                    "-framerate".into(),
                    settings.fps.to_string(),
                ]);
            }
            VisualKind::Video => {
                args.extend(["-stream_loop".into(), "-1".into()]);
            }
        }
        args.extend(["-t".into(), duration, "-i".into(), path_arg(&clip.visual.path)]);
        filters.push(clip_video_filter(k, clip, &timeline.caption_style, settings.fps, &profile.pixel_format));
    }

    let video_out = join_video(&timeline.clips, settings.crossfade_ticks, &mut filters);
    let audio_input = timeline.clips.len();
    args.extend(["-i".into(), path_arg(temp_audio)]);

    args.push("-filter_complex".into());
    args.push(filters.join(";"));
    args.extend([
        "-map".into(),
        format!("[{video_out}]"),
        "-map".into(),
        format!("{audio_input}:a"),
        "-c:v".into(),
        profile.video_codec.clone(),
        "-preset".into(),
        profile.preset.clone(),
        "-b:v".into(),
        profile.video_bitrate.clone(),
        "-pix_fmt".into(),
        profile.pixel_format.clone(),
        "-r".into(),
        settings.fps.to_string(),
        "-threads".into(),
        profile.threads.to_string(),
        "-c:a".into(),
        "copy".into(),
        "-t".into(),
        secs(timeline.duration_ticks()),
        "-movflags".into(),
        "+faststart".into(),
        path_arg(output_path),
    ]);
    args
}

fn clip_video_filter(
    k: usize,
    clip: &SceneClip,
    style: &CaptionStyle,
    fps: u32,
    pixel_format: &str,
) -> String {
    let fit = &clip.fit;
    let mut chain = vec![
        format!("scale={}:{}", fit.scaled.width, fit.scaled.height),
        format!(
            "crop={}:{}:{}:{}",
            fit.output.width, fit.output.height, fit.crop_x, fit.crop_y
        ),
        "setsar=1".to_string(),
        format!("fps={fps}"),
    ];

    if let Some(zoom) = &clip.zoom {
        let frames = zoom.frame_count(fps);
        let peak = 1.0 + zoom.zoom_factor;
        chain.push(format!(
            "zoompan=z='min(1+{:.4}*on/{frames},{peak:.4})':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={fps}",
            zoom.zoom_factor, fit.output.width, fit.output.height
        ));
    }

    chain.push(format!("trim=duration={}", secs(clip.duration_ticks)));
    chain.push("setpts=PTS-STARTPTS".to_string());
    chain.push(format!("format={pixel_format}"));

    for caption in &clip.captions {
        chain.push(drawtext_filter(caption, style));
    }

    format!("[{k}:v]{}[v{k}]", chain.join(","))
}

fn join_video(clips: &[SceneClip], crossfade_ticks: i64, filters: &mut Vec<String>) -> String {
    if clips.len() == 1 {
        return "v0".to_string();
    }
    if crossfade_ticks <= 0 {
        let inputs: String = (0..clips.len()).map(|k| format!("[v{k}]")).collect();
        filters.push(format!("{inputs}concat=n={}:v=1:a=0[vout]", clips.len()));
        return "vout".to_string();
    }
    let mut current = "v0".to_string();
    for (k, clip) in clips.iter().enumerate().skip(1) {
        let out = format!("vx{k}");
        filters.push(format!(
            "[{current}][v{k}]xfade=transition=fade:duration={}:offset={}[{out}]",
            secs(crossfade_ticks),
            secs(clip.timeline_start_ticks)
        ));
        current = out;
    }
    current
}

fn drawtext_filter(caption: &CaptionEvent, style: &CaptionStyle) -> String {
    let start = ticks_to_secs(caption.start_ticks);
    let end = ticks_to_secs(caption.end_ticks);
    let duration = (end - start).max(0.0);
    let local = format!("(t-{start:.3})");
    let animation = caption.animation;

    let size = caption.font_size as f64;
    let fontsize = match animation.scale_curve(duration) {
        ScaleCurve::Constant => format!("{}", caption.font_size),
        ScaleCurve::Linear { from, over } if over > 0.0 => format!(
            "if(lt({local},{over:.3}),{size}*({from:.3}+{:.3}*{local}/{over:.3}),{size})",
            1.0 - from
        ),
        ScaleCurve::Linear { .. } => format!("{}", caption.font_size),
        ScaleCurve::Bounce { over } => format!(
            "if(lt({local},{over:.3}),{size}*(0.7+0.5*(1-pow({local}/{over:.3}-1,2))),{size})"
        ),
    };

    let fade_in = animation.fade_in_secs();
    let fade_out = animation.fade_out_secs(duration);
    let rising = if fade_in > 0.0 {
        format!("if(lt({local},{fade_in:.3}),{local}/{fade_in:.3},1)")
    } else {
        "1".to_string()
    };
    let falling = if fade_out > 0.0 {
        format!("if(gt(t,{:.3}),({end:.3}-t)/{fade_out:.3},1)", end - fade_out)
    } else {
        "1".to_string()
    };
    let alpha = format!("clip(min({rising},{falling}),0,1)");

    let x = match animation.slide() {
        Some((distance, over)) => format!(
            "(w-text_w)/2+if(lt({local},{over:.3}),w*{distance:.3}*(1-{local}/{over:.3}),0)"
        ),
        None => "(w-text_w)/2".to_string(),
    };

    format!(
        "drawtext=fontfile='{}':text='{}':fontsize='{fontsize}':fontcolor={}:borderw={}:bordercolor={}:x='{x}':y={}:alpha='{alpha}':enable='between(t,{start:.3},{end:.3})'",
        escape_drawtext(&caption.font_file.to_string_lossy()),
        escape_drawtext(&caption.text),
        style.color,
        style.stroke_width,
        style.stroke_color,
        style.top_margin,
    )
}

/// Escapes a value for a quoted drawtext option. Straight quotes cannot be
/// escaped inside a quoted filter argument, so they become typographic ones.
pub fn escape_drawtext(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push('\u{2019}'),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            _ => out.push(ch),
        }
    }
    out
}
