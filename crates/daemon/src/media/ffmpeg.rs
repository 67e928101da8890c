use anyhow::{Context, Result};
use async_trait::async_trait;
use engine::render::RenderCommand;
use engine::timeline::{secs_to_ticks, Resolution};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_ticks: i64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
    pub has_video: bool,
}

impl MediaInfo {
    pub fn size(&self) -> Option<Resolution> {
        (self.width > 0 && self.height > 0).then(|| Resolution::new(self.width, self.height))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProbeOutput {
    format: Option<FormatInfo>,
    #[serde(default)]
    streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FormatInfo {
    duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StreamInfo {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

pub struct FFmpegWrapper;

impl FFmpegWrapper {
    pub async fn probe(media_path: &Path) -> Result<MediaInfo> {
        let output = Command::new("ffprobe")
            .args(["-v", "error", "-show_entries"])
            .arg("format=duration:stream=codec_type,width,height,duration")
            .args(["-of", "json"])
            .arg(media_path)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffprobe. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffprobe failed on {}: {}", media_path.display(), stderr.trim());
        }

        let probe_output: ProbeOutput = serde_json::from_slice(&output.stdout)
            .context("Failed to parse ffprobe JSON output")?;
        Ok(parse_probe(probe_output))
    }

    /// Runs ffmpeg to completion. The child is killed if the future is dropped.
    pub async fn run(args: &[String]) -> Result<()> {
        debug!(args = %args.join(" "), "running ffmpeg");
        let output = Command::new("ffmpeg")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute ffmpeg. Make sure FFmpeg is installed.")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(8).collect();
            anyhow::bail!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        Ok(())
    }
}

fn parse_probe(probe: ProbeOutput) -> MediaInfo {
    let stream_duration = probe
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref()?.parse::<f64>().ok())
        .fold(0.0f64, f64::max);
    let duration_seconds = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(stream_duration);

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let (width, height) = video_stream
        .map(|vs| (vs.width.unwrap_or(0), vs.height.unwrap_or(0)))
        .unwrap_or((0, 0));

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    MediaInfo {
        duration_ticks: secs_to_ticks(duration_seconds.max(0.0)),
        width,
        height,
        has_audio,
        has_video: video_stream.is_some(),
    }
}

/// Reads duration and frame size of a media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;
}

pub struct FfprobeProbe;

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        FFmpegWrapper::probe(path).await
    }
}

/// Executes a render command to produce its output file.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, command: &RenderCommand) -> Result<()>;
}

pub struct FfmpegRenderer;

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, command: &RenderCommand) -> Result<()> {
        let result = run_passes(command).await;
        match tokio::fs::remove_file(&command.temp_audio_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %command.temp_audio_path.display(),
                error = %e,
                "failed to remove temporary audio"
            ),
        }
        result
    }
}

async fn run_passes(command: &RenderCommand) -> Result<()> {
    if let Err(err) = FFmpegWrapper::run(&command.audio_pass).await {
        let Some(fallback) = &command.narration_only_audio_pass else {
            return Err(err.context("audio mix failed"));
        };
        warn!(error = %err, "audio mix failed, retrying with narration only");
        FFmpegWrapper::run(fallback)
            .await
            .context("narration-only audio mix failed")?;
    }
    FFmpegWrapper::run(&command.video_pass)
        .await
        .context("video pass failed")?;
    info!(output = %command.output_path.display(), "render finished");
    Ok(())
}
