use engine::timeline::{secs_to_ticks, CaptionStyle, RenderSettings, Resolution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Horizontal,
    Vertical,
}

impl Aspect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aspect::Horizontal => "horizontal",
            Aspect::Vertical => "vertical",
        }
    }
}

impl FromStr for Aspect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" | "landscape" => Ok(Aspect::Horizontal),
            "vertical" | "portrait" => Ok(Aspect::Vertical),
            other => Err(format!("unknown aspect `{other}`")),
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job-level choice of where scene visuals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    #[serde(alias = "gemini")]
    Generative,
    Stock,
    /// Generative first, stock video then stock image behind it.
    Mixed,
}

impl FromStr for ProviderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generative" | "gemini" => Ok(ProviderMode::Generative),
            "stock" => Ok(ProviderMode::Stock),
            "mixed" => Ok(ProviderMode::Mixed),
            other => Err(format!("unknown provider mode `{other}`")),
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderMode::Generative => "generative",
            ProviderMode::Stock => "stock",
            ProviderMode::Mixed => "mixed",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub google_api_key: Option<String>,
    pub gemini_text_model: String,
    pub gemini_image_model: String,
    pub pixabay_key: Option<String>,
    pub freesound_key: Option<String>,
    pub tts_lang: String,
    pub output_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub font_dirs: Vec<PathBuf>,
    pub default_aspect: Aspect,
    pub default_provider: ProviderMode,
    pub horizontal_size: Resolution,
    pub vertical_size: Resolution,
    pub fps: u32,
    pub crossfade_secs: f64,
    pub kenburns_zoom: f64,
    pub subtitles_enabled: bool,
    pub subtitle_font: String,
    pub subtitle_fontsize: Option<u32>,
    pub subtitle_color: String,
    pub subtitle_stroke_color: String,
    pub subtitle_stroke_width: u32,
    pub music_gain: f64,
    pub sfx_gain: f64,
    pub image_style: String,
    pub job_timeout: Duration,
    pub job_retention: Duration,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            google_api_key: None,
            gemini_text_model: "gemini-1.5-flash-latest".to_string(),
            gemini_image_model: "imagen-3.0-generate-001".to_string(),
            pixabay_key: None,
            freesound_key: None,
            tts_lang: "en".to_string(),
            output_dir: PathBuf::from("renders"),
            scratch_dir: std::env::temp_dir(),
            font_dirs: default_font_dirs(),
            default_aspect: Aspect::Horizontal,
            default_provider: ProviderMode::Mixed,
            horizontal_size: Resolution::new(1920, 1080),
            vertical_size: Resolution::new(1080, 1920),
            fps: 24,
            crossfade_secs: 0.6,
            kenburns_zoom: 0.04,
            subtitles_enabled: true,
            subtitle_font: "Arial-Bold".to_string(),
            subtitle_fontsize: None,
            subtitle_color: "white".to_string(),
            subtitle_stroke_color: "black".to_string(),
            subtitle_stroke_width: 1,
            music_gain: 0.3,
            sfx_gain: 0.35,
            image_style: "cinematic lighting, rich color, high detail".to_string(),
            job_timeout: Duration::from_secs(900),
            job_retention: Duration::from_secs(3600),
            port: 5000,
        }
    }
}

impl Settings {
    /// Reads the process environment on top of the defaults. Unparsable
    /// values are logged and ignored.
    pub fn from_env() -> Self {
        let d = Settings::default();
        Settings {
            google_api_key: env_opt("GOOGLE_API_KEY"),
            gemini_text_model: env_or("GEMINI_TEXT_MODEL", d.gemini_text_model),
            gemini_image_model: env_or("GEMINI_IMAGE_MODEL", d.gemini_image_model),
            pixabay_key: env_opt("PIXABAY_KEY"),
            freesound_key: env_opt("FREESOUND_KEY"),
            tts_lang: env_or("TTS_LANG", d.tts_lang),
            output_dir: env_or("OUTPUT_DIR", d.output_dir),
            scratch_dir: env_or("SCRATCH_DIR", d.scratch_dir),
            font_dirs: env_opt("FONT_DIRS")
                .map(|v| std::env::split_paths(&v).collect())
                .unwrap_or(d.font_dirs),
            default_aspect: env_or("DEFAULT_ASPECT", d.default_aspect),
            default_provider: env_or("DEFAULT_PROVIDER", d.default_provider),
            horizontal_size: env_opt("HORIZONTAL_SIZE")
                .and_then(|v| parse_size("HORIZONTAL_SIZE", &v))
                .unwrap_or(d.horizontal_size),
            vertical_size: env_opt("VERTICAL_SIZE")
                .and_then(|v| parse_size("VERTICAL_SIZE", &v))
                .unwrap_or(d.vertical_size),
            fps: env_or("FPS", d.fps),
            crossfade_secs: env_or("CROSSFADE_SEC", d.crossfade_secs),
            kenburns_zoom: env_or("KENBURNS_ZOOM", d.kenburns_zoom),
            subtitles_enabled: env_opt("SUBTITLES_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(d.subtitles_enabled),
            subtitle_font: env_or("SUBTITLE_FONT", d.subtitle_font),
            subtitle_fontsize: env_opt("SUBTITLE_FONTSIZE").and_then(|v| parse_logged("SUBTITLE_FONTSIZE", &v)),
            subtitle_color: env_or("SUBTITLE_COLOR", d.subtitle_color),
            subtitle_stroke_color: env_or("SUBTITLE_STROKE_COLOR", d.subtitle_stroke_color),
            subtitle_stroke_width: env_or("SUBTITLE_STROKE_WIDTH", d.subtitle_stroke_width),
            music_gain: env_or("MUSIC_GAIN", d.music_gain),
            sfx_gain: env_or("SFX_GAIN", d.sfx_gain),
            image_style: env_or("IMAGE_STYLE", d.image_style),
            job_timeout: env_opt("JOB_TIMEOUT_SECS")
                .and_then(|v| parse_logged::<u64>("JOB_TIMEOUT_SECS", &v))
                .map(Duration::from_secs)
                .unwrap_or(d.job_timeout),
            job_retention: env_opt("JOB_RETENTION_SECS")
                .and_then(|v| parse_logged::<u64>("JOB_RETENTION_SECS", &v))
                .map(Duration::from_secs)
                .unwrap_or(d.job_retention),
            port: env_or("PORT", d.port),
        }
    }

    pub fn frame_size(&self, aspect: Aspect) -> Resolution {
        match aspect {
            Aspect::Horizontal => self.horizontal_size,
            Aspect::Vertical => self.vertical_size,
        }
    }

    pub fn render_settings(&self, aspect: Aspect) -> RenderSettings {
        let mut settings = RenderSettings::new(self.frame_size(aspect));
        settings.fps = self.fps;
        settings.crossfade_ticks = secs_to_ticks(self.crossfade_secs.max(0.0));
        settings.zoom_factor = self.kenburns_zoom;
        settings.music_gain = self.music_gain;
        settings.sfx_gain = self.sfx_gain;
        settings
    }

    pub fn caption_style(&self) -> CaptionStyle {
        CaptionStyle {
            color: self.subtitle_color.clone(),
            stroke_color: self.subtitle_stroke_color.clone(),
            stroke_width: self.subtitle_stroke_width,
            ..CaptionStyle::default()
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_opt(key)
        .and_then(|v| parse_logged(key, &v))
        .unwrap_or(default)
}

fn parse_logged<T>(key: &str, value: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value, error = %e, "ignoring invalid setting");
            None
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn parse_size(key: &str, value: &str) -> Option<Resolution> {
    let parsed = value
        .split_once(['x', 'X'])
        .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
        .filter(|(w, h): &(u32, u32)| *w > 0 && *h > 0);
    if parsed.is_none() {
        warn!(key, value, "ignoring invalid frame size");
    }
    parsed.map(|(w, h)| Resolution::new(w, h))
}

fn default_font_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from("/usr/share/fonts"),
        PathBuf::from("/usr/local/share/fonts"),
        PathBuf::from("/Library/Fonts"),
        PathBuf::from("/System/Library/Fonts"),
        PathBuf::from("C:\\Windows\\Fonts"),
    ];
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(&home).join(".fonts"));
        dirs.push(PathBuf::from(&home).join(".local/share/fonts"));
        dirs.push(PathBuf::from(home).join("Library/Fonts"));
    }
    dirs
}
