use engine::fallback::{first_success, FallbackError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Generally-available typefaces tried after the requested one.
pub const FALLBACK_TYPEFACES: [&str; 5] = [
    "Arial.ttf",
    "arial.ttf",
    "Helvetica.ttc",
    "DejaVuSans.ttf",
    "LiberationSans-Regular.ttf",
];

const FONT_EXTENSIONS: [&str; 4] = ["ttf", "otf", "ttc", "otc"];

#[derive(Debug, Error)]
pub enum FontError {
    #[error("typeface `{0}` is not installed")]
    NotFound(String),
}

/// Maps a typeface name to a font file the encoder can load.
pub trait TypefaceLocator: Send + Sync {
    fn locate(&self, typeface: &str) -> Result<PathBuf, FontError>;
}

/// Index of font files found under a set of directories, keyed by
/// lowercased file name and stem.
#[derive(Debug, Default)]
pub struct FontDirectoryLocator {
    index: HashMap<String, PathBuf>,
}

impl FontDirectoryLocator {
    pub fn scan(dirs: &[PathBuf]) -> Self {
        let mut locator = FontDirectoryLocator::default();
        for dir in dirs {
            locator.scan_dir(dir, 0);
        }
        debug!(fonts = locator.index.len(), "indexed font files");
        locator
    }

    /// Runs `scan` on the blocking pool. A panicked scan yields an empty
    /// index.
    pub async fn scan_in_background(dirs: Vec<PathBuf>) -> Self {
        match tokio::task::spawn_blocking(move || FontDirectoryLocator::scan(&dirs)).await {
            Ok(locator) => locator,
            Err(e) => {
                warn!(error = %e, "font scan task failed");
                FontDirectoryLocator::default()
            }
        }
    }

    fn scan_dir(&mut self, dir: &Path, depth: usize) {
        if depth > 6 {
            return;
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_dir(&path, depth + 1);
            } else if is_font_file(&path) {
                self.insert(path);
            }
        }
    }

    fn insert(&mut self, path: PathBuf) {
        let keys = [
            path.file_name().map(|n| n.to_string_lossy().to_lowercase()),
            path.file_stem().map(|n| n.to_string_lossy().to_lowercase()),
        ];
        for key in keys.into_iter().flatten() {
            self.index.entry(key).or_insert_with(|| path.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| FONT_EXTENSIONS.contains(&e.as_str()))
}

impl TypefaceLocator for FontDirectoryLocator {
    fn locate(&self, typeface: &str) -> Result<PathBuf, FontError> {
        let direct = Path::new(typeface);
        if direct.is_absolute() && direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        self.index
            .get(&typeface.to_lowercase())
            .cloned()
            .ok_or_else(|| FontError::NotFound(typeface.to_string()))
    }
}

/// Tries the requested typeface, then each fallback in order.
pub async fn locate_with_fallback(
    locator: &dyn TypefaceLocator,
    requested: &str,
) -> Result<PathBuf, FallbackError<FontError>> {
    let chain: Vec<&str> = std::iter::once(requested).chain(FALLBACK_TYPEFACES).collect();
    first_success(chain, |t| t.to_string(), |t| async move { locator.locate(t) }).await
}
