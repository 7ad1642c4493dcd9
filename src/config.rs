/// Application configuration
///
/// One explicit `Config` value is loaded at startup and handed to every
/// component that needs it (scanner, thumbnail pipeline, UI). It is stored
/// as JSON in the user's config directory:
/// - Linux: ~/.config/media-gallery/config.json
/// - macOS: ~/Library/Application Support/media-gallery/config.json
/// - Windows: %APPDATA%\media-gallery\config.json
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::state::data::MediaKind;

const APP_DIR: &str = "media-gallery";

const DEFAULT_IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".bmp", ".gif", ".webp", ".tiff", ".tif", ".svg", ".heic", ".ico",
    ".raw", ".cr2", ".nef", ".orf", ".sr2",
];

const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    ".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".mpg", ".mpeg", ".m4v", ".3gp", ".webm",
    ".ts", ".mts", ".m2ts",
];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not access the config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("the config file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not determine the user config directory")]
    NoConfigDir,
}

/// Outcome of the most recent folder scan
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LastScan {
    /// RFC 3339 timestamp of when the scan finished
    pub timestamp: String,
    pub status: String,
    pub new_files_count: usize,
    pub total_files_scanned: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where thumbnail JPEGs are cached
    pub cache_dir: PathBuf,
    /// SQLite file backing the media index
    pub database_path: PathBuf,
    /// Accepted image extensions, lower-case with a leading dot
    pub image_extensions: BTreeSet<String>,
    /// Accepted video extensions, lower-case with a leading dot
    pub video_extensions: BTreeSet<String>,
    /// Longest side of a generated thumbnail in pixels
    pub thumbnail_size: u32,
    /// JPEG quality used for cache entries (1-100)
    pub jpeg_quality: u8,
    /// Number of generation jobs allowed to run at once.
    /// Kept low so the UI thread is not starved of CPU and disk bandwidth.
    pub pool_capacity: usize,
    /// Leading video frames to try before giving up
    pub max_video_frame_attempts: usize,
    /// Extra pixels around the viewport still considered visible
    pub visibility_margin: f32,
    pub last_scan: Option<LastScan>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_dir(dirs::cache_dir()).join("thumbnails"),
            database_path: default_dir(dirs::data_dir()).join("media.db"),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            thumbnail_size: 100,
            jpeg_quality: 80,
            pool_capacity: 2,
            max_video_frame_attempts: 5,
            visibility_margin: 200.0,
            last_scan: None,
        }
    }
}

/// `<base>/media-gallery`, falling back to the home directory and then the
/// working directory
fn default_dir(base: Option<PathBuf>) -> PathBuf {
    base.or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Config {
    /// Path of the JSON config file
    pub fn file_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join("config.json"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load the user's config, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load() -> Self {
        match Self::file_path() {
            Ok(path) => Self::load_from(&path),
            Err(e) => {
                warn!("{e}, using default configuration");
                Self::default()
            }
        }
    }

    /// Load a config file. Missing keys take their defaults, a missing or
    /// malformed file yields the default config.
    pub fn load_from(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!("No config at {}: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str::<Config>(&contents) {
            Ok(config) => config.normalized(),
            Err(e) => {
                warn!("Ignoring malformed config {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Write the config to the user's config file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Remember the outcome of a scan (not persisted until `save`)
    pub fn record_scan(&mut self, scan: LastScan) {
        self.last_scan = Some(scan);
    }

    /// Classify a path by its extension, case-insensitively
    pub fn media_kind_for(&self, path: &Path) -> Option<MediaKind> {
        let ext = format!(".{}", path.extension()?.to_str()?.to_lowercase());
        if self.image_extensions.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Hand-edited files may list "JPG" or "jpg"; store ".jpg"
    fn normalized(mut self) -> Self {
        self.image_extensions = normalize_extensions(&self.image_extensions);
        self.video_extensions = normalize_extensions(&self.video_extensions);
        self.pool_capacity = self.pool_capacity.max(1);
        self.thumbnail_size = self.thumbnail_size.max(1);
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
        self
    }
}

fn normalize_extensions(extensions: &BTreeSet<String>) -> BTreeSet<String> {
    extensions
        .iter()
        .map(|ext| {
            let ext = ext.trim().to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}
