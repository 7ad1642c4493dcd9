/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the database layer, the thumbnail pipeline and the UI layer.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The two kinds of media the gallery knows how to preview
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Tag stored in the `file_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    /// Parse the `file_type` column back into a kind
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a single media file in the index
#[derive(Debug, Clone, PartialEq)]
pub struct MediaEntry {
    /// Absolute, normalized path to the file
    pub path: PathBuf,
    /// Filename only (e.g., "IMG_0001.jpg")
    pub filename: String,
    /// Lower-cased extension, including the leading dot
    pub extension: String,
    pub kind: MediaKind,
    /// Modification time at scan
    pub modified: DateTime<Utc>,
    /// Size in bytes at scan
    pub size: u64,
}

impl MediaEntry {
    /// Short upper-case type label, e.g. "MP4"
    pub fn type_label(&self) -> String {
        let label = self.extension.trim_start_matches('.').to_uppercase();
        if label.is_empty() {
            self.kind.as_str().to_uppercase()
        } else {
            label
        }
    }
}
