/// Disk usage of the app's own files, for the stats panel
use std::path::Path;

use crate::config::LastScan;
use crate::thumbnail::cache::CacheStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryStats {
    pub media_count: i64,
    pub database_bytes: u64,
    pub thumbnail_files: usize,
    pub thumbnail_bytes: u64,
    pub last_scan: Option<LastScan>,
}

impl LibraryStats {
    /// Walks the cache directory, so run it off the UI thread
    pub fn collect(
        database_path: &Path,
        cache: &CacheStore,
        media_count: i64,
        last_scan: Option<LastScan>,
    ) -> Self {
        let database_bytes = std::fs::metadata(database_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let (thumbnail_files, thumbnail_bytes) = cache.disk_usage();

        Self {
            media_count,
            database_bytes,
            thumbnail_files,
            thumbnail_bytes,
            last_scan,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.database_bytes + self.thumbnail_bytes
    }
}

/// Human-readable size in powers of 1024, e.g. "1.5 MB"
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}
