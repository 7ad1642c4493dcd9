/// Directory scanner
///
/// Walks folders recursively and feeds every file with an accepted
/// extension into the media index, in batches.
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::data::MediaKind;
use super::library::MediaIndex;
use crate::config::Config;

/// Files buffered before each index transaction
const BATCH_SIZE: usize = 50;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("media index error: {0}")]
    Index(#[from] rusqlite::Error),
    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result of a folder scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub folders: usize,
    /// Regular files visited
    pub files_seen: usize,
    /// Files with an accepted image or video extension
    pub media_found: usize,
    /// Media files that were not indexed before
    pub new_files: usize,
}

/// Scan `folders` into `index`
pub fn scan_folders(
    folders: &[PathBuf],
    config: &Config,
    index: &mut MediaIndex,
) -> Result<ScanSummary, ScanError> {
    let mut summary = ScanSummary {
        folders: folders.len(),
        ..Default::default()
    };
    let mut batch: Vec<(PathBuf, MediaKind)> = Vec::with_capacity(BATCH_SIZE);

    for folder in folders {
        info!("Scanning directory: {}", folder.display());

        for entry in WalkDir::new(folder).follow_links(true).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            summary.files_seen += 1;

            let Some(kind) = config.media_kind_for(entry.path()) else {
                continue;
            };
            summary.media_found += 1;
            batch.push((entry.into_path(), kind));

            if batch.len() >= BATCH_SIZE {
                summary.new_files += index.batch_insert(&batch)?;
                batch.clear();
            }
        }
    }

    // Flush remaining items
    if !batch.is_empty() {
        summary.new_files += index.batch_insert(&batch)?;
    }

    info!(
        "Scan complete: {} new of {} media files ({} files seen)",
        summary.new_files, summary.media_found, summary.files_seen
    );

    Ok(summary)
}

/// Scan on a blocking thread so the UI stays responsive.
///
/// Opens its own connection: rusqlite::Connection is not Sync, so the UI's
/// index can't be shared with the background thread.
pub async fn scan_folders_async(
    folders: Vec<PathBuf>,
    config: Config,
) -> Result<ScanSummary, ScanError> {
    tokio::task::spawn_blocking(move || {
        let mut index = MediaIndex::open(&config.database_path)?;
        scan_folders(&folders, &config, &mut index).inspect_err(|e| warn!("Scan failed: {e}"))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: PathBuf) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_classifies_and_counts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("media");
        write(root.join("a.JPG"));
        write(root.join("nested").join("b.mp4"));
        write(root.join("nested").join("readme.txt"));

        let config = Config::default();
        let mut index = MediaIndex::open(&dir.path().join("media.db")).unwrap();

        let summary = scan_folders(&[root.clone()], &config, &mut index).unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                folders: 1,
                files_seen: 3,
                media_found: 2,
                new_files: 2,
            }
        );

        let entries = index.list_entries(None).unwrap();
        let mut kinds: Vec<_> = entries.iter().map(|e| e.kind).collect();
        kinds.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, vec![MediaKind::Image, MediaKind::Video]);

        // A second scan finds nothing new
        let again = scan_folders(&[root], &config, &mut index).unwrap();
        assert_eq!(again.new_files, 0);
        assert_eq!(again.media_found, 2);
    }

    #[test]
    fn test_scan_flushes_full_batches() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("many");
        for i in 0..(BATCH_SIZE + 7) {
            write(root.join(format!("img_{i}.png")));
        }

        let mut index = MediaIndex::open(&dir.path().join("media.db")).unwrap();
        let summary = scan_folders(&[root], &Config::default(), &mut index).unwrap();
        assert_eq!(summary.new_files, BATCH_SIZE + 7);
        assert_eq!(index.count().unwrap() as usize, BATCH_SIZE + 7);
    }

    #[tokio::test]
    async fn test_scan_async_uses_configured_database() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("media");
        write(root.join("clip.mov"));

        let config = Config {
            database_path: dir.path().join("index").join("media.db"),
            ..Config::default()
        };
        let summary = scan_folders_async(vec![root], config.clone()).await.unwrap();
        assert_eq!(summary.new_files, 1);

        let index = MediaIndex::open(&config.database_path).unwrap();
        assert_eq!(index.count().unwrap(), 1);
    }
}
