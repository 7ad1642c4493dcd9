use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::Thumbnail;

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("there was an i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error while encoding or decoding the thumbnail: {0}")]
    Image(#[from] image::ImageError),
    #[error("could not move the thumbnail into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// On-disk thumbnail cache.
///
/// Each source path maps to `<dir>/<blake3(path)>.jpg`. Entries are never
/// updated in place: a changed source keeps its key, so its entry stays
/// valid until the directory is cleared externally.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    quality: u8,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            dir: dir.into(),
            quality: quality.clamp(1, 100),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Content-addressed key for a source path
    pub fn key_for(path: &Path) -> String {
        blake3::hash(path.as_os_str().as_encoded_bytes())
            .to_hex()
            .to_string()
    }

    /// Where the entry for `path` lives (whether or not it exists)
    pub fn entry_path(&self, path: &Path) -> PathBuf {
        self.dir.join(format!("{}.jpg", Self::key_for(path)))
    }

    /// Cached thumbnail for `path`. Absence and unreadable entries are both a miss.
    pub fn lookup(&self, path: &Path) -> Option<Thumbnail> {
        let entry = self.entry_path(path);
        match self.read_entry(&entry) {
            Ok(thumbnail) => {
                debug!("Cache hit for {}", path.display());
                Some(thumbnail)
            }
            Err(CacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!("Unreadable cache entry {}: {e}", entry.display());
                None
            }
        }
    }

    /// Write `thumbnail` as the entry for `path`. Failures only cost the cache.
    pub fn store(&self, path: &Path, thumbnail: &Thumbnail) {
        if let Err(e) = self.write_entry(path, thumbnail) {
            warn!("Skipping thumbnail cache for {}: {e}", path.display());
        }
    }

    /// Number of files and total bytes under the cache directory
    pub fn disk_usage(&self) -> (usize, u64) {
        WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .fold((0, 0), |(files, bytes), metadata| (files + 1, bytes + metadata.len()))
    }

    fn read_entry(&self, entry: &Path) -> Result<Thumbnail, CacheError> {
        let reader = BufReader::new(fs::File::open(entry)?);
        Ok(image::load(reader, ImageFormat::Jpeg)?.to_rgb8())
    }

    /// Encode into a temp file in the cache directory, then rename over the
    /// final name so readers never see a partial entry. Concurrent writers
    /// for the same key resolve as last-write-wins.
    fn write_entry(&self, path: &Path, thumbnail: &Thumbnail) -> Result<(), CacheError> {
        // Created lazily; the user might have deleted it while we run
        fs::create_dir_all(&self.dir)?;

        let mut temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            JpegEncoder::new_with_quality(&mut writer, self.quality).encode_image(thumbnail)?;
            writer.flush()?;
        }
        temp.persist(self.entry_path(path))?;
        Ok(())
    }
}
