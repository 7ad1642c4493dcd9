use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqlResult, Row};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tracing::{info, warn};

use super::data::{MediaEntry, MediaKind};

/// The MediaIndex manages the SQLite catalog of media files.
/// It maps absolute file paths to kind/size/modification-time metadata;
/// the thumbnail pipeline only ever needs `path` and `kind` from it.
pub struct MediaIndex {
    conn: Connection,
    db_path: PathBuf,
}

impl MediaIndex {
    /// Open (or create) the index at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Could not create {}: {e}", parent.display());
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Media index opened at {}", db_path.display());

        let index = MediaIndex {
            conn,
            db_path: db_path.to_path_buf(),
        };
        index.init_schema()?;

        Ok(index)
    }

    /// Create the table and indexes if they don't exist.
    fn init_schema(&self) -> SqlResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS media_files (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path       TEXT NOT NULL UNIQUE,
                filename        TEXT NOT NULL,
                extension       TEXT NOT NULL,
                file_type       TEXT NOT NULL,
                date_modified   INTEGER,
                file_size       INTEGER
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_media_files_date_modified
             ON media_files(date_modified DESC)",
            [],
        )?;

        Ok(())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn count(&self) -> SqlResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM media_files", [], |row| row.get(0))
    }

    /// Insert a batch of files in one transaction.
    /// Already indexed paths are ignored; files whose metadata can't be read
    /// are skipped. Returns the number of rows actually inserted.
    pub fn batch_insert(&mut self, files: &[(PathBuf, MediaKind)]) -> SqlResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO media_files
                 (file_path, filename, extension, file_type, date_modified, file_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for (path, kind) in files {
                let path = normalize(path);
                let metadata = match std::fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        warn!("Error reading file stats for {}: {e}", path.display());
                        continue;
                    }
                };

                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let extension = path
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
                    .unwrap_or_default();
                let modified = metadata
                    .modified()
                    .map(|t| DateTime::<Utc>::from(t).timestamp())
                    .unwrap_or_default();

                inserted += stmt.execute(params![
                    path.to_string_lossy().to_string(),
                    filename,
                    extension,
                    kind.as_str(),
                    modified,
                    metadata.len() as i64,
                ])?;
            }
        }
        tx.commit()?;

        Ok(inserted)
    }

    /// List indexed media, newest first.
    /// With a prefix, only files inside that directory (at any depth) match.
    pub fn list_entries(&self, path_prefix: Option<&Path>) -> SqlResult<Vec<MediaEntry>> {
        let select = "SELECT file_path, filename, extension, file_type, date_modified, file_size
                      FROM media_files";

        match path_prefix {
            None => {
                let mut stmt =
                    self.conn.prepare(&format!("{select} ORDER BY date_modified DESC"))?;
                let rows = stmt.query_map([], row_to_entry)?;
                collect_entries(rows)
            }
            Some(prefix) => {
                let mut stmt = self.conn.prepare(&format!(
                    "{select} WHERE file_path LIKE ?1 ESCAPE '!' ORDER BY date_modified DESC"
                ))?;
                let rows = stmt.query_map([directory_pattern(prefix)], row_to_entry)?;
                collect_entries(rows)
            }
        }
    }

    /// Sorted unique folders that directly contain indexed media
    pub fn folders(&self) -> SqlResult<Vec<PathBuf>> {
        let mut stmt = self.conn.prepare("SELECT file_path FROM media_files")?;
        let folders: BTreeSet<PathBuf> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|p| Path::new(&p).parent().map(Path::to_path_buf))
            .collect();

        Ok(folders.into_iter().collect())
    }

    /// Remove every file inside `folder` from the index
    pub fn remove_in_folder(&self, folder: &Path) -> SqlResult<usize> {
        self.conn.execute(
            "DELETE FROM media_files WHERE file_path LIKE ?1 ESCAPE '!'",
            [directory_pattern(folder)],
        )
    }

    /// Reclaim the space left by removed rows
    pub fn compact(&self) -> SqlResult<()> {
        self.conn.execute_batch("VACUUM")?;
        info!("Media index compacted");
        Ok(())
    }

    #[cfg(test)]
    pub fn contains(&self, path: &Path) -> SqlResult<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM media_files WHERE file_path = ?1")?;
        stmt.exists([normalize(path).to_string_lossy().to_string()])
    }
}

/// Drop `.` components and duplicate separators so one file has one key
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}

/// `LIKE` pattern matching everything below `dir`. The separator is
/// appended so `/a/photos` does not match `/a/photos_backup/x.jpg`.
fn directory_pattern(dir: &Path) -> String {
    let mut dir = normalize(dir).to_string_lossy().to_string();
    if !dir.ends_with(MAIN_SEPARATOR) {
        dir.push(MAIN_SEPARATOR);
    }

    let mut pattern = String::with_capacity(dir.len() + 1);
    for c in dir.chars() {
        if matches!(c, '!' | '%' | '_') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn row_to_entry(row: &Row<'_>) -> SqlResult<Option<MediaEntry>> {
    let file_type: String = row.get(3)?;
    let Some(kind) = MediaKind::parse(&file_type) else {
        return Ok(None);
    };
    let path: String = row.get(0)?;
    let modified: i64 = row.get::<_, Option<i64>>(4)?.unwrap_or_default();

    Ok(Some(MediaEntry {
        path: PathBuf::from(path),
        filename: row.get(1)?,
        extension: row.get(2)?,
        kind,
        modified: DateTime::from_timestamp(modified, 0).unwrap_or_default(),
        size: row.get::<_, Option<i64>>(5)?.unwrap_or_default().max(0) as u64,
    }))
}

fn collect_entries(
    rows: impl Iterator<Item = SqlResult<Option<MediaEntry>>>,
) -> SqlResult<Vec<MediaEntry>> {
    let mut entries = Vec::new();
    for entry in rows {
        if let Some(entry) = entry? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

// Implement Debug for better error messages
impl std::fmt::Debug for MediaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaIndex")
            .field("db_path", &self.db_path)
            .finish()
    }
}
