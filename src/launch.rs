/// Opening media in the system's default application
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("file no longer exists: {}", .0.display())]
    Missing(PathBuf),
    #[error("no application could open the file: {0}")]
    Opener(#[from] opener::OpenError),
}

/// Hand `path` to the desktop's default viewer or player.
/// Files removed since the last scan are reported instead of launched.
pub fn open_media(path: &Path) -> Result<(), LaunchError> {
    if !path.is_file() {
        return Err(LaunchError::Missing(path.to_path_buf()));
    }
    info!("Opening {}", path.display());
    opener::open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_launched() {
        let dir = TempDir::new().unwrap();
        let gone = dir.path().join("deleted.mp4");

        match open_media(&gone) {
            Err(LaunchError::Missing(path)) => assert_eq!(path, gone),
            other => panic!("unexpected result {other:?}"),
        }
        // Directories are not media either
        assert!(matches!(
            open_media(dir.path()),
            Err(LaunchError::Missing(_))
        ));
    }
}
