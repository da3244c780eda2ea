use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::error::ArchiveError;

/// Numbered suffixes tried before falling back to a timestamp.
const MAX_NUMBERED_SUFFIX: u32 = 99;

/// Move `source` into `archive_dir`, returning the new path.
///
/// Name conflicts resolve as `stem_1.ext` through `stem_99.ext`, then
/// `stem_<timestamp>.ext`. The archive directory is created if missing.
pub fn move_to_archive(source: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    if !source.is_absolute() {
        return Err(ArchiveError::NotAbsolute(source.to_path_buf()));
    }
    if !archive_dir.is_absolute() {
        return Err(ArchiveError::NotAbsolute(archive_dir.to_path_buf()));
    }
    if !source.exists() {
        return Err(ArchiveError::SourceMissing(source.to_path_buf()));
    }

    if !archive_dir.is_dir() {
        fs::create_dir_all(archive_dir)?;
        info!("Created archive directory: {}", archive_dir.display());
    }

    let destination = free_destination(source, archive_dir)?;

    info!("Moving '{}' to '{}'", source.display(), destination.display());
    match fs::rename(source, &destination) {
        Ok(()) => {}
        Err(_) => {
            // Cross-filesystem moves fall back to copy + delete
            fs::copy(source, &destination)?;
            if let Err(e) = fs::remove_file(source) {
                error!(
                    "Copied '{}' to archive but could not remove the original: {}",
                    source.display(),
                    e
                );
                return Err(e.into());
            }
        }
    }
    Ok(destination)
}

fn free_destination(source: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    let filename = source
        .file_name()
        .ok_or_else(|| ArchiveError::SourceMissing(source.to_path_buf()))?;
    let candidate = archive_dir.join(filename);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    for counter in 1..=MAX_NUMBERED_SUFFIX {
        let candidate = archive_dir.join(format!("{}_{}{}", stem, counter, extension));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    let suffix = Local::now().format("%Y%m%d%H%M%S%6f");
    let candidate = archive_dir.join(format!("{}_{}{}", stem, suffix, extension));
    if candidate.exists() {
        error!("Timestamped archive name {} also exists", candidate.display());
        return Err(ArchiveError::NameConflict(source.to_path_buf()));
    }
    info!(
        "Used timestamp suffix for {} after repeated conflicts",
        source.display()
    );
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_moves_and_creates_archive_dir() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"a").unwrap();
        let archive = dir.path().join("archive/nested");

        let moved = move_to_archive(&source, &archive).unwrap();
        assert_eq!(moved, archive.join("a.jpg"));
        assert!(!source.exists());
        assert_eq!(fs::read(&moved).unwrap(), b"a");
    }

    #[test]
    fn test_conflicts_get_numbered_suffix() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("a.jpg"), b"old").unwrap();
        fs::write(archive.join("a_1.jpg"), b"older").unwrap();

        let source = dir.path().join("a.jpg");
        fs::write(&source, b"new").unwrap();

        let moved = move_to_archive(&source, &archive).unwrap();
        assert_eq!(moved, archive.join("a_2.jpg"));
        assert_eq!(fs::read(archive.join("a.jpg")).unwrap(), b"old");
    }

    #[test]
    fn test_timestamp_suffix_after_numbered_names_run_out() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("archive");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("a.jpg"), b"").unwrap();
        for i in 1..=MAX_NUMBERED_SUFFIX {
            fs::write(archive.join(format!("a_{}.jpg", i)), b"").unwrap();
        }

        let source = dir.path().join("a.jpg");
        fs::write(&source, b"new").unwrap();

        let moved = move_to_archive(&source, &archive).unwrap();
        let name = moved.file_name().unwrap().to_string_lossy().to_string();
        // a_ + 20 digit timestamp + .jpg
        assert!(name.starts_with("a_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "a_".len() + 20 + ".jpg".len());
    }

    #[test]
    fn test_rejects_relative_and_missing() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            move_to_archive(Path::new("a.jpg"), dir.path()),
            Err(ArchiveError::NotAbsolute(_))
        ));
        assert!(matches!(
            move_to_archive(&dir.path().join("a.jpg"), Path::new("archive")),
            Err(ArchiveError::NotAbsolute(_))
        ));
        assert!(matches!(
            move_to_archive(&dir.path().join("missing.jpg"), &dir.path().join("archive")),
            Err(ArchiveError::SourceMissing(_))
        ));
    }
}
