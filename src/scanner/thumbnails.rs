use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::config::ThumbnailConfig;
use crate::db::MediaRecord;
use crate::scanner::discovery::MediaKind;

/// Square JPEG thumbnails, cached per media id.
pub struct ThumbnailManager {
    cache_dir: PathBuf,
    size: u32,
}

impl ThumbnailManager {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
            size: config.size.max(1),
        }
    }

    pub fn cache_path(&self, media_id: i64) -> PathBuf {
        self.cache_dir.join(format!("{}_thumb.jpg", media_id))
    }

    /// Thumbnail for an image record, read from `source`.
    ///
    /// Returns `None` for videos. A cached file is reused unless `force`.
    pub fn get_or_create(
        &self,
        record: &MediaRecord,
        source: &Path,
        force: bool,
    ) -> Result<Option<PathBuf>> {
        if record.kind != MediaKind::Image {
            return Ok(None);
        }

        let cache_path = self.cache_path(record.id);
        if cache_path.exists() && !force {
            return Ok(Some(cache_path));
        }

        fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("Failed to create thumbnail directory {}", self.cache_dir.display())
        })?;

        match self.render(source, &cache_path) {
            Ok(()) => {
                debug!("Generated thumbnail {}", cache_path.display());
                Ok(Some(cache_path))
            }
            Err(e) => {
                error!("Error generating thumbnail for {}: {:#}", source.display(), e);
                if cache_path.exists() {
                    let _ = fs::remove_file(&cache_path);
                }
                Err(e)
            }
        }
    }

    fn render(&self, source: &Path, dest: &Path) -> Result<()> {
        let img = image::open(source)
            .with_context(|| format!("Failed to open image {}", source.display()))?;
        let img = apply_orientation(img, read_orientation(source));
        let thumb = img.resize_to_fill(self.size, self.size, FilterType::Lanczos3);

        DynamicImage::ImageRgb8(thumb.to_rgb8())
            .save_with_format(dest, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to write thumbnail {}", dest.display()))?;
        Ok(())
    }
}

/// EXIF orientation tag value, 1 when absent or unreadable.
fn read_orientation(path: &Path) -> u16 {
    let Ok(file) = File::open(path) else {
        return 1;
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        return 1;
    };

    match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        Some(field) => match field.value {
            exif::Value::Short(ref v) => v.first().copied().unwrap_or(1),
            _ => 1,
        },
        None => 1,
    }
}

fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::fields;
    use crate::scanner::accessibility::Accessibility;
    use image::GenericImageView;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> ThumbnailManager {
        ThumbnailManager::new(&ThumbnailConfig {
            path: dir.join("thumbs"),
            size: 16,
        })
    }

    fn record(id: i64, path: &Path, kind: MediaKind) -> MediaRecord {
        let f = fields(&path.to_string_lossy(), "/");
        MediaRecord {
            id,
            path: f.path,
            library_root: f.library_root,
            filename: f.filename,
            capture_time: f.capture_time,
            modification_time: f.modification_time,
            size_bytes: f.size_bytes,
            kind,
            accessibility: Accessibility::Accessible,
        }
    }

    #[test]
    fn test_generates_square_thumbnail() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("wide.png");
        image::RgbImage::new(40, 20).save(&source).unwrap();

        let thumbs = manager(dir.path());
        let path = thumbs
            .get_or_create(&record(7, &source, MediaKind::Image), &source, false)
            .unwrap()
            .unwrap();

        assert_eq!(path, dir.path().join("thumbs/7_thumb.jpg"));
        let thumb = image::open(&path).unwrap();
        assert_eq!(thumb.dimensions(), (16, 16));
    }

    #[test]
    fn test_videos_have_no_thumbnail() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        fs::write(&source, b"x").unwrap();

        let result = manager(dir.path())
            .get_or_create(&record(1, &source, MediaKind::Video), &source, false)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_cached_file_reused_unless_forced() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.png");
        image::RgbImage::new(8, 8).save(&source).unwrap();
        let thumbs = manager(dir.path());
        let rec = record(3, &source, MediaKind::Image);

        let path = thumbs.get_or_create(&rec, &source, false).unwrap().unwrap();
        fs::write(&path, b"stale").unwrap();

        thumbs.get_or_create(&rec, &source, false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"stale");

        thumbs.get_or_create(&rec, &source, true).unwrap();
        assert!(image::open(&path).is_ok());
    }

    #[test]
    fn test_failure_leaves_no_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        fs::write(&source, b"not an image").unwrap();
        let thumbs = manager(dir.path());

        let result = thumbs.get_or_create(&record(9, &source, MediaKind::Image), &source, false);
        assert!(result.is_err());
        assert!(!thumbs.cache_path(9).exists());
    }

    #[test]
    fn test_orientation_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(40, 20));
        assert_eq!(apply_orientation(img.clone(), 6).dimensions(), (20, 40));
        assert_eq!(apply_orientation(img.clone(), 3).dimensions(), (40, 20));
        assert_eq!(apply_orientation(img, 1).dimensions(), (40, 20));
    }
}
