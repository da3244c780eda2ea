use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(format!("unknown media kind: {}", other)),
        }
    }
}

/// Lowercase extension -> kind. Image entries win over video entries.
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    kinds: HashMap<String, MediaKind>,
}

impl ExtensionMap {
    pub fn new(image_extensions: &[String], video_extensions: &[String]) -> Self {
        let mut kinds = HashMap::new();
        for ext in video_extensions {
            kinds.insert(normalize_extension(ext), MediaKind::Video);
        }
        for ext in image_extensions {
            kinds.insert(normalize_extension(ext), MediaKind::Image);
        }
        Self { kinds }
    }

    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        self.kinds.get(&ext).copied()
    }
}

/// Accepts both `jpg` and `.JPG` spellings.
fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// A supported media file found under a library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub library_root: PathBuf,
    pub filename: String,
    pub kind: MediaKind,
}

/// Lazily walk every root in order, yielding supported media files.
///
/// Missing roots and unreadable subtrees are logged and skipped. Symlinks are
/// not followed. No ordering is guaranteed.
pub fn walk_libraries<'a>(
    roots: &'a [PathBuf],
    extensions: &'a ExtensionMap,
) -> impl Iterator<Item = DiscoveredFile> + 'a {
    roots.iter().flat_map(move |root| walk_root(root, extensions))
}

fn walk_root<'a>(
    root: &'a Path,
    extensions: &'a ExtensionMap,
) -> Box<dyn Iterator<Item = DiscoveredFile> + 'a> {
    if !root.is_dir() {
        warn!("Library path {} does not exist or is not a directory. Skipping.", root.display());
        return Box::new(std::iter::empty());
    }

    info!("Scanning library: {}", root.display());

    let entries = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                // walkdir skips the unreadable subtree and keeps going
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        });

    Box::new(entries.filter_map(move |entry| {
        if !entry.file_type().is_file() {
            return None;
        }
        let kind = extensions.classify(entry.path())?;
        debug!("Discovered {} {}", kind, entry.path().display());
        Some(DiscoveredFile {
            path: entry.path().to_path_buf(),
            library_root: root.to_path_buf(),
            filename: entry.file_name().to_string_lossy().to_string(),
            kind,
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    fn extensions() -> ExtensionMap {
        ExtensionMap::new(
            &["jpg".to_string(), ".JPEG".to_string(), "png".to_string()],
            &["mp4".to_string(), "mov".to_string()],
        )
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let map = extensions();
        assert_eq!(map.classify(Path::new("/a/IMG_1.JPG")), Some(MediaKind::Image));
        assert_eq!(map.classify(Path::new("/a/b.jpeg")), Some(MediaKind::Image));
        assert_eq!(map.classify(Path::new("/a/clip.MoV")), Some(MediaKind::Video));
        assert_eq!(map.classify(Path::new("/a/notes.txt")), None);
        assert_eq!(map.classify(Path::new("/a/no_extension")), None);
    }

    #[test]
    fn test_image_mapping_wins_over_video() {
        let map = ExtensionMap::new(&["gif".to_string()], &["gif".to_string()]);
        assert_eq!(map.classify(Path::new("x.gif")), Some(MediaKind::Image));
    }

    #[test]
    fn test_walk_libraries() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();

        File::create(root.join("photo1.jpg")).unwrap();
        File::create(root.join("photo2.PNG")).unwrap();
        File::create(root.join("clip.mp4")).unwrap();
        File::create(root.join("document.txt")).unwrap();
        fs::create_dir(root.join("subdir")).unwrap();
        File::create(root.join("subdir/photo3.jpeg")).unwrap();

        let roots = vec![root.clone()];
        let map = extensions();
        let mut found: Vec<DiscoveredFile> = walk_libraries(&roots, &map).collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));

        assert_eq!(found.len(), 4);
        assert!(found.iter().all(|f| f.library_root == root));

        let clip = found.iter().find(|f| f.filename == "clip.mp4").unwrap();
        assert_eq!(clip.kind, MediaKind::Video);

        let nested = found.iter().find(|f| f.filename == "photo3.jpeg").unwrap();
        assert_eq!(nested.path, root.join("subdir/photo3.jpeg"));
        assert_eq!(nested.kind, MediaKind::Image);
    }

    #[test]
    fn test_missing_root_does_not_stop_other_roots() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present");
        fs::create_dir(&present).unwrap();
        File::create(present.join("a.jpg")).unwrap();

        let roots = vec![dir.path().join("missing"), present.clone()];
        let map = extensions();
        let found: Vec<DiscoveredFile> = walk_libraries(&roots, &map).collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].library_root, present);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let locked = root.join("locked");
        fs::create_dir(&locked).unwrap();
        File::create(locked.join("hidden.jpg")).unwrap();
        fs::create_dir(root.join("open")).unwrap();
        File::create(root.join("open/visible.jpg")).unwrap();
        File::create(root.join("top.png")).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running with privileges that ignore directory permissions
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let roots = vec![root];
        let map = extensions();
        let mut names: Vec<String> = walk_libraries(&roots, &map).map(|f| f.filename).collect();
        names.sort();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(names, vec!["top.png".to_string(), "visible.jpg".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_files_are_not_followed() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("lib");
        fs::create_dir(&root).unwrap();
        let outside = dir.path().join("outside.jpg");
        File::create(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link.jpg")).unwrap();
        File::create(root.join("real.jpg")).unwrap();

        let roots = vec![root];
        let map = extensions();
        let found: Vec<DiscoveredFile> = walk_libraries(&roots, &map).collect();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].filename, "real.jpg");
    }
}
