pub mod accessibility;
pub mod discovery;
pub mod metadata;
pub mod thumbnails;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{self, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex, TryLockError};
use tracing::{debug, error, info, warn};

use crate::config::LibraryConfig;
use crate::db::{CatalogChange, CatalogStore, MediaFields, MediaRecord};
use crate::error::ScanError;

use accessibility::AccessEvent;
pub use discovery::{walk_libraries, DiscoveredFile, ExtensionMap, MediaKind};
use metadata::{effective_capture_time, extract_capture_time, modification_time};
pub use thumbnails::ThumbnailManager;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Re-read embedded metadata even for files whose size and mtime are
    /// unchanged since the last pass.
    #[serde(default)]
    pub force_rescan: bool,
}

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started { total_files: usize },
    Scanning { current: usize, total: usize, path: String },
    Completed { summary: ScanSummary },
    Error { message: String },
}

/// Counters for one reconciliation pass, measured against the catalog as it
/// was before the pre-pass marking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Files produced by the walk.
    pub discovered: usize,
    pub added: usize,
    /// Known paths whose metadata drifted.
    pub updated: usize,
    /// Known paths, metadata unchanged, previously inaccessible.
    pub made_accessible: usize,
    /// Previously accessible records missing from a configured root.
    pub made_inaccessible: usize,
    pub unchanged: usize,
    /// Previously accessible records whose root is no longer configured.
    pub detached: usize,
    /// Files that vanished between the walk and the stat.
    pub skipped: usize,
}

/// The writes a pass will commit, plus its counters.
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub changes: Vec<CatalogChange>,
    pub summary: ScanSummary,
}

/// Compare observed files against the pre-pass catalog snapshot.
///
/// `discovered` is the walk's file count; files the walk produced but that
/// could not be observed are counted as skipped.
pub fn reconcile(
    snapshot: &[MediaRecord],
    discovered: usize,
    observed: Vec<MediaFields>,
    roots: &[PathBuf],
) -> Reconciliation {
    let by_path: HashMap<&PathBuf, &MediaRecord> =
        snapshot.iter().map(|record| (&record.path, record)).collect();
    let mut result = Reconciliation::default();
    result.summary.discovered = discovered;
    result.summary.skipped = discovered.saturating_sub(observed.len());
    let mut seen: HashSet<PathBuf> = HashSet::with_capacity(observed.len());

    for fields in observed {
        seen.insert(fields.path.clone());

        let Some(prior) = by_path.get(&fields.path) else {
            debug!("New file: {}", fields.path.display());
            result.summary.added += 1;
            result.changes.push(CatalogChange::Insert(fields));
            continue;
        };

        if !prior.metadata_matches(&fields) {
            debug!("Metadata changed: {}", fields.path.display());
            result.summary.updated += 1;
            result.changes.push(CatalogChange::Update(fields));
            continue;
        }

        let state = prior.accessibility.apply(AccessEvent::Rediscovered);
        if prior.is_accessible() {
            result.summary.unchanged += 1;
        } else {
            debug!("Accessible again: {}", fields.path.display());
            result.summary.made_accessible += 1;
        }
        result.changes.push(CatalogChange::SetAccessibility {
            path: fields.path,
            state,
        });
    }

    for record in snapshot.iter().filter(|r| !seen.contains(&r.path)) {
        if roots.contains(&record.library_root) {
            let event = AccessEvent::MissingFromConfiguredRoot;
            if record.accessibility.is_loss(event) {
                info!("File no longer found, marking inaccessible: {}", record.path.display());
                result.summary.made_inaccessible += 1;
            }
            result.changes.push(CatalogChange::SetAccessibility {
                path: record.path.clone(),
                state: record.accessibility.apply(event),
            });
        } else if record.accessibility.is_loss(AccessEvent::RootUnconfigured) {
            debug!(
                "Library root {} no longer configured: {}",
                record.library_root.display(),
                record.path.display()
            );
            result.summary.detached += 1;
        }
    }

    result
}

pub struct Scanner {
    roots: Vec<PathBuf>,
    extensions: ExtensionMap,
    running: Mutex<()>,
}

impl Scanner {
    /// Relative roots are resolved against the current directory once, so
    /// stored paths are absolute regardless of where later passes run.
    pub fn new(library: &LibraryConfig) -> Self {
        Self {
            roots: library.roots.iter().map(|root| absolute_root(root)).collect(),
            extensions: library.extension_map(),
            running: Mutex::new(()),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Run one full reconciliation pass.
    ///
    /// Only one pass runs at a time; a concurrent call returns
    /// `ScanError::AlreadyRunning`. If the final commit fails the pass is
    /// rolled back and the pre-pass marking stands.
    pub fn scan_libraries(
        &self,
        catalog: &dyn CatalogStore,
        options: ScanOptions,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<ScanSummary, ScanError> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(ScanError::AlreadyRunning),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        info!("Starting library scan over {} root(s)", self.roots.len());

        let snapshot = catalog.list_all()?;
        let marked = catalog.mark_all_inaccessible()?;
        info!("Marked {} existing items as inaccessible before scan", marked);

        let discovered = self.discover();
        let total = discovered.len();
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started { total_files: total });
        }

        let prior_by_path: HashMap<&PathBuf, &MediaRecord> =
            snapshot.iter().map(|record| (&record.path, record)).collect();
        let counter = AtomicUsize::new(0);

        let observed: Vec<MediaFields> = discovered
            .into_par_iter()
            .map_with(progress_tx.clone(), |tx, file| {
                let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(tx) = tx {
                    let _ = tx.send(ScanProgress::Scanning {
                        current,
                        total,
                        path: file.path.to_string_lossy().to_string(),
                    });
                }
                let prior = prior_by_path.get(&file.path).copied();
                observe(file, prior, options)
            })
            .flatten()
            .collect();

        let Reconciliation { changes, summary } =
            reconcile(&snapshot, total, observed, &self.roots);

        if let Err(e) = catalog.apply(&changes) {
            error!("Error during scan commit, rolled back: {}", e);
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(ScanProgress::Error {
                    message: e.to_string(),
                });
            }
            return Err(e.into());
        }

        info!(
            "Scan complete: {} discovered, {} added, {} updated, {} made accessible, {} made inaccessible, {} unchanged",
            summary.discovered,
            summary.added,
            summary.updated,
            summary.made_accessible,
            summary.made_inaccessible,
            summary.unchanged,
        );
        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed {
                summary: summary.clone(),
            });
        }

        Ok(summary)
    }

    /// Walk every root. A path reached twice keeps its first root.
    fn discover(&self) -> Vec<DiscoveredFile> {
        let mut seen = HashSet::new();
        walk_libraries(&self.roots, &self.extensions)
            .filter(|file| {
                if seen.insert(file.path.clone()) {
                    true
                } else {
                    warn!(
                        "{} reached again under {}; keeping first root",
                        file.path.display(),
                        file.library_root.display()
                    );
                    false
                }
            })
            .collect()
    }
}

fn absolute_root(root: &Path) -> PathBuf {
    match path::absolute(root) {
        Ok(absolute) => absolute,
        Err(e) => {
            warn!("Cannot resolve library root {}: {}", root.display(), e);
            root.to_path_buf()
        }
    }
}

/// Stat a discovered file and work out its effective capture time.
/// Returns `None` when the file vanished since the walk.
fn observe(
    file: DiscoveredFile,
    prior: Option<&MediaRecord>,
    options: ScanOptions,
) -> Option<MediaFields> {
    let stat = match fs::metadata(&file.path) {
        Ok(stat) => stat,
        Err(e) => {
            debug!("File {} disappeared before stat: {}", file.path.display(), e);
            return None;
        }
    };
    let size_bytes = stat.len();
    let modified = stat.modified().ok().map(modification_time);

    let reusable = prior.filter(|p| {
        !options.force_rescan
            && modified.is_some()
            && p.size_bytes == size_bytes
            && p.modification_time == modified
            && p.kind == file.kind
    });

    let capture_time = match reusable {
        Some(prior) => prior.capture_time,
        None => {
            let embedded = match file.kind {
                MediaKind::Image => extract_capture_time(&file.path),
                MediaKind::Video => None,
            };
            let (capture_time, source) = effective_capture_time(embedded, modified);
            debug!("Capture time for {} from {:?}", file.path.display(), source);
            capture_time
        }
    };

    Some(MediaFields {
        path: file.path,
        library_root: file.library_root,
        filename: file.filename,
        capture_time,
        modification_time: modified,
        size_bytes,
        kind: file.kind,
    })
}
