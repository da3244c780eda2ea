//! Serving-side access checks for cataloged paths.

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::PathAccessError;

/// Resolve a stored path for serving.
///
/// The path is canonicalised and must lie, component-wise, under one of the
/// canonicalised `roots`. Roots that no longer exist are ignored.
pub fn resolve_media_path(path: &Path, roots: &[PathBuf]) -> Result<PathBuf, PathAccessError> {
    let resolved = match path.canonicalize() {
        Ok(resolved) => resolved,
        Err(_) => return Err(PathAccessError::Missing(path.to_path_buf())),
    };

    let allowed = roots
        .iter()
        .filter_map(|root| root.canonicalize().ok())
        .any(|root| resolved.starts_with(&root));

    if !allowed {
        warn!(
            "Refusing to serve {} from outside the configured libraries",
            resolved.display()
        );
        return Err(PathAccessError::OutsideLibraries(path.to_path_buf()));
    }
    if !resolved.is_file() {
        return Err(PathAccessError::Missing(path.to_path_buf()));
    }
    Ok(resolved)
}
