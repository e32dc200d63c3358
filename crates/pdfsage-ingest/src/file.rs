//! Resolution of client-supplied document names to files on disk.

use pdfsage_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Reduce an untrusted name to its final path component.
///
/// Both `/` and `\` count as separators so `..\\secret.pdf` cannot climb out
/// of the folder on any platform. Returns `None` when nothing usable is left.
pub fn sanitize_filename(filename: &str) -> Option<&str> {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();

    match base {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Resolve `filename` inside `folder`, returning the path of an existing regular file.
pub fn resolve_document_path(folder: &Path, filename: &str) -> Result<PathBuf> {
    let safe = sanitize_filename(filename).ok_or_else(|| Error::NotFound(filename.to_string()))?;

    let full_path = folder.join(safe);
    if !full_path.is_file() {
        tracing::debug!("Rejected document lookup: {}", full_path.display());
        return Err(Error::NotFound(safe.to_string()));
    }

    Ok(full_path)
}
