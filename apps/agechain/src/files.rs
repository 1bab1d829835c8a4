//! # File Helpers
//!
//! Size-checked reads and output path resolution shared by configuration
//! loading and the CLI commands.

use crate::error::AppError;
use std::path::{Path, PathBuf};

/// Fail unless `path` exists and is at most `max_size` bytes.
pub(crate) fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AppError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AppError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;

    if metadata.len() > max_size {
        return Err(AppError::Io(format!(
            "'{}' is {} bytes, larger than the {} byte limit",
            path.display(),
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an output file path against its canonical parent directory.
pub(crate) fn validate_output_path(path: &Path) -> Result<PathBuf, AppError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        AppError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(AppError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| AppError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    std::fs::write(path, bytes)
        .map_err(|e| AppError::Io(format!("Failed to write '{}': {}", path.display(), e)))
}
