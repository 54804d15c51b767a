//! Input file scanner
//!
//! Recursive discovery of JSON-lines exports under a directory. Results are
//! sorted by path so a directory run processes files in a stable order.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Input scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Input file scanner
pub struct InputScanner {
    ignore_patterns: Vec<String>,
    extension: String,
}

impl Default for InputScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl InputScanner {
    /// Scanner for `*.json`, skipping VCS and OS metadata entries
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            extension: "json".to_string(),
        }
    }

    /// Scan directory for input files, sorted by path
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root_path.exists() {
            return Err(ScanError::PathNotFound(root_path.to_path_buf()));
        }

        if !root_path.is_dir() {
            return Err(ScanError::NotADirectory(root_path.to_path_buf()));
        }

        let mut files = Vec::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !self.is_ignored(e));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() && self.has_input_extension(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    // Continue scanning, don't abort
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        files.sort();

        tracing::debug!(root = %root_path.display(), files = files.len(), "Input scan complete");

        Ok(files)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .map(|name| self.ignore_patterns.iter().any(|p| p == name))
                .unwrap_or(false)
    }

    fn has_input_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}
