//! Container file discovery
//!
//! Recursive walk of a pack root collecting container files. Hidden
//! directories and the configured utility directories (backup, temp, cache)
//! are pruned; hidden and undersized files are ignored.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Discovered container file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Container file scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    extension: String,
    min_bytes: u64,
    skip_dirs: Vec<String>,
}

impl FileScanner {
    pub fn new(extension: &str, min_bytes: u64, skip_dirs: &[String]) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_lowercase(),
            min_bytes,
            skip_dirs: skip_dirs.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    /// Sorted list of container files under `root`
    pub fn scan(&self, root: &Path) -> Result<Vec<ContainerFile>, DiscoveryError> {
        if !root.exists() {
            return Err(DiscoveryError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_pruned_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable path during discovery");
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.is_container(&entry) {
                continue;
            }

            match entry.metadata() {
                Ok(meta) if meta.len() >= self.min_bytes => files.push(ContainerFile {
                    path: entry.path().to_path_buf(),
                    size_bytes: meta.len(),
                }),
                Ok(meta) => {
                    debug!(file = %entry.path().display(), bytes = meta.len(), "Skipping undersized container");
                }
                Err(e) => {
                    warn!(file = %entry.path().display(), error = %e, "Skipping unreadable file");
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn is_pruned_dir(&self, entry: &DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.skip_dirs.contains(&name.to_lowercase())
    }

    fn is_container(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase() == self.extension)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_sized(path: &Path, bytes: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0u8; bytes]).unwrap();
    }

    fn scanner() -> FileScanner {
        let skip: Vec<String> = ["backup", "temp", "cache"].iter().map(|s| s.to_string()).collect();
        FileScanner::new("blend", 1024, &skip)
    }

    #[test]
    fn test_discovers_nested_containers_sorted() {
        let dir = TempDir::new().unwrap();
        write_sized(&dir.path().join("b/city.blend"), 2048);
        write_sized(&dir.path().join("a/props.BLEND"), 1024);
        write_sized(&dir.path().join("a/notes.txt"), 4096);

        let files = scanner().scan(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a/props.BLEND"), PathBuf::from("b/city.blend")]);
        assert_eq!(files[1].size_bytes, 2048);
    }

    #[test]
    fn test_skips_hidden_utility_dirs_and_small_files() {
        let dir = TempDir::new().unwrap();
        write_sized(&dir.path().join(".git/x.blend"), 2048);
        write_sized(&dir.path().join("Backup/x.blend"), 2048);
        write_sized(&dir.path().join("cache/deep/x.blend"), 2048);
        write_sized(&dir.path().join("tiny.blend"), 1023);
        write_sized(&dir.path().join(".hidden.blend"), 2048);
        write_sized(&dir.path().join("keep/ok.blend"), 2048);

        let files = scanner().scan(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("keep/ok.blend"));
    }

    #[test]
    fn test_missing_root() {
        let result = scanner().scan(Path::new("/definitely/not/here"));
        assert!(matches!(result, Err(DiscoveryError::PathNotFound(_))));
    }
}
