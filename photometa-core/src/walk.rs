//! Recursive image file discovery.

use crate::config::Config;
use crate::PhotometaError;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Enumerate image files under `dir`, recursively.
///
/// Hidden entries (including the `.photometa` cache/index directory) are
/// skipped; results are sorted lexicographically so pagination and scan
/// order stay stable across runs.
pub fn discover_images(dir: &Path, config: &Config) -> crate::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PhotometaError::DirectoryUnavailable(dir.to_path_buf()));
    }
    // Re-check readability up front so a vanished root surfaces once,
    // instead of as a silent empty listing.
    std::fs::read_dir(dir).map_err(|_| PhotometaError::DirectoryUnavailable(dir.to_path_buf()))?;

    let mut builder = WalkBuilder::new(dir);
    builder.standard_filters(false);
    builder.filter_entry(|entry| {
        entry
            .file_name()
            .to_str()
            .map(|name| !name.starts_with('.'))
            .unwrap_or(true)
    });

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            // Unreadable subtrees are skipped, not fatal
            Err(_) => continue,
        };
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if config.is_image_path(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn discovers_recursively_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("b.jpg"), b"x").unwrap();
        fs::write(root.join("a.PNG"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("sub/c.jpeg"), b"x").unwrap();

        let files = discover_images(root, &Config::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.jpg", "sub/c.jpeg"]);
    }

    #[test]
    fn skips_hidden_cache_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".photometa/artifacts")).unwrap();
        fs::write(root.join(".photometa/artifacts/t.jpg"), b"x").unwrap();
        fs::write(root.join("real.jpg"), b"x").unwrap();

        let files = discover_images(root, &Config::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("real.jpg"));
    }

    #[test]
    fn missing_root_is_directory_unavailable() {
        let dir = TempDir::new().unwrap();
        let err = discover_images(&dir.path().join("nope"), &Config::default()).unwrap_err();
        assert!(matches!(err, PhotometaError::DirectoryUnavailable(_)));
    }
}
