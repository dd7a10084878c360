//! Filesystem helpers.

use crate::builder::error::BuildError;
use std::path::Path;

/// Write `contents` to `path` via a sibling temp file and a rename, so
/// readers never observe a half-written file. Parent directories are
/// created as needed.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BuildError::fs(parent, e))?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    std::fs::write(&temp_path, contents).map_err(|e| BuildError::fs(&temp_path, e))?;
    std::fs::rename(&temp_path, path).map_err(|e| BuildError::fs(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parents_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/file.pc");

        write_atomic(&path, b"hello").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        assert!(!tmp.path().join("a/b/file.pc.tmp").exists());
    }

    #[test]
    fn test_write_atomic_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("file.txt");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }
}
