//! Atomic file writes: temp file in the target directory, fsync, rename.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically replace `path` with `content`.
///
/// Readers observe either the previous file or the complete new one, never a
/// partial write. The parent directory is created when missing.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;

    temp_file
        .write_all(content.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to atomically write file: {path}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn writes_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir).join("record.json");

        write_file_atomic(&path, "{\"v\":1}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\":1}");

        write_file_atomic(&path, "{\"v\":2}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\":2}");
    }

    #[test]
    fn creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir).join("nested").join("deeper").join("a.json");
        write_file_atomic(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let path = utf8(&dir).join("a.json");
        write_file_atomic(&path, "x").unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
