//! File backend for the parameter store and export files.

use crate::error::{CryptnosError, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A single file on disk, written atomically.
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the entire storage file into memory.
    ///
    /// # Errors
    ///
    /// Returns `StoreIo` if the file cannot be read.
    pub fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| io_error("read", &self.path, e))
    }

    /// Saves data to the storage file using atomic write.
    ///
    /// This method ensures crash-safety by:
    /// 1. Writing data to a temporary file with random name
    /// 2. Syncing the temporary file to disk
    /// 3. Atomically replacing the old file with the new one
    /// 4. Syncing the parent directory to ensure the rename is persisted
    ///
    /// If a crash occurs during save, either the old or new file will be present,
    /// never a corrupted partial write.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreIo` if the file cannot be written.
    pub fn save(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error("create directory for", &self.path, e))?;
        }

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .map_err(|e| io_error("create temporary file for", &self.path, e))?;

        // write data
        let written = tmp_file.write_all(data).and_then(|_| tmp_file.sync_all());
        drop(tmp_file);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error("write", &self.path, e));
        }

        //atomic replace
        if let Err(e) = self.atomic_replace(&tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        self.sync_parent();
        tracing::debug!(path = %self.path.display(), bytes = data.len(), "saved file");
        Ok(())
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Uses cryptographically secure random bytes to avoid name collisions.
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|_| CryptnosError::Crypto("OS random generator unavailable".into()))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| CryptnosError::StoreIo(format!("'{}' is not a file path", self.path.display())))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
    /// to ensure the operation is truly atomic and persisted to disk.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        // ReplaceFileW requires an existing target
        if !self.path.exists() {
            return fs::rename(tmp_path, &self.path)
                .map_err(|e| io_error("move into place", &self.path, e));
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            let err = std::io::Error::last_os_error();
            return Err(io_error("atomically replace", &self.path, err));
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path).map_err(|e| io_error("atomically replace", &self.path, e))
    }

    /// fsync the parent directory so the rename itself is durable.
    #[cfg(not(target_os = "windows"))]
    fn sync_parent(&self) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                tracing::warn!(path = %parent.display(), error = %e, "directory fsync failed");
            }
        }
    }

    #[cfg(target_os = "windows")]
    fn sync_parent(&self) {}
}

fn io_error(action: &str, path: &Path, err: std::io::Error) -> CryptnosError {
    CryptnosError::StoreIo(format!("failed to {action} '{}': {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_saved_bytes() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("params.json"));

        storage.save(b"{\"entries\":{}}").unwrap();
        assert!(storage.exists());
        assert_eq!(storage.load().unwrap(), b"{\"entries\":{}}");
    }

    #[test]
    fn load_missing_file_is_store_io() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing.json"));

        assert!(!storage.exists());
        assert!(matches!(storage.load(), Err(CryptnosError::StoreIo(_))));
    }

    #[test]
    fn tmp_paths_are_unique_siblings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("params.json");
        let storage = Storage::new(path.clone());

        let a = storage.random_tmp_path().unwrap();
        let b = storage.random_tmp_path().unwrap();

        assert_eq!(a.parent(), path.parent());
        assert_ne!(a, path);
        assert_ne!(a, b);
    }

    #[test]
    fn save_replaces_previous_content_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("export.txt");
        let storage = Storage::new(path.clone());

        storage.save(&vec![b'x'; 10_000]).unwrap();
        storage.save(b"second").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"second");
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["export.txt"]);
    }

    #[test]
    fn parent_directories_are_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("params.json");

        Storage::new(nested.clone()).save(b"data").unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn unwritable_location_is_store_io() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        let storage = Storage::new(blocker.join("params.json"));
        assert!(matches!(storage.save(b"data"), Err(CryptnosError::StoreIo(_))));
    }
}
