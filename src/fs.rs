//! Filesystem access used by the cache and checksum.
//!
//! The database only needs a handful of operations, so they sit behind a
//! small trait; [`OsFileSystem`] is the real implementation.

use glob::{glob, Pattern};
use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// A file found while enumerating a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    /// Path relative to the enumerated directory, '/' separated
    pub name: String,
    /// Last modification time in 100ns ticks since the Unix epoch
    pub modified: i64,
}

/// Filesystem capability consumed by the sprite database.
pub trait FileSystem {
    fn exists(&self, path: &Path) -> bool;

    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the file at `path` with `bytes`.
    ///
    /// A reader must never observe a partially written file.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Every regular file below `dir`, recursively.
    fn enumerate_files(&self, dir: &Path) -> io::Result<Vec<FileStamp>>;
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target and rename over it
        let mut temp = path.as_os_str().to_owned();
        temp.push(".tmp");
        let result = fs::write(&temp, bytes).and_then(|()| fs::rename(&temp, path));
        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }

    fn enumerate_files(&self, dir: &Path) -> io::Result<Vec<FileStamp>> {
        let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
        let paths = glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(io::Error::from)?;
            let metadata = fs::metadata(&path)?;
            if !metadata.is_file() {
                continue;
            }
            let relative = path.strip_prefix(dir).unwrap_or(&path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push(FileStamp { name, modified: ticks(metadata.modified()?) });
        }
        Ok(files)
    }
}

/// 100ns ticks since the Unix epoch; negative before it.
pub fn ticks(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (after.as_nanos() / 100) as i64,
        Err(before) => -((before.duration().as_nanos() / 100) as i64),
    }
}
