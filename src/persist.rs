//! Disk I/O helpers: load from file and atomic write.
//!
//! A commit writes a temp file next to the target, fsyncs it, and renames it
//! over the target. Readers see either the old document or the new one. The
//! rename is atomic on POSIX filesystems and NTFS; on FAT32 or network shares
//! there are no hard guarantees.

use crate::error::{Error, Result};
use crate::serializer::Serializer;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Knobs for [`atomic_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// fsync the parent directory after the rename so the new directory
    /// entry survives a power loss. Unix only; ignored elsewhere.
    pub sync_dir: bool,
    /// Create missing parent directories before writing.
    pub create_parent: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            sync_dir: true,
            create_parent: false,
        }
    }
}

/// Reads and deserializes the file at `path`. Returns `None` if the file is
/// missing or empty (not an error).
pub fn load<T, S>(path: &Path, serializer: &S) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: Serializer,
{
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    if bytes.is_empty() {
        return Ok(None);
    }
    serializer.deserialize(&bytes).map(Some)
}

/// Like [`load`], but any failure degrades to `T::default()`.
pub fn load_or_default<T, S>(path: &Path, serializer: &S) -> T
where
    T: DeserializeOwned + Default,
    S: Serializer,
{
    match load(path, serializer) {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::debug!(path = %path.display(), "no stored mapping, starting empty");
            T::default()
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "unreadable mapping, starting empty");
            T::default()
        }
    }
}

/// Write `bytes` to a temp file beside `path`, fsync it, then rename it over
/// `path`. On failure `path` is untouched and the temp file is removed.
pub fn atomic_write(path: &Path, bytes: &[u8], options: WriteOptions) -> Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    if options.create_parent {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!(".{file_name}.");
    // Dropping `tmp` on any early return deletes the temp file.
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;

    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    if let Ok(meta) = fs::metadata(path) {
        // Keep the mode of the file we're replacing; temp files start at 0600.
        if let Err(e) = tmp.as_file().set_permissions(meta.permissions()) {
            tracing::warn!(path = %path.display(), error = %e, "could not carry file mode over to replacement");
        }
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    if options.sync_dir {
        sync_parent(dir);
    }
    Ok(())
}

#[cfg(unix)]
fn sync_parent(dir: &Path) {
    if let Err(e) = fs::File::open(dir).and_then(|d| d.sync_all()) {
        tracing::warn!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
}

#[cfg(not(unix))]
fn sync_parent(_dir: &Path) {}
