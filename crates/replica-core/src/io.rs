//! Atomic file writes with advisory locking

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use fs2::FileExt;

use crate::{Error, Result};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

fn state_error(path: &Path, err: std::io::Error) -> Error {
    Error::StateFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Write content atomically to a file with locking.
///
/// Writes to a temp file in the same directory under an exclusive lock,
/// syncs it, then renames it over `path`.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| state_error(parent, e))?;
    }

    // Unique per call so concurrent writers in one process never share a temp file.
    let temp_name = format!(
        ".{}.{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    );
    let temp_path = path.with_file_name(&temp_name);

    let written = write_then_rename(&temp_path, path, content);
    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn write_then_rename(temp_path: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| state_error(temp_path, e))?;

    temp_file.lock_exclusive().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    temp_file
        .write_all(content)
        .map_err(|e| state_error(temp_path, e))?;
    temp_file
        .sync_all()
        .map_err(|e| state_error(temp_path, e))?;

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    fs::rename(temp_path, path).map_err(|e| state_error(path, e))
}

/// Read a file under a shared lock, or `None` if it does not exist.
pub fn read_locked(path: &Path) -> Result<Option<String>> {
    use std::io::Read;

    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(state_error(path, err)),
    };
    file.lock_shared().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;

    let mut content = String::new();
    (&file)
        .read_to_string(&mut content)
        .map_err(|e| state_error(path, e))?;
    Ok(Some(content))
}
