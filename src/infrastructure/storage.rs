//! File storage primitives shared by the parameter store and the resource
//! directory: atomic replace, content hashing and content-addressed copies.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Hash collision: file {src} != resource file {dst}")]
    Collision { src: PathBuf, dst: PathBuf },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of [`install_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    Copied,
    AlreadyPresent,
}

/// Replace `path` with `contents` so readers see either the old or the new
/// file, never a mix.
///
/// The temp file lives in the destination directory so the final rename
/// stays on one filesystem.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    debug!(path = %path.display(), bytes = contents.len(), "atomically replaced file");
    Ok(())
}

/// Hex md5 digest of a file's content.
pub fn md5_hex(path: &Path) -> Result<String, StorageError> {
    let mut file = File::open(path).map_err(|e| StorageError::io(path, e))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| StorageError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// `<file name>.<md5 of content>`.
pub fn content_addressed_name(src: &Path) -> Result<String, StorageError> {
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            StorageError::io(
                src,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
    Ok(format!("{file_name}.{}", md5_hex(src)?))
}

fn same_content(a: &Path, b: &Path) -> Result<bool, StorageError> {
    let a_meta = fs::metadata(a).map_err(|e| StorageError::io(a, e))?;
    let b_meta = fs::metadata(b).map_err(|e| StorageError::io(b, e))?;
    if a_meta.len() != b_meta.len() {
        return Ok(false);
    }
    let a_bytes = fs::read(a).map_err(|e| StorageError::io(a, e))?;
    let b_bytes = fs::read(b).map_err(|e| StorageError::io(b, e))?;
    Ok(a_bytes == b_bytes)
}

/// Copy `src` to `dst` atomically unless an identical file is already there.
///
/// A different file already at `dst` is a collision.
pub fn install_file(src: &Path, dst: &Path) -> Result<InstallOutcome, StorageError> {
    if dst.exists() {
        if same_content(src, dst)? {
            warn!(dst = %dst.display(), "skip copying as file already exists");
            return Ok(InstallOutcome::AlreadyPresent);
        }
        return Err(StorageError::Collision {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
    }
    let contents = fs::read(src).map_err(|e| StorageError::io(src, e))?;
    atomic_write(dst, &contents)?;
    info!(src = %src.display(), dst = %dst.display(), "file installed");
    Ok(InstallOutcome::Copied)
}
