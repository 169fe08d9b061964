//! Scoped temporary files beside a destination.
//!
//! Every output is written to a [`ScratchFile`] in the destination's own
//! directory and then renamed over the destination. The rename stays on one
//! filesystem, so readers see either the old file or the complete new one.
//! A scratch file that is dropped without [`ScratchFile::persist`] is
//! deleted, including on error paths and panics.
//!
//! Permissions follow what a plain create would give: a replaced file keeps
//! its mode, a new one gets `0o666` minus the process umask.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const PREFIX: &str = ".imgfit-";
const SUFFIX: &str = ".tmp";

/// Mode requested for new files; the umask is applied on open.
#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o666;

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot replace {path}: {source}")]
    Persist {
        path: String,
        source: std::io::Error,
    },
}

/// Uniquely named temp file that is removed unless persisted.
#[derive(Debug)]
pub struct ScratchFile {
    file: NamedTempFile,
}

impl ScratchFile {
    /// Create an empty scratch file in the directory that will hold `dest`.
    ///
    /// Missing parent directories are created.
    pub fn create_beside(dest: &Path) -> Result<Self, ScratchError> {
        let dir = ensure_parent_dir(dest)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX).suffix(SUFFIX);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(NEW_FILE_MODE));
        }
        let file = builder.tempfile_in(dir)?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), ScratchError> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Flush, then atomically move the scratch file to `dest`, replacing
    /// any existing file and keeping its permissions. Returns the size of
    /// the file now at `dest`.
    pub fn persist(mut self, dest: &Path) -> Result<u64, ScratchError> {
        self.file.flush()?;
        if let Ok(existing) = fs::metadata(dest) {
            self.file.as_file().set_permissions(existing.permissions())?;
        }
        self.file.as_file().sync_all()?;
        self.file.persist(dest).map_err(|e| ScratchError::Persist {
            path: dest.display().to_string(),
            source: e.error,
        })?;
        file_size(dest)
    }
}

/// Write `bytes` to `dest` through a scratch file.
pub fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<u64, ScratchError> {
    let mut scratch = ScratchFile::create_beside(dest)?;
    scratch.write_all(bytes)?;
    scratch.persist(dest)
}

pub fn file_size(path: &Path) -> Result<u64, ScratchError> {
    Ok(fs::metadata(path)?.len())
}

/// Create the parent directory of `path` if needed and return it.
///
/// A bare file name resolves to the current directory.
pub fn ensure_parent_dir(path: &Path) -> Result<PathBuf, ScratchError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent)
}

/// Whether `path` looks like a scratch file left behind by this crate.
pub fn is_scratch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(SUFFIX))
}
