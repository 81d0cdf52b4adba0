// Scratch file guard: owns the on-disk location of the staged image for the
// whole run and removes it when dropped, whichever step ended the run.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{PosterError, Result};

#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve `dir/file_name`, creating `dir` if needed. The file itself is
    /// only created by [`ScratchFile::write`], but it is removed on drop either way.
    pub fn reserve(dir: &Path, file_name: &str) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|source| PosterError::Scratch {
            path: dir.to_path_buf(),
            source,
        })?;
        Ok(ScratchFile {
            path: dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.path, bytes).map_err(|source| self.io_error(source))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "scratch file written");
        Ok(())
    }

    pub fn open(&self) -> Result<fs::File> {
        fs::File::open(&self.path).map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> PosterError {
        PosterError::Scratch {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "scratch file removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), error = %err, "failed to remove scratch file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(dir.path(), "image.png").unwrap();
        scratch.write(b"png").unwrap();
        let path = scratch.path().to_path_buf();
        assert!(path.exists());

        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn dropping_an_unwritten_reservation_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(&dir.path().join("nested"), "image.png").unwrap();
        assert!(!scratch.path().exists());
        drop(scratch);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn open_before_write_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = ScratchFile::reserve(dir.path(), "missing.png").unwrap();
        let err = scratch.open().unwrap_err();
        assert!(matches!(err, PosterError::Scratch { ref path, .. } if path.ends_with("missing.png")));
    }
}
