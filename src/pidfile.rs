//! PID file guarding against two controllers driving the same fans.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_PID_FILE: &str = "/var/run/fanctl.pid";

pub type PidFileResult<T> = Result<T, PidFileError>;

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("PID file exists ({}). Already running?", .0.display())]
    AlreadyRunning(PathBuf),
}

/// Existing PID file, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates `path` and writes the current process id into it.
    ///
    /// # Returns
    /// - `Err(AlreadyRunning)` if the file already exists
    /// - `Ok(None)` if the file couldn't be written for another reason (logged as a warning)
    /// - `Ok(Some(guard))` otherwise
    pub fn create(path: impl AsRef<Path>) -> PidFileResult<Option<Self>> {
        let path = path.as_ref();

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(path)
        {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PidFileError::AlreadyRunning(path.to_path_buf()));
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "Couldn't create PID file");
                return Ok(None);
            }
        };

        let guard = Self {
            path: path.to_path_buf(),
        };

        if let Err(error) = write!(file, "{}", std::process::id()) {
            warn!(path = %path.display(), %error, "Couldn't write to PID file");
        }

        debug!(path = %path.display(), "PID file created");
        Ok(Some(guard))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %error, "Couldn't remove PID file");
        }
    }
}
