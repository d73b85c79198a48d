use crate::error::TandemError;
use fs2::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

/// Lock file of a workspace, relative to its root.
pub const RUN_LOCK_PATH: &str = ".tandem/run.lock";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// RAII guard ensuring at most one mutating run per workspace.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Acquire the exclusive advisory lock at `path`, polling until `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Lock`] when another holder keeps the lock past
    /// `timeout`, or [`TandemError::Io`] if the lock file cannot be created.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, TandemError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            if file.try_lock_exclusive().is_ok() {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }

            if start.elapsed() >= timeout {
                return Err(TandemError::Lock {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }

    /// Acquire the lock of the workspace rooted at `root`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::acquire`].
    pub fn for_workspace(root: &Path, timeout: Duration) -> Result<Self, TandemError> {
        Self::acquire(&root.join(RUN_LOCK_PATH), timeout)
    }

    /// Explicitly release the lock. Release also happens automatically on drop.
    pub fn release(self) {
        drop(self);
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
