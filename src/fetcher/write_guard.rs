//! Crash-safe destination writes.
//!
//! Objects are streamed into `<destination>.s3fetch_tmp` and renamed over
//! the destination once complete. Other processes therefore observe either
//! the old file (or its absence) or the fully written new file, never a
//! partial state, and an interrupted run leaves at worst a temp file that
//! the next run replaces.

use std::path::{Path, PathBuf};

use tokio::io;

/// Suffix appended to the destination filename while the object streams in.
pub const TMP_SUFFIX: &str = "s3fetch_tmp";

/// Guard owning the temp path for one destination.
///
/// Exactly one of [`commit`](DestinationWriteGuard::commit) or
/// [`discard`](DestinationWriteGuard::discard) finishes the guard; dropping
/// it without either removes the temp file best-effort.
pub struct DestinationWriteGuard {
    final_path: PathBuf,
    temp_path: PathBuf,
    committed: bool,
}

impl DestinationWriteGuard {
    /// Prepare the temp path for `destination`, removing any stale temp file
    /// left behind by a previous interrupted run.
    pub async fn new(destination: &Path) -> io::Result<Self> {
        let temp_path = temp_path_for(destination);
        match tokio::fs::remove_file(&temp_path).await {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(error),
        }
        Ok(Self {
            final_path: destination.to_path_buf(),
            temp_path,
            committed: false,
        })
    }

    /// The path the fetcher streams into.
    pub fn staging_path(&self) -> &Path {
        &self.temp_path
    }

    /// Atomically rename the temp file over the destination.
    ///
    /// POSIX `rename` replaces an existing destination on the same
    /// filesystem. On failure the temp file is removed best-effort and the
    /// rename error is returned.
    pub async fn commit(mut self) -> io::Result<()> {
        match tokio::fs::rename(&self.temp_path, &self.final_path).await {
            Ok(()) => {
                self.committed = true;
                Ok(())
            }
            Err(error) => {
                let _ = tokio::fs::remove_file(&self.temp_path).await;
                self.committed = true;
                Err(error)
            }
        }
    }

    /// Remove the temp file best-effort after a failed or aborted fetch.
    pub async fn discard(mut self) {
        let _ = tokio::fs::remove_file(&self.temp_path).await;
        self.committed = true;
    }
}

impl Drop for DestinationWriteGuard {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn temp_path_for(destination: &Path) -> PathBuf {
    let mut path = destination.as_os_str().to_os_string();
    path.push(".");
    path.push(TMP_SUFFIX);
    PathBuf::from(path)
}
