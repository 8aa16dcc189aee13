//! Filesystem helpers.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tempfile::NamedTempFile;

/// Write `contents` to a synced temporary file next to `path`.
fn stage(path: &Path, contents: &[u8]) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Replace `path` with `contents` atomically.
///
/// Writes to a temporary file in the same directory, syncs it, then renames
/// it over the destination. Readers see either the old or the new file.
pub fn replace_file_sync(path: &Path, contents: &[u8]) -> io::Result<()> {
    stage(path, contents)?.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Async wrapper around [`replace_file_sync`].
pub async fn replace_file(path: PathBuf, contents: Vec<u8>) -> io::Result<()> {
    tokio::task::spawn_blocking(move || replace_file_sync(&path, &contents))
        .await
        .map_err(io::Error::other)?
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum CommitState {
    #[default]
    Pending,
    Committed,
    Abandoned,
}

/// Decides, exactly once, whether a commit step runs or is abandoned.
#[derive(Debug, Clone, Default)]
pub struct CommitGate(Arc<Mutex<CommitState>>);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `step` unless the gate was abandoned first.
    pub fn commit<T>(&self, step: impl FnOnce() -> io::Result<T>) -> io::Result<T> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == CommitState::Abandoned {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "abandoned before commit",
            ));
        }
        let value = step()?;
        *state = CommitState::Committed;
        Ok(value)
    }

    /// Abandon the gate. `false` when the commit already happened.
    pub fn abandon(&self) -> bool {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == CommitState::Committed {
            return false;
        }
        *state = CommitState::Abandoned;
        true
    }
}

/// [`replace_file`] bounded by `timeout`.
///
/// The rename is the commit point. A write reported as timed out never
/// renames afterwards; one that renamed just before the deadline reports
/// success.
pub async fn replace_file_within(
    path: PathBuf,
    contents: Vec<u8>,
    timeout: Duration,
) -> io::Result<()> {
    let gate = CommitGate::new();
    let worker = gate.clone();
    let task = tokio::task::spawn_blocking(move || {
        let tmp = stage(&path, &contents)?;
        worker.commit(|| tmp.persist(&path).map(|_| ()).map_err(|e| e.error))
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.map_err(io::Error::other)?,
        Err(_) if gate.abandon() => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out after {:?}", timeout),
        )),
        // Renamed just before the deadline.
        Err(_) => Ok(()),
    }
}

/// Read a file, treating a missing file as `None`.
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
