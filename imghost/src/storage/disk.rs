//! Local-disk storage root.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};
use tracing::{debug, instrument, warn};

use super::{GeneratedName, Namer, StorageError, StoredFile, TimestampNamer};

/// How many names are tried before giving up when every candidate already exists.
pub const MAX_NAMING_ATTEMPTS: usize = 4;

/// Writes uploads into a single flat directory.
///
/// Files are opened with `create_new`, so an existing file is never truncated or overwritten even
/// if the namer repeats itself. No lock is taken: concurrent uploads only ever race on distinct
/// names, and a lost race surfaces as `AlreadyExists` and a fresh name.
pub struct DiskStorage {
    root: PathBuf,
    namer: Arc<dyn Namer>,
}

impl std::fmt::Debug for DiskStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStorage").field("root", &self.root).finish_non_exhaustive()
    }
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_namer(root, Arc::new(TimestampNamer))
    }

    pub fn with_namer(root: impl Into<PathBuf>, namer: Arc<dyn Namer>) -> Self {
        Self { root: root.into(), namer }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root (and parents) if it does not exist yet
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await.map_err(|source| StorageError::Root {
            path: self.root.clone(),
            source,
        })
    }

    /// Reserve a new file for an upload named `original_name` by the client.
    ///
    /// The returned [`PendingFile`] removes itself from disk unless [`PendingFile::commit`] is
    /// called, so an upload that fails half way leaves nothing behind.
    #[instrument(skip(self), err)]
    pub async fn create(&self, original_name: &str) -> Result<PendingFile, StorageError> {
        for attempt in 1..=MAX_NAMING_ATTEMPTS {
            let name = self.namer.generate(original_name);
            let path = self.root.join(name.file_name());

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => {
                    debug!(generated_name = %name, attempt, "Reserved storage file");
                    return Ok(PendingFile::new(name, path, file));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(generated_name = %name, attempt, "Generated name already exists, retrying");
                }
                Err(source) => return Err(StorageError::Create { path, source }),
            }
        }

        Err(StorageError::NamesExhausted {
            attempts: MAX_NAMING_ATTEMPTS,
        })
    }

    /// Store an in-memory payload in one go
    pub async fn store(&self, original_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        let mut pending = self.create(original_name).await?;
        pending.write_chunk(bytes).await?;
        pending.commit().await
    }
}

/// A reserved file that is being written.
///
/// Dropping it without committing deletes the partial file.
#[derive(Debug)]
pub struct PendingFile {
    name: GeneratedName,
    path: PathBuf,
    file: Option<File>,
    size_bytes: u64,
    committed: bool,
}

impl PendingFile {
    fn new(name: GeneratedName, path: PathBuf, file: File) -> Self {
        Self {
            name,
            path,
            file: Some(file),
            size_bytes: 0,
            committed: false,
        }
    }

    pub fn generated_name(&self) -> &GeneratedName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or_else(|| closed(&self.path))?;

        file.write_all(chunk).await.map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.size_bytes += chunk.len() as u64;
        Ok(())
    }

    /// Flush everything to disk and hand back the finished file.
    ///
    /// Errors deferred by the OS (e.g. a full disk) show up here rather than after the response.
    pub async fn commit(mut self) -> Result<StoredFile, StorageError> {
        let mut file = self.file.take().ok_or_else(|| closed(&self.path))?;

        let flushed = async {
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        flushed.map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })?;

        self.committed = true;
        Ok(StoredFile {
            generated_name: self.name.file_name(),
            extension: self.name.extension().to_string(),
            path: self.path.clone(),
            size_bytes: self.size_bytes,
        })
    }
}

fn closed(path: &Path) -> StorageError {
    StorageError::Write {
        path: path.to_path_buf(),
        source: io::Error::other("file handle already closed"),
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        drop(self.file.take());
        // Drop can't await. A single unlink is short enough to run inline on the worker, and the
        // file is gone by the time the error response goes out.
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial upload"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial upload"),
        }
    }
}
