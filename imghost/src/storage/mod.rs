//! Persistence of uploaded files under the storage root.
//!
//! Storage is split in two:
//!
//! - [`naming`]: decides the on-disk filename for an upload. Pure apart from the clock and RNG.
//! - [`disk`]: owns the storage root, creates files exclusively under generated names and streams
//!   bytes into them.
//!
//! Files are never mutated once committed and never deleted by this crate.

pub mod disk;
pub mod naming;

use std::{io, path::PathBuf};
use thiserror::Error as ThisError;

pub use disk::{DiskStorage, PendingFile};
pub use naming::{GeneratedName, Namer, TimestampNamer};

/// A file that was fully written to the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Filename inside the storage root, `<token><extension>`
    pub generated_name: String,
    /// Extension carried over from the client-supplied filename, including the dot (may be empty)
    pub extension: String,
    /// Full path of the file on disk
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(ThisError, Debug)]
pub enum StorageError {
    /// The storage root could not be created
    #[error("Failed to prepare storage root {}", path.display())]
    Root { path: PathBuf, source: io::Error },

    /// The destination file could not be created
    #[error("Failed to create {}", path.display())]
    Create { path: PathBuf, source: io::Error },

    /// Writing or flushing bytes into an already created file failed
    #[error("Failed to write {}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// Every generated name was already taken
    #[error("No unused file name found after {attempts} attempts")]
    NamesExhausted { attempts: usize },
}
