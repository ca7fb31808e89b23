//! # Repocache - SQLite cache of package repository metadata
//!
//! Keeps package attributes, dependencies, file lists and changelogs in
//! per-kind SQLite files so a package manager does not re-parse large
//! metadata documents on every run.
//!
//! Repocache provides:
//! - A coherency protocol deciding whether a cache file is current, needs a
//!   data refresh, or must be rebuilt from scratch
//! - Three schema kinds (primary, filelists, other) with cascading deletes
//! - Reusable prepared-statement row writers keyed by a surrogate `pkgKey`
//! - A compaction codec packing per-file rows into per-directory rows

pub mod package;
pub mod filelist;
pub mod storage;
pub mod builder;
pub mod query;
pub mod ui;
pub mod output;
pub mod config;

use std::path::PathBuf;

// Re-exports for convenient access
pub use package::{ChangelogEntry, Dependency, DependencyKind, FileEntry, FileKind, Package};
pub use filelist::{EncodedFileGroup, EncodedFileList};
pub use storage::{CacheHandle, CacheStatus, CacheStore, OpenOutcome, RebuildScope, SchemaKind, Stamp};
pub use builder::{BuildOutcome, BuildReport};

/// Result type alias for Repocache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Repocache operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Can not open SQL database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    #[error("Can not create {object}: {source}")]
    Schema {
        object: &'static str,
        source: rusqlite::Error,
    },

    #[error("Can not prepare {pipeline} insertion: {source}")]
    Prepare {
        pipeline: &'static str,
        source: rusqlite::Error,
    },

    #[error("Error adding {pipeline} to SQL: {source}")]
    Write {
        pipeline: &'static str,
        source: rusqlite::Error,
    },

    #[error("Can not update db_info table: {source}")]
    Stamp { source: rusqlite::Error },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file entry: {0}")]
    InvalidFileEntry(String),

    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    #[error("Invalid input document: {0}")]
    Input(#[from] serde_json::Error),
}
