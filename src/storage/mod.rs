//! Storage Layer - SQLite-backed cache files
//!
//! One file per schema kind, each with a `db_info(dbversion, checksum)`
//! stamp:
//! - primary: packages, files, requires, provides, conflicts, obsoletes
//! - filelists: packages(pkgKey, pkgId), filelist(pkgKey, dirname, filenames, filetypes)
//! - other: packages(pkgKey, pkgId), changelog(pkgKey, author, date, changelog)

pub mod schema;
pub mod sqlite;
pub mod writer;

pub use schema::SchemaKind;
pub use sqlite::{
    CACHE_DBVERSION, CacheHandle, CacheStatus, CacheStore, OpenOutcome, RebuildScope, Stamp,
    db_filename, open_read_only, read_stamp,
};
pub use writer::{
    ChangelogWriter, DependencyWriter, FileListWriter, FileWriter, PackageIdWriter, PackageWriter,
    WriteStats,
};
