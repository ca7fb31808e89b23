//! Cache file coherency protocol
//!
//! A cache file records what it reflects in a single `db_info` row, the
//! stamp. Opening compares the stamp against the compiled format version
//! and the checksum of the metadata the caller is about to load:
//!
//! | stored stamp                | outcome                              |
//! |-----------------------------|--------------------------------------|
//! | no file                     | create, full build                   |
//! | version differs             | delete file, recreate, full build    |
//! | unreadable / missing stamp  | delete file, recreate, full build    |
//! | checksum differs            | clear stamp, data refresh            |
//! | both match                  | current, nothing to do               |
//!
//! The stamp is only written by [`CacheStore::finalize`] after the rebuild
//! transaction committed, so a crash mid-rebuild always reopens as stale.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};

use super::schema::{self, SchemaKind};
use crate::{Error, Result};

/// Format version of the cache files this build reads and writes
pub const CACHE_DBVERSION: i64 = 10;

/// Conventional cache file name for a prefix
pub fn db_filename(prefix: &str) -> String {
    format!("{prefix}.sqlite")
}

/// What a cache file currently reflects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub format_version: i64,
    pub checksum: String,
}

/// How much of a cache file has to be rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildScope {
    /// Fresh file with a fresh schema; every row must be written
    Full,
    /// Schema kept, stamp cleared; row data must be replaced, not appended
    Data,
}

/// Freshness of a cache file, as probed without modifying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    Absent,
    Current,
    VersionMismatch { found: i64 },
    ChecksumMismatch,
    Unreadable { reason: String },
}

impl CacheStatus {
    /// Rebuild scope `open` would report for this status
    pub fn rebuild_scope(&self) -> Option<RebuildScope> {
        match self {
            CacheStatus::Current => None,
            CacheStatus::ChecksumMismatch => Some(RebuildScope::Data),
            CacheStatus::Absent | CacheStatus::VersionMismatch { .. } | CacheStatus::Unreadable { .. } => {
                Some(RebuildScope::Full)
            }
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Absent => write!(f, "absent"),
            CacheStatus::Current => write!(f, "current"),
            CacheStatus::VersionMismatch { found } => {
                write!(f, "version mismatch (file is version {found})")
            }
            CacheStatus::ChecksumMismatch => write!(f, "checksum mismatch"),
            CacheStatus::Unreadable { reason } => write!(f, "unreadable ({reason})"),
        }
    }
}

/// Result of [`CacheStore::open`]
#[derive(Debug)]
pub enum OpenOutcome {
    /// The file already reflects the expected checksum; use it as-is
    Current,
    /// The file must be (re)populated, then passed to `finalize`
    NeedsBuild(CacheHandle),
}

/// Writable cache file in the middle of a rebuild.
///
/// Holds the connection and the open rebuild transaction. Dropping the
/// handle without finalizing rolls the transaction back and leaves the file
/// without a stamp.
#[derive(Debug)]
pub struct CacheHandle {
    conn: Connection,
    path: PathBuf,
    kind: SchemaKind,
    scope: RebuildScope,
}

impl CacheHandle {
    fn begin(conn: Connection, path: &Path, kind: SchemaKind, scope: RebuildScope) -> Result<Self> {
        // Bulk-load mode: a crash before finalize is recovered by rebuilding.
        conn.execute_batch("PRAGMA synchronous = OFF")?;

        if scope == RebuildScope::Data {
            conn.execute("DELETE FROM db_info", [])
                .map_err(|source| Error::Stamp { source })?;
        }

        conn.execute_batch("BEGIN TRANSACTION")?;

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            kind,
            scope,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn scope(&self) -> RebuildScope {
        self.scope
    }

    /// Delete a package row; the kind's trigger removes its dependent rows.
    ///
    /// Returns whether a row with that key existed.
    pub fn remove_package(&self, pkg_key: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM packages WHERE pkgKey = ?1", [pkg_key])?;
        Ok(removed > 0)
    }
}

/// Opens cache files and stamps them once rebuilt
#[derive(Debug, Clone)]
pub struct CacheStore {
    format_version: i64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self::with_format_version(CACHE_DBVERSION)
    }

    /// Store that expects a different format version than this build's
    pub fn with_format_version(format_version: i64) -> Self {
        Self { format_version }
    }

    /// Open a cache file, deciding whether it has to be rebuilt.
    ///
    /// A file that is stale by version, has no readable stamp, or cannot be
    /// opened at all is deleted and recreated once. Failing to create it
    /// after that is fatal.
    pub fn open(&self, path: &Path, checksum: &str, kind: SchemaKind) -> Result<OpenOutcome> {
        if path.exists() {
            match Connection::open(path) {
                Ok(conn) => match self.classify(&conn, checksum, kind) {
                    CacheStatus::Current => {
                        tracing::debug!("{} is up to date", path.display());
                        return Ok(OpenOutcome::Current);
                    }
                    CacheStatus::ChecksumMismatch => {
                        tracing::info!("{} needs updating, reading in metadata", path.display());
                        let handle = CacheHandle::begin(conn, path, kind, RebuildScope::Data)?;
                        return Ok(OpenOutcome::NeedsBuild(handle));
                    }
                    CacheStatus::VersionMismatch { found } => {
                        tracing::info!(
                            "{} is version {}, we need {}, will regenerate",
                            path.display(),
                            found,
                            self.format_version
                        );
                    }
                    CacheStatus::Unreadable { reason } => {
                        tracing::warn!("{} is unusable ({}), will regenerate", path.display(), reason);
                    }
                    CacheStatus::Absent => {}
                },
                Err(e) => {
                    tracing::warn!("Can not open {}: {}, will regenerate", path.display(), e);
                }
            }
            discard(path);
        }

        let conn = Connection::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        schema::create_db_info(&conn)?;
        kind.create(&conn)?;

        tracing::info!("Creating {} cache at {}", kind, path.display());
        let handle = CacheHandle::begin(conn, path, kind, RebuildScope::Full)?;
        Ok(OpenOutcome::NeedsBuild(handle))
    }

    /// Commit the rebuild and stamp the file with `checksum`.
    ///
    /// Consumes the handle: a rebuild is finalized exactly once.
    pub fn finalize(&self, handle: CacheHandle, checksum: &str) -> Result<()> {
        let CacheHandle { conn, path, .. } = handle;

        conn.execute_batch("COMMIT")?;
        conn.execute_batch("PRAGMA synchronous = FULL")?;

        conn.execute("DELETE FROM db_info", [])
            .map_err(|source| Error::Stamp { source })?;
        conn.execute(
            "INSERT INTO db_info (dbversion, checksum) VALUES (?1, ?2)",
            params![self.format_version, checksum],
        )
        .map_err(|source| Error::Stamp { source })?;

        tracing::info!("Stamped {} with checksum {}", path.display(), checksum);
        Ok(())
    }

    /// Probe a cache file's freshness without modifying it
    pub fn status(&self, path: &Path, checksum: &str, kind: SchemaKind) -> Result<CacheStatus> {
        if !path.exists() {
            return Ok(CacheStatus::Absent);
        }

        match open_read_only(path) {
            Ok(conn) => Ok(self.classify(&conn, checksum, kind)),
            Err(e) => Ok(CacheStatus::Unreadable {
                reason: e.to_string(),
            }),
        }
    }

    fn classify(&self, conn: &Connection, checksum: &str, kind: SchemaKind) -> CacheStatus {
        let stamp = match read_stamp_from(conn) {
            Ok(Some(stamp)) => stamp,
            Ok(None) => {
                return CacheStatus::Unreadable {
                    reason: "no stamp".to_string(),
                };
            }
            Err(e) => {
                return CacheStatus::Unreadable {
                    reason: e.to_string(),
                };
            }
        };

        if stamp.format_version != self.format_version {
            return CacheStatus::VersionMismatch {
                found: stamp.format_version,
            };
        }

        if let Some(table) = missing_table(conn, kind) {
            return CacheStatus::Unreadable {
                reason: format!("no {table} table"),
            };
        }

        if stamp.checksum != checksum {
            CacheStatus::ChecksumMismatch
        } else {
            CacheStatus::Current
        }
    }
}

/// Open an existing cache file without write access
pub fn open_read_only(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| Error::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the stamp of a cache file, if it has one
pub fn read_stamp(path: &Path) -> Result<Option<Stamp>> {
    if !path.exists() {
        return Ok(None);
    }
    let conn = open_read_only(path)?;
    read_stamp_from(&conn)
}

fn read_stamp_from(conn: &Connection) -> Result<Option<Stamp>> {
    conn.query_row("SELECT dbversion, checksum FROM db_info LIMIT 1", [], |row| {
        Ok(Stamp {
            format_version: row.get(0)?,
            checksum: row.get(1)?,
        })
    })
    .optional()
    .map_err(Into::into)
}

/// First table of the kind's layout that the file lacks
fn missing_table(conn: &Connection, kind: SchemaKind) -> Option<&'static str> {
    std::iter::once("packages")
        .chain(kind.dependent_tables().iter().copied())
        .find(|table| {
            let found: rusqlite::Result<i64> = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            );
            !matches!(found, Ok(n) if n > 0)
        })
}

/// Remove a cache file and any journal left next to it
fn discard(path: &Path) {
    let mut victims = vec![path.to_path_buf()];
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        victims.push(PathBuf::from(sidecar));
    }

    for victim in victims {
        if let Err(e) = fs::remove_file(&victim) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Can not remove {}: {}", victim.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn expect_build(outcome: OpenOutcome) -> CacheHandle {
        match outcome {
            OpenOutcome::NeedsBuild(handle) => handle,
            OpenOutcome::Current => panic!("expected a rebuild"),
        }
    }

    fn build_stamped(store: &CacheStore, path: &Path, checksum: &str, kind: SchemaKind) {
        let handle = expect_build(store.open(path, checksum, kind).unwrap());
        handle
            .connection()
            .execute("INSERT INTO packages (pkgId) VALUES ('abc')", [])
            .unwrap();
        store.finalize(handle, checksum).unwrap();
    }

    #[test]
    fn test_absent_then_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();

        let handle = expect_build(store.open(&path, "sum1", SchemaKind::Other).unwrap());
        assert_eq!(handle.scope(), RebuildScope::Full);
        assert_eq!(handle.kind(), SchemaKind::Other);
        store.finalize(handle, "sum1").unwrap();

        assert!(matches!(
            store.open(&path, "sum1", SchemaKind::Other).unwrap(),
            OpenOutcome::Current
        ));
        assert_eq!(
            read_stamp(&path).unwrap(),
            Some(Stamp {
                format_version: CACHE_DBVERSION,
                checksum: "sum1".to_string(),
            })
        );
    }

    #[test]
    fn test_checksum_mismatch_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("filelists"));
        let store = CacheStore::new();
        build_stamped(&store, &path, "sum1", SchemaKind::FileLists);

        let handle = expect_build(store.open(&path, "sum2", SchemaKind::FileLists).unwrap());
        assert_eq!(handle.scope(), RebuildScope::Data);

        let conn = handle.connection();
        assert_eq!(count(conn, "db_info"), 0);
        assert_eq!(count(conn, "packages"), 1);
        assert_eq!(count(conn, "filelist"), 0);

        store.finalize(handle, "sum2").unwrap();
        assert_eq!(read_stamp(&path).unwrap().unwrap().checksum, "sum2");
    }

    #[test]
    fn test_version_mismatch_recreates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("primary"));
        build_stamped(&CacheStore::new(), &path, "sum1", SchemaKind::Primary);

        let newer = CacheStore::with_format_version(CACHE_DBVERSION + 1);
        assert_eq!(
            newer.status(&path, "sum1", SchemaKind::Primary).unwrap(),
            CacheStatus::VersionMismatch {
                found: CACHE_DBVERSION
            }
        );

        let handle = expect_build(newer.open(&path, "sum1", SchemaKind::Primary).unwrap());
        assert_eq!(handle.scope(), RebuildScope::Full);
        assert_eq!(count(handle.connection(), "packages"), 0);
        assert_eq!(count(handle.connection(), "db_info"), 0);
        newer.finalize(handle, "sum1").unwrap();

        assert_eq!(
            read_stamp(&path).unwrap().unwrap().format_version,
            CACHE_DBVERSION + 1
        );
    }

    #[test]
    fn test_finalize_writes_single_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();
        build_stamped(&store, &path, "sum1", SchemaKind::Other);
        build_stamped(&store, &path, "sum2", SchemaKind::Other);

        let conn = open_read_only(&path).unwrap();
        assert_eq!(count(&conn, "db_info"), 1);
    }

    #[test]
    fn test_failed_stamp_leaves_cache_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("filelists"));
        let store = CacheStore::new();

        let handle = expect_build(store.open(&path, "sum", SchemaKind::FileLists).unwrap());
        handle
            .connection()
            .execute_batch("ALTER TABLE db_info RENAME TO db_info_old")
            .unwrap();

        let err = store.finalize(handle, "sum").unwrap_err();
        assert!(matches!(err, Error::Stamp { .. }));
        assert!(err.to_string().contains("db_info"));

        let status = store.status(&path, "sum", SchemaKind::FileLists).unwrap();
        assert_ne!(status, CacheStatus::Current);
        assert!(matches!(
            expect_build(store.open(&path, "sum", SchemaKind::FileLists).unwrap()).scope(),
            RebuildScope::Full
        ));
    }

    #[test]
    fn test_foreign_file_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("primary"));
        fs::write(&path, vec![b'x'; 4096]).unwrap();

        let store = CacheStore::new();
        assert!(matches!(
            store.status(&path, "sum", SchemaKind::Primary).unwrap(),
            CacheStatus::Unreadable { .. }
        ));

        let handle = expect_build(store.open(&path, "sum", SchemaKind::Primary).unwrap());
        assert_eq!(handle.scope(), RebuildScope::Full);
        store.finalize(handle, "sum").unwrap();
        assert_eq!(
            store.status(&path, "sum", SchemaKind::Primary).unwrap(),
            CacheStatus::Current
        );
    }

    #[test]
    fn test_wrong_kind_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        let store = CacheStore::new();
        build_stamped(&store, &path, "sum", SchemaKind::Other);

        let status = store.status(&path, "sum", SchemaKind::FileLists).unwrap();
        assert_eq!(status.rebuild_scope(), Some(RebuildScope::Full));
    }

    #[test]
    fn test_unfinished_rebuild_is_not_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();

        let handle = expect_build(store.open(&path, "sum", SchemaKind::Other).unwrap());
        handle
            .connection()
            .execute("INSERT INTO packages (pkgId) VALUES ('abc')", [])
            .unwrap();
        drop(handle);

        let handle = expect_build(store.open(&path, "sum", SchemaKind::Other).unwrap());
        assert_eq!(handle.scope(), RebuildScope::Full);
        assert_eq!(count(handle.connection(), "packages"), 0);
    }

    #[test]
    fn test_status_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("primary"));
        let store = CacheStore::new();

        assert_eq!(
            store.status(&path, "sum", SchemaKind::Primary).unwrap(),
            CacheStatus::Absent
        );
        assert!(!path.exists());
        assert_eq!(read_stamp(&path).unwrap(), None);
    }

    #[test]
    fn test_open_error_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join(db_filename("primary"));

        let err = CacheStore::new()
            .open(&path, "sum", SchemaKind::Primary)
            .unwrap_err();
        assert!(matches!(err, Error::Open { .. }));
    }

    #[test]
    fn test_remove_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let handle = expect_build(CacheStore::new().open(&path, "sum", SchemaKind::Other).unwrap());

        let conn = handle.connection();
        conn.execute("INSERT INTO packages (pkgId) VALUES ('abc')", []).unwrap();
        let key = conn.last_insert_rowid();

        assert!(handle.remove_package(key).unwrap());
        assert!(!handle.remove_package(key).unwrap());
    }
}
