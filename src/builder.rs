//! Populating a cache file from packages
//!
//! A full build writes every package. A data refresh reconciles by `pkgId`
//! instead of appending: packages gone from the input are deleted (the
//! schema trigger takes their dependent rows along), packages already stored
//! are kept untouched since `pkgId` is derived from their content, and only
//! new packages are written.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rusqlite::Connection;

use crate::package::{DependencyKind, Package};
use crate::query;
use crate::storage::{
    CacheHandle, CacheStore, ChangelogWriter, DependencyWriter, FileListWriter, FileWriter,
    OpenOutcome, PackageIdWriter, PackageWriter, RebuildScope, SchemaKind, WriteStats,
};
use crate::Result;

/// What a populate pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Packages written
    pub added: usize,
    /// Packages already stored and left in place
    pub kept: usize,
    /// Stored packages deleted because the input no longer has them
    pub removed: usize,
    /// Input packages skipped because their `pkgId` appeared earlier
    pub duplicates: usize,
    /// Row totals over every writer
    pub rows: WriteStats,
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Build Report:")?;
        writeln!(f, "  Added: {}", self.added)?;
        writeln!(f, "  Kept: {}", self.kept)?;
        writeln!(f, "  Removed: {}", self.removed)?;
        writeln!(f, "  Duplicates: {}", self.duplicates)?;
        writeln!(f, "  Rows written: {}", self.rows.written)?;
        write!(f, "  Rows dropped: {}", self.rows.dropped)
    }
}

/// Result of [`rebuild`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Current,
    Built {
        scope: RebuildScope,
        report: BuildReport,
    },
}

/// The writers one schema kind routes a package through
enum RowSink<'conn> {
    Primary {
        packages: PackageWriter<'conn>,
        dependencies: Vec<DependencyWriter<'conn>>,
        files: FileWriter<'conn>,
    },
    FileLists {
        packages: PackageIdWriter<'conn>,
        filelist: FileListWriter<'conn>,
    },
    Other {
        packages: PackageIdWriter<'conn>,
        changelog: ChangelogWriter<'conn>,
    },
}

impl<'conn> RowSink<'conn> {
    fn new(conn: &'conn Connection, kind: SchemaKind) -> Result<Self> {
        Ok(match kind {
            SchemaKind::Primary => RowSink::Primary {
                packages: PackageWriter::new(conn)?,
                dependencies: DependencyKind::all()
                    .iter()
                    .map(|kind| DependencyWriter::new(conn, *kind))
                    .collect::<Result<Vec<_>>>()?,
                files: FileWriter::new(conn)?,
            },
            SchemaKind::FileLists => RowSink::FileLists {
                packages: PackageIdWriter::new(conn)?,
                filelist: FileListWriter::new(conn)?,
            },
            SchemaKind::Other => RowSink::Other {
                packages: PackageIdWriter::new(conn)?,
                changelog: ChangelogWriter::new(conn)?,
            },
        })
    }

    /// Write a package and its dependent rows, returning its `pkgKey`
    fn write(&mut self, package: &Package) -> Option<i64> {
        match self {
            RowSink::Primary {
                packages,
                dependencies,
                files,
            } => {
                let pkg_key = packages.write(package)?;
                for writer in dependencies.iter_mut() {
                    writer.write_package(pkg_key, package);
                }
                files.write_all(pkg_key, &package.files);
                Some(pkg_key)
            }
            RowSink::FileLists { packages, filelist } => {
                let pkg_key = packages.write(package)?;
                filelist.write(pkg_key, &package.files);
                Some(pkg_key)
            }
            RowSink::Other { packages, changelog } => {
                let pkg_key = packages.write(package)?;
                changelog.write_all(pkg_key, &package.changelogs);
                Some(pkg_key)
            }
        }
    }

    fn stats(&self) -> WriteStats {
        let mut total = WriteStats::default();
        match self {
            RowSink::Primary {
                packages,
                dependencies,
                files,
            } => {
                total += packages.stats();
                for writer in dependencies {
                    total += writer.stats();
                }
                total += files.stats();
            }
            RowSink::FileLists { packages, filelist } => {
                total += packages.stats();
                total += filelist.stats();
            }
            RowSink::Other { packages, changelog } => {
                total += packages.stats();
                total += changelog.stats();
            }
        }
        total
    }
}

/// Write `packages` into a cache file being rebuilt
pub fn populate(handle: &CacheHandle, packages: &[Package]) -> Result<BuildReport> {
    let conn = handle.connection();
    let mut report = BuildReport::default();

    let stored: HashMap<String, Vec<i64>> = match handle.scope() {
        RebuildScope::Full => HashMap::new(),
        RebuildScope::Data => query::read_package_ids(conn)?,
    };

    if !stored.is_empty() {
        let incoming: HashSet<&str> = packages.iter().map(|p| p.pkg_id.as_str()).collect();
        for (pkg_id, pkg_keys) in &stored {
            // A retained package keeps its oldest key; extra copies go
            let stale = if incoming.contains(pkg_id.as_str()) {
                &pkg_keys[1..]
            } else {
                &pkg_keys[..]
            };
            for &pkg_key in stale {
                if handle.remove_package(pkg_key)? {
                    tracing::debug!("Removed {} (pkgKey {})", pkg_id, pkg_key);
                    report.removed += 1;
                }
            }
        }
    }

    let mut sink = RowSink::new(conn, handle.kind())?;
    let mut seen: HashSet<&str> = HashSet::with_capacity(packages.len());

    for package in packages {
        if !seen.insert(package.pkg_id.as_str()) {
            tracing::debug!("Skipping duplicate package {} ({})", package.nevra(), package.pkg_id);
            report.duplicates += 1;
            continue;
        }
        if stored.contains_key(&package.pkg_id) {
            report.kept += 1;
            continue;
        }
        if sink.write(package).is_some() {
            report.added += 1;
        }
    }

    report.rows = sink.stats();
    tracing::info!(
        "Populated {} cache: {} added, {} kept, {} removed",
        handle.kind(),
        report.added,
        report.kept,
        report.removed
    );
    Ok(report)
}

/// Bring the cache file at `path` up to date with `packages`.
///
/// Opens the file, populates it if it is stale and stamps it with
/// `checksum`.
pub fn rebuild(
    store: &CacheStore,
    path: &Path,
    checksum: &str,
    kind: SchemaKind,
    packages: &[Package],
) -> Result<BuildOutcome> {
    let handle = match store.open(path, checksum, kind)? {
        OpenOutcome::Current => return Ok(BuildOutcome::Current),
        OpenOutcome::NeedsBuild(handle) => handle,
    };

    let scope = handle.scope();
    let report = populate(&handle, packages)?;
    store.finalize(handle, checksum)?;

    Ok(BuildOutcome::Built { scope, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{ChangelogEntry, Dependency, FileEntry, FileKind};
    use crate::storage::{db_filename, open_read_only};

    fn package(id: &str) -> Package {
        let mut p = Package::new(id, format!("pkg-{id}"), "1.0", "1", "x86_64");
        p.requires.push(Dependency::named("glibc"));
        p.provides.push(Dependency::named(format!("pkg-{id}")));
        p.files = vec![
            FileEntry::new(format!("/usr/bin/{id}"), FileKind::File),
            FileEntry::new(format!("/usr/share/doc/{id}"), FileKind::Directory),
            FileEntry::new(format!("/usr/share/doc/{id}/README"), FileKind::File),
        ];
        p.changelogs.push(ChangelogEntry {
            author: "Packager <p@example.com> - 1.0-1".to_string(),
            date: 1_700_000_000,
            text: format!("- Package {id}"),
        });
        p
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn built_report(outcome: BuildOutcome) -> (RebuildScope, BuildReport) {
        match outcome {
            BuildOutcome::Built { scope, report } => (scope, report),
            BuildOutcome::Current => panic!("expected a build"),
        }
    }

    #[test]
    fn test_full_build_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new();
        let packages = vec![package("a"), package("b")];

        for kind in SchemaKind::all() {
            let path = dir.path().join(db_filename(kind.default_prefix()));
            let (scope, report) =
                built_report(rebuild(&store, &path, "sum", *kind, &packages).unwrap());
            assert_eq!(scope, RebuildScope::Full);
            assert_eq!(report.added, 2);
            assert_eq!(report.rows.dropped, 0);

            let conn = open_read_only(&path).unwrap();
            assert_eq!(count(&conn, "packages"), 2);
            match kind {
                SchemaKind::Primary => {
                    assert_eq!(count(&conn, "files"), 6);
                    assert_eq!(count(&conn, "requires"), 2);
                    assert_eq!(count(&conn, "provides"), 2);
                }
                SchemaKind::FileLists => assert_eq!(count(&conn, "filelist"), 6),
                SchemaKind::Other => assert_eq!(count(&conn, "changelog"), 2),
            }
        }
    }

    #[test]
    fn test_second_build_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();
        let packages = vec![package("a")];

        rebuild(&store, &path, "sum", SchemaKind::Other, &packages).unwrap();
        assert_eq!(
            rebuild(&store, &path, "sum", SchemaKind::Other, &packages).unwrap(),
            BuildOutcome::Current
        );
    }

    #[test]
    fn test_data_refresh_reconciles_by_pkg_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("primary"));
        let store = CacheStore::new();

        rebuild(&store, &path, "sum1", SchemaKind::Primary, &[package("a"), package("b")]).unwrap();
        let before = query::read_package_ids(&open_read_only(&path).unwrap()).unwrap();

        let (scope, report) = built_report(
            rebuild(&store, &path, "sum2", SchemaKind::Primary, &[package("b"), package("c")])
                .unwrap(),
        );
        assert_eq!(scope, RebuildScope::Data);
        assert_eq!(report.removed, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(report.added, 1);

        let conn = open_read_only(&path).unwrap();
        let after = query::read_package_ids(&conn).unwrap();
        assert_eq!(after.len(), 2);
        assert!(!after.contains_key("a"));
        assert_eq!(after["b"], before["b"]);
        assert!(after["c"][0] > before["b"][0]);
        assert_eq!(count(&conn, "files"), 6);
        assert_eq!(count(&conn, "requires"), 2);
    }

    #[test]
    fn test_data_refresh_removes_stored_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();

        rebuild(&store, &path, "sum1", SchemaKind::Other, &[package("a"), package("b")]).unwrap();
        {
            // Another writer left extra copies of both packages behind
            let conn = Connection::open(&path).unwrap();
            for pkg_id in ["a", "b"] {
                conn.execute("INSERT INTO packages (pkgId) VALUES (?1)", [pkg_id]).unwrap();
                conn.execute(
                    "INSERT INTO changelog (pkgKey, author, date, changelog) VALUES (?1, 'x', 0, 'dup')",
                    [conn.last_insert_rowid()],
                )
                .unwrap();
            }
        }
        let before = query::read_package_ids(&open_read_only(&path).unwrap()).unwrap();
        assert_eq!(before["a"].len(), 2);

        let (scope, report) = built_report(
            rebuild(&store, &path, "sum2", SchemaKind::Other, &[package("b")]).unwrap(),
        );
        assert_eq!(scope, RebuildScope::Data);
        assert_eq!(report.removed, 3);
        assert_eq!(report.kept, 1);

        let conn = open_read_only(&path).unwrap();
        let after = query::read_package_ids(&conn).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after["b"], vec![before["b"][0]]);
        assert_eq!(count(&conn, "changelog"), 1);
    }

    #[test]
    fn test_duplicate_pkg_ids_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("filelists"));
        let store = CacheStore::new();

        let (_, report) = built_report(
            rebuild(&store, &path, "sum", SchemaKind::FileLists, &[package("a"), package("a")])
                .unwrap(),
        );
        assert_eq!(report.added, 1);
        assert_eq!(report.duplicates, 1);

        let conn = open_read_only(&path).unwrap();
        let key = query::package_key(&conn, "a").unwrap().unwrap();
        assert_eq!(query::package_files(&conn, key).unwrap().len(), 3);
    }

    #[test]
    fn test_dropped_handle_leaves_stale_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(db_filename("other"));
        let store = CacheStore::new();

        match store.open(&path, "sum", SchemaKind::Other).unwrap() {
            OpenOutcome::NeedsBuild(handle) => {
                populate(&handle, &[package("a")]).unwrap();
            }
            OpenOutcome::Current => panic!("expected a rebuild"),
        }

        let (scope, report) =
            built_report(rebuild(&store, &path, "sum", SchemaKind::Other, &[package("a")]).unwrap());
        assert_eq!(scope, RebuildScope::Full);
        assert_eq!(report.added, 1);
    }
}
