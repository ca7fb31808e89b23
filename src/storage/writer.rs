//! Row writers
//!
//! Each writer prepares its insert once and reuses it for every row. The
//! statement borrows the connection and is finalized when the writer is
//! dropped, whichever way the caller leaves.
//!
//! A row that fails to insert is logged and dropped; the writer keeps going.

use rusqlite::{Connection, Statement, params};

use crate::filelist;
use crate::package::{ChangelogEntry, Dependency, DependencyKind, FileEntry, Package};
use crate::{Error, Result};

pub const INSERT_PACKAGE_SQL: &str = r#"
INSERT INTO packages (
    pkgId, name, arch, version, epoch, release, summary, description,
    url, time_file, time_build, rpm_license, rpm_vendor, rpm_group,
    rpm_buildhost, rpm_sourcerpm, rpm_header_start, rpm_header_end,
    rpm_packager, size_package, size_installed, size_archive,
    location_href, location_base, checksum_type, checksum_value)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
    ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)
"#;

pub const INSERT_PACKAGE_ID_SQL: &str = "INSERT INTO packages (pkgId) VALUES (?1)";

pub const INSERT_FILE_SQL: &str = "INSERT INTO files (name, type, pkgKey) VALUES (?1, ?2, ?3)";

pub const INSERT_FILELIST_SQL: &str =
    "INSERT INTO filelist (pkgKey, dirname, filenames, filetypes) VALUES (?1, ?2, ?3, ?4)";

pub const INSERT_CHANGELOG_SQL: &str =
    "INSERT INTO changelog (pkgKey, author, date, changelog) VALUES (?1, ?2, ?3, ?4)";

/// Rows written and dropped by a writer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub dropped: usize,
}

impl WriteStats {
    fn record<T>(&mut self, pipeline: &'static str, result: rusqlite::Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.written += 1;
                Some(value)
            }
            Err(source) => {
                self.dropped += 1;
                tracing::error!("{}", Error::Write { pipeline, source });
                None
            }
        }
    }
}

impl std::ops::AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.written += other.written;
        self.dropped += other.dropped;
    }
}

fn prepare<'conn>(
    conn: &'conn Connection,
    pipeline: &'static str,
    sql: &str,
) -> Result<Statement<'conn>> {
    conn.prepare(sql)
        .map_err(|source| Error::Prepare { pipeline, source })
}

/// Writes full package rows (primary kind)
pub struct PackageWriter<'conn> {
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> PackageWriter<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Ok(Self {
            stmt: prepare(conn, "packages", INSERT_PACKAGE_SQL)?,
            stats: WriteStats::default(),
        })
    }

    /// Insert a package and return the `pkgKey` the store assigned to it
    pub fn write(&mut self, p: &Package) -> Option<i64> {
        let result = self.stmt.insert(params![
            p.pkg_id,
            p.name,
            p.arch,
            p.version,
            p.epoch,
            p.release,
            p.summary,
            p.description,
            p.url,
            p.time_file,
            p.time_build,
            p.rpm_license,
            p.rpm_vendor,
            p.rpm_group,
            p.rpm_buildhost,
            p.rpm_sourcerpm,
            p.rpm_header_start,
            p.rpm_header_end,
            p.rpm_packager,
            p.size_package,
            p.size_installed,
            p.size_archive,
            p.location_href,
            p.location_base,
            p.checksum_type,
            p.checksum_value,
        ]);
        self.stats.record("package", result)
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Writes id-only package rows (filelists and other kinds)
pub struct PackageIdWriter<'conn> {
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> PackageIdWriter<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Ok(Self {
            stmt: prepare(conn, "package ids", INSERT_PACKAGE_ID_SQL)?,
            stats: WriteStats::default(),
        })
    }

    /// Insert a package id and return the `pkgKey` the store assigned to it
    pub fn write(&mut self, p: &Package) -> Option<i64> {
        let result = self.stmt.insert([&p.pkg_id]);
        self.stats.record("package", result)
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Writes one of the four dependency relations
pub struct DependencyWriter<'conn> {
    kind: DependencyKind,
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> DependencyWriter<'conn> {
    pub fn new(conn: &'conn Connection, kind: DependencyKind) -> Result<Self> {
        let sql = format!(
            "INSERT INTO {} (name, flags, epoch, version, release, pkgKey) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            kind.table()
        );
        Ok(Self {
            kind,
            stmt: prepare(conn, "dependency", &sql)?,
            stats: WriteStats::default(),
        })
    }

    pub fn write(&mut self, pkg_key: i64, dep: &Dependency) -> bool {
        let result = self.stmt.execute(params![
            dep.name,
            dep.flags,
            dep.epoch,
            dep.version,
            dep.release,
            pkg_key,
        ]);
        self.stats.record("dependency", result).is_some()
    }

    /// Write every dependency of this writer's relation, returning rows written
    pub fn write_package(&mut self, pkg_key: i64, p: &Package) -> usize {
        p.dependencies(self.kind)
            .iter()
            .filter(|dep| self.write(pkg_key, dep))
            .count()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Writes one row per file (primary kind)
pub struct FileWriter<'conn> {
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> FileWriter<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Ok(Self {
            stmt: prepare(conn, "file", INSERT_FILE_SQL)?,
            stats: WriteStats::default(),
        })
    }

    pub fn write(&mut self, pkg_key: i64, file: &FileEntry) -> bool {
        let result = self
            .stmt
            .execute(params![file.path, file.kind.as_str(), pkg_key]);
        self.stats.record("package file", result).is_some()
    }

    pub fn write_all(&mut self, pkg_key: i64, files: &[FileEntry]) -> usize {
        files.iter().filter(|file| self.write(pkg_key, file)).count()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Writes one compacted row per directory (filelists kind)
pub struct FileListWriter<'conn> {
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> FileListWriter<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Ok(Self {
            stmt: prepare(conn, "filelist", INSERT_FILELIST_SQL)?,
            stats: WriteStats::default(),
        })
    }

    /// Encode a package's files and write its directory groups.
    ///
    /// Entries the codec cannot represent are logged and counted as dropped;
    /// the rest of the package's groups are still written.
    pub fn write(&mut self, pkg_key: i64, files: &[FileEntry]) -> usize {
        let encoded = filelist::encode(files);
        for path in &encoded.rejected {
            self.stats.dropped += 1;
            tracing::error!(
                "Dropping file {:?} of package {}: no basename to encode",
                path,
                pkg_key
            );
        }

        let mut written = 0;
        for group in &encoded.groups {
            let result = self.stmt.execute(params![
                pkg_key,
                group.dirname,
                group.filenames,
                group.filetypes,
            ]);
            if self.stats.record("file", result).is_some() {
                written += 1;
            }
        }
        written
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}

/// Writes one row per changelog entry (other kind)
pub struct ChangelogWriter<'conn> {
    stmt: Statement<'conn>,
    stats: WriteStats,
}

impl<'conn> ChangelogWriter<'conn> {
    pub fn new(conn: &'conn Connection) -> Result<Self> {
        Ok(Self {
            stmt: prepare(conn, "changelog", INSERT_CHANGELOG_SQL)?,
            stats: WriteStats::default(),
        })
    }

    pub fn write(&mut self, pkg_key: i64, entry: &ChangelogEntry) -> bool {
        let result = self
            .stmt
            .execute(params![pkg_key, entry.author, entry.date, entry.text]);
        self.stats.record("changelog", result).is_some()
    }

    pub fn write_all(&mut self, pkg_key: i64, entries: &[ChangelogEntry]) -> usize {
        entries
            .iter()
            .filter(|entry| self.write(pkg_key, entry))
            .count()
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }
}
