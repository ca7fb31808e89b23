//! Database schema definitions
//!
//! Each schema kind lives in its own cache file. Kinds share only the
//! `pkgId`/`pkgKey` naming convention; a `pkgKey` means nothing outside the
//! file that assigned it.

use crate::{Error, Result};
use rusqlite::Connection;
use std::str::FromStr;

/// SQL to create the stamp table, present in every kind
pub const CREATE_DB_INFO_TABLE: &str = "CREATE TABLE db_info (dbversion INTEGER, checksum TEXT)";

/// SQL to create the full packages table (primary kind)
pub const CREATE_PRIMARY_PACKAGES_TABLE: &str = r#"
CREATE TABLE packages (
    pkgKey INTEGER PRIMARY KEY AUTOINCREMENT,
    pkgId TEXT,
    name TEXT,
    arch TEXT,
    version TEXT,
    epoch TEXT,
    release TEXT,
    summary TEXT,
    description TEXT,
    url TEXT,
    time_file INTEGER,
    time_build INTEGER,
    rpm_license TEXT,
    rpm_vendor TEXT,
    rpm_group TEXT,
    rpm_buildhost TEXT,
    rpm_sourcerpm TEXT,
    rpm_header_start INTEGER,
    rpm_header_end INTEGER,
    rpm_packager TEXT,
    size_package INTEGER,
    size_installed INTEGER,
    size_archive INTEGER,
    location_href TEXT,
    location_base TEXT,
    checksum_type TEXT,
    checksum_value TEXT
)
"#;

/// SQL to create the id-only packages table (filelists and other kinds)
pub const CREATE_ID_PACKAGES_TABLE: &str = r#"
CREATE TABLE packages (
    pkgKey INTEGER PRIMARY KEY AUTOINCREMENT,
    pkgId TEXT
)
"#;

pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE files (
    name TEXT,
    type TEXT,
    pkgKey INTEGER
)
"#;

macro_rules! dependency_table {
    ($table:literal) => {
        concat!(
            "CREATE TABLE ",
            $table,
            " (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER)"
        )
    };
}

pub const CREATE_REQUIRES_TABLE: &str = dependency_table!("requires");
pub const CREATE_PROVIDES_TABLE: &str = dependency_table!("provides");
pub const CREATE_CONFLICTS_TABLE: &str = dependency_table!("conflicts");
pub const CREATE_OBSOLETES_TABLE: &str = dependency_table!("obsoletes");

pub const CREATE_PRIMARY_TRIGGER: &str = r#"
CREATE TRIGGER removals AFTER DELETE ON packages
BEGIN
    DELETE FROM files WHERE pkgKey = old.pkgKey;
    DELETE FROM requires WHERE pkgKey = old.pkgKey;
    DELETE FROM provides WHERE pkgKey = old.pkgKey;
    DELETE FROM conflicts WHERE pkgKey = old.pkgKey;
    DELETE FROM obsoletes WHERE pkgKey = old.pkgKey;
END
"#;

pub const CREATE_FILELIST_TABLE: &str = r#"
CREATE TABLE filelist (
    pkgKey INTEGER,
    dirname TEXT,
    filenames TEXT,
    filetypes TEXT
)
"#;

pub const CREATE_FILELIST_TRIGGER: &str = r#"
CREATE TRIGGER remove_filelist AFTER DELETE ON packages
BEGIN
    DELETE FROM filelist WHERE pkgKey = old.pkgKey;
END
"#;

pub const CREATE_CHANGELOG_TABLE: &str = r#"
CREATE TABLE changelog (
    pkgKey INTEGER,
    author TEXT,
    date INTEGER,
    changelog TEXT
)
"#;

pub const CREATE_CHANGELOG_TRIGGER: &str = r#"
CREATE TRIGGER remove_changelogs AFTER DELETE ON packages
BEGIN
    DELETE FROM changelog WHERE pkgKey = old.pkgKey;
END
"#;

/// Named schema objects, in declaration order
const PRIMARY_OBJECTS: &[(&str, &str)] = &[
    ("packages table", CREATE_PRIMARY_PACKAGES_TABLE),
    ("packagename index", "CREATE INDEX packagename ON packages (name)"),
    ("packageId index", "CREATE INDEX packageId ON packages (pkgId)"),
    ("files table", CREATE_FILES_TABLE),
    ("requires table", CREATE_REQUIRES_TABLE),
    ("provides table", CREATE_PROVIDES_TABLE),
    ("conflicts table", CREATE_CONFLICTS_TABLE),
    ("obsoletes table", CREATE_OBSOLETES_TABLE),
    ("providesname index", "CREATE INDEX providesname ON provides (name)"),
    ("removals trigger", CREATE_PRIMARY_TRIGGER),
];

const FILELISTS_OBJECTS: &[(&str, &str)] = &[
    ("packages table", CREATE_ID_PACKAGES_TABLE),
    ("filelist table", CREATE_FILELIST_TABLE),
    ("keyfile index", "CREATE INDEX keyfile ON filelist (pkgKey)"),
    ("pkgId index", "CREATE INDEX pkgId ON packages (pkgId)"),
    ("remove_filelist trigger", CREATE_FILELIST_TRIGGER),
];

const OTHER_OBJECTS: &[(&str, &str)] = &[
    ("packages table", CREATE_ID_PACKAGES_TABLE),
    ("changelog table", CREATE_CHANGELOG_TABLE),
    ("keychange index", "CREATE INDEX keychange ON changelog (pkgKey)"),
    ("pkgId index", "CREATE INDEX pkgId ON packages (pkgId)"),
    ("remove_changelogs trigger", CREATE_CHANGELOG_TRIGGER),
];

/// The three independently versioned cache file layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Package attributes, dependencies and per-file rows
    Primary,
    /// Compacted per-directory file lists
    FileLists,
    /// Changelogs
    Other,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Primary => "primary",
            SchemaKind::FileLists => "filelists",
            SchemaKind::Other => "other",
        }
    }

    pub fn all() -> &'static [SchemaKind] {
        &[SchemaKind::Primary, SchemaKind::FileLists, SchemaKind::Other]
    }

    /// Conventional file prefix (`<prefix>.sqlite`)
    pub fn default_prefix(&self) -> &'static str {
        self.as_str()
    }

    /// Tables cleaned by this kind's delete trigger
    pub fn dependent_tables(&self) -> &'static [&'static str] {
        match self {
            SchemaKind::Primary => &["files", "requires", "provides", "conflicts", "obsoletes"],
            SchemaKind::FileLists => &["filelist"],
            SchemaKind::Other => &["changelog"],
        }
    }

    /// Named table/index/trigger declarations for this kind
    pub fn objects(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            SchemaKind::Primary => PRIMARY_OBJECTS,
            SchemaKind::FileLists => FILELISTS_OBJECTS,
            SchemaKind::Other => OTHER_OBJECTS,
        }
    }

    /// Declare every table, index and trigger of this kind.
    ///
    /// Stops at the first failing declaration.
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for &(object, sql) in self.objects() {
            conn.execute_batch(sql)
                .map_err(|source| Error::Schema { object, source })?;
        }
        Ok(())
    }
}

impl FromStr for SchemaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(SchemaKind::Primary),
            "filelists" | "filelist" | "files" => Ok(SchemaKind::FileLists),
            "other" | "changelog" | "changelogs" => Ok(SchemaKind::Other),
            _ => Err(Error::UnknownKind(format!("schema kind {s:?}"))),
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declare the `db_info` stamp table
pub fn create_db_info(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_DB_INFO_TABLE)
        .map_err(|source| Error::Schema { object: "db_info table", source })
}
