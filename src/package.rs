//! Package types - the rows a cache file is built from
//!
//! A package is identified externally by its content-derived `pkg_id`.
//! The surrogate `pkgKey` is not part of the package: it is assigned by
//! the store when the package row is written and handed back by the writer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of a file owned by a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    #[serde(rename = "dir")]
    Directory,
    #[serde(rename = "file")]
    File,
    #[serde(rename = "ghost")]
    Ghost,
}

impl FileKind {
    /// Name stored in the per-file `files.type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Directory => "dir",
            FileKind::File => "file",
            FileKind::Ghost => "ghost",
        }
    }

    /// Single-character code used by the compacted file list encoding
    pub fn code(&self) -> char {
        match self {
            FileKind::Directory => 'd',
            FileKind::File => 'f',
            FileKind::Ghost => 'g',
        }
    }

    pub fn from_code(code: char) -> Option<FileKind> {
        match code {
            'd' => Some(FileKind::Directory),
            'f' => Some(FileKind::File),
            'g' => Some(FileKind::Ghost),
            _ => None,
        }
    }

    pub fn all() -> &'static [FileKind] {
        &[FileKind::Directory, FileKind::File, FileKind::Ghost]
    }
}

impl FromStr for FileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" => Ok(FileKind::Directory),
            "file" => Ok(FileKind::File),
            "ghost" => Ok(FileKind::Ghost),
            _ => Err(Error::UnknownKind(format!("file kind {s:?}"))),
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file entry of a package. Only lives while the package is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(rename = "type", default = "default_file_kind")]
    pub kind: FileKind,
}

fn default_file_kind() -> FileKind {
    FileKind::File
}

impl FileEntry {
    pub fn new(path: impl Into<String>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// The four dependency relations. They share one row shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Requires,
    Provides,
    Conflicts,
    Obsoletes,
}

impl DependencyKind {
    /// Table the relation is stored in
    pub fn table(&self) -> &'static str {
        match self {
            DependencyKind::Requires => "requires",
            DependencyKind::Provides => "provides",
            DependencyKind::Conflicts => "conflicts",
            DependencyKind::Obsoletes => "obsoletes",
        }
    }

    pub fn all() -> &'static [DependencyKind] {
        &[
            DependencyKind::Requires,
            DependencyKind::Provides,
            DependencyKind::Conflicts,
            DependencyKind::Obsoletes,
        ]
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table())
    }
}

/// A single requires/provides/conflicts/obsoletes entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dependency {
    pub name: String,
    /// Comparison operator (`EQ`, `LT`, `GE`, ...), absent for unversioned entries
    pub flags: Option<String>,
    pub epoch: Option<String>,
    pub version: Option<String>,
    pub release: Option<String>,
}

impl Dependency {
    /// An unversioned dependency on `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogEntry {
    pub author: String,
    /// Seconds since the epoch
    pub date: i64,
    pub text: String,
}

/// A package as handed to the row writers.
///
/// Only `pkg_id` is required; everything else defaults to empty so partial
/// documents (e.g. a file-lists-only feed) deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Package {
    pub pkg_id: String,
    pub name: String,
    pub arch: String,
    pub version: String,
    pub epoch: String,
    pub release: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub time_file: Option<i64>,
    pub time_build: Option<i64>,
    pub rpm_license: Option<String>,
    pub rpm_vendor: Option<String>,
    pub rpm_group: Option<String>,
    pub rpm_buildhost: Option<String>,
    pub rpm_sourcerpm: Option<String>,
    pub rpm_header_start: Option<i64>,
    pub rpm_header_end: Option<i64>,
    pub rpm_packager: Option<String>,
    pub size_package: Option<i64>,
    pub size_installed: Option<i64>,
    pub size_archive: Option<i64>,
    pub location_href: Option<String>,
    pub location_base: Option<String>,
    pub checksum_type: Option<String>,
    pub checksum_value: Option<String>,

    pub requires: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
    pub files: Vec<FileEntry>,
    pub changelogs: Vec<ChangelogEntry>,
}

impl Package {
    /// Create a package with its identity fields set
    pub fn new(
        pkg_id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            pkg_id: pkg_id.into(),
            name: name.into(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            epoch: "0".to_string(),
            ..Self::default()
        }
    }

    /// Dependencies of the given relation
    pub fn dependencies(&self, kind: DependencyKind) -> &[Dependency] {
        match kind {
            DependencyKind::Requires => &self.requires,
            DependencyKind::Provides => &self.provides,
            DependencyKind::Conflicts => &self.conflicts,
            DependencyKind::Obsoletes => &self.obsoletes,
        }
    }

    /// Human readable name-version-release.arch
    pub fn nevra(&self) -> String {
        format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
    }
}

/// Parse a JSON document holding an array of packages
pub fn parse_packages(json: &str) -> Result<Vec<Package>> {
    Ok(serde_json::from_str(json)?)
}
