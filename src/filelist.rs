//! File list compaction
//!
//! A package's flat `(path, kind)` list is packed into one row per
//! directory: the basenames joined with `/` and a parallel string holding
//! one type code per basename (`d`, `f` or `g`). Position *i* of both
//! strings describes the same file, so a group decodes back exactly.

use crate::package::{FileEntry, FileKind};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Separator between basenames in `filenames`
pub const NAME_SEPARATOR: char = '/';

/// All files of one package living in the same directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFileGroup {
    pub dirname: String,
    pub filenames: String,
    pub filetypes: String,
}

impl EncodedFileGroup {
    /// Number of files in the group
    pub fn len(&self) -> usize {
        self.filetypes.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.filetypes.is_empty()
    }

    /// Decode the group back into `(basename, kind)` pairs, in encoding order.
    ///
    /// Fails if the two strings are not positionally aligned or a type code
    /// is unknown, which means the row was not written by [`encode`].
    pub fn entries(&self) -> Result<Vec<(&str, FileKind)>> {
        let names: Vec<&str> = self.filenames.split(NAME_SEPARATOR).collect();
        if names.len() != self.len() {
            return Err(Error::InvalidFileEntry(format!(
                "{}: {} names but {} type codes",
                self.dirname,
                names.len(),
                self.len()
            )));
        }

        names
            .into_iter()
            .zip(self.filetypes.chars())
            .map(|(name, code)| {
                FileKind::from_code(code)
                    .map(|kind| (name, kind))
                    .ok_or_else(|| {
                        Error::InvalidFileEntry(format!("{}: unknown type code {code:?}", self.dirname))
                    })
            })
            .collect()
    }

    /// Decode the group into file entries with full paths
    pub fn to_file_entries(&self) -> Result<Vec<FileEntry>> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|(name, kind)| FileEntry::new(join_path(&self.dirname, name), kind))
            .collect())
    }
}

/// Per-directory accumulator, owned by the grouping map while encoding
#[derive(Default)]
struct GroupBuffer {
    files: String,
    types: String,
}

impl GroupBuffer {
    fn push(&mut self, basename: &str, kind: FileKind) {
        if !self.files.is_empty() {
            self.files.push(NAME_SEPARATOR);
        }
        self.files.push_str(basename);
        self.types.push(kind.code());
    }
}

/// Split a path into `(dirname, basename)` with POSIX `dirname`/`basename`
/// semantics.
///
/// - `""` is `(".", ".")`
/// - a path without separator lives in `"."`
/// - trailing separators are ignored and runs of separators collapse
/// - `"/a"` is `("/", "a")`, and the root itself is `("/", "/")`
pub fn split_path(path: &str) -> (&str, &str) {
    if path.is_empty() {
        return (".", ".");
    }

    let trimmed = path.trim_end_matches(NAME_SEPARATOR);
    if trimmed.is_empty() {
        return ("/", "/");
    }

    match trimmed.rfind(NAME_SEPARATOR) {
        None => (".", trimmed),
        Some(idx) => {
            let dirname = trimmed[..idx].trim_end_matches(NAME_SEPARATOR);
            let dirname = if dirname.is_empty() { "/" } else { dirname };
            (dirname, &trimmed[idx + 1..])
        }
    }
}

/// Inverse of [`split_path`] for paths that have a basename
pub fn join_path(dirname: &str, basename: &str) -> String {
    match dirname {
        "." => basename.to_string(),
        "/" => format!("/{basename}"),
        _ => format!("{dirname}/{basename}"),
    }
}

/// A package's encoded groups plus the entries that could not be encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedFileList {
    pub groups: Vec<EncodedFileGroup>,
    /// Paths skipped because they have no encodable basename
    pub rejected: Vec<String>,
}

/// Group a package's files by directory.
///
/// Groups come out sorted by dirname; within a group files keep their input
/// order. A package without files yields no groups. The root path cannot be
/// represented (its basename would contain the separator); it is skipped and
/// reported in `rejected` while the other entries are still grouped.
pub fn encode(files: &[FileEntry]) -> EncodedFileList {
    let mut groups: BTreeMap<&str, GroupBuffer> = BTreeMap::new();
    let mut rejected = Vec::new();

    for file in files {
        let (dirname, basename) = split_path(&file.path);
        if basename.contains(NAME_SEPARATOR) {
            rejected.push(file.path.clone());
            continue;
        }
        groups.entry(dirname).or_default().push(basename, file.kind);
    }

    EncodedFileList {
        groups: groups
            .into_iter()
            .map(|(dirname, group)| EncodedFileGroup {
                dirname: dirname.to_string(),
                filenames: group.files,
                filetypes: group.types,
            })
            .collect(),
        rejected,
    }
}

/// Decode a package's groups back into file entries
pub fn decode(groups: &[EncodedFileGroup]) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for group in groups {
        files.extend(group.to_file_entries()?);
    }
    Ok(files)
}
