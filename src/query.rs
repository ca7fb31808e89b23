//! Read-side helpers over a cache file

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension};

use crate::filelist::{self, EncodedFileGroup};
use crate::package::FileEntry;
use crate::storage::SchemaKind;
use crate::Result;

/// Map every stored `pkgId` to the `pkgKey`s this file assigned it.
///
/// Keys come in ascending order. A file written by another tool may hold the
/// same `pkgId` more than once, so every key is kept.
pub fn read_package_ids(conn: &Connection) -> Result<HashMap<String, Vec<i64>>> {
    let mut stmt = conn.prepare("SELECT pkgId, pkgKey FROM packages ORDER BY pkgKey")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut ids: HashMap<String, Vec<i64>> = HashMap::new();
    for row in rows {
        let (pkg_id, pkg_key) = row?;
        ids.entry(pkg_id).or_default().push(pkg_key);
    }
    Ok(ids)
}

/// Key of a package in this file, looked up by its external id
pub fn package_key(conn: &Connection, pkg_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT pkgKey FROM packages WHERE pkgId = ?1 LIMIT 1",
        [pkg_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

/// Compacted file list rows of one package (filelists kind)
pub fn file_groups(conn: &Connection, pkg_key: i64) -> Result<Vec<EncodedFileGroup>> {
    let mut stmt = conn.prepare(
        "SELECT dirname, filenames, filetypes FROM filelist WHERE pkgKey = ?1 ORDER BY dirname",
    )?;

    let groups = stmt
        .query_map([pkg_key], |row| {
            Ok(EncodedFileGroup {
                dirname: row.get(0)?,
                filenames: row.get(1)?,
                filetypes: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(groups)
}

/// Decoded file list of one package (filelists kind)
pub fn package_files(conn: &Connection, pkg_key: i64) -> Result<Vec<FileEntry>> {
    filelist::decode(&file_groups(conn, pkg_key)?)
}

/// Row counts of a cache file
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub kind: SchemaKind,
    pub packages: usize,
    /// Row count per dependent table, in schema order
    pub tables: Vec<(&'static str, usize)>,
}

impl CacheStats {
    pub fn collect(conn: &Connection, kind: SchemaKind) -> Result<Self> {
        let mut tables = Vec::new();
        for table in kind.dependent_tables() {
            tables.push((*table, count_rows(conn, table)?));
        }

        Ok(Self {
            kind,
            packages: count_rows(conn, "packages")?,
            tables,
        })
    }
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cache Statistics ({}):", self.kind)?;
        write!(f, "  packages: {}", self.packages)?;
        for (table, rows) in &self.tables {
            write!(f, "\n  {table}: {rows}")?;
        }
        Ok(())
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{FileKind, Package};
    use crate::storage::{FileListWriter, PackageIdWriter};

    fn filelists_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaKind::FileLists.create(&conn).unwrap();
        conn
    }

    #[test]
    fn test_read_package_ids() {
        let conn = filelists_db();
        let mut writer = PackageIdWriter::new(&conn).unwrap();
        let a = writer.write(&Package { pkg_id: "a".into(), ..Package::default() }).unwrap();
        let b = writer.write(&Package { pkg_id: "b".into(), ..Package::default() }).unwrap();

        let ids = read_package_ids(&conn).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids["a"], vec![a]);
        assert_eq!(ids["b"], vec![b]);
        assert_eq!(package_key(&conn, "b").unwrap(), Some(b));
        assert_eq!(package_key(&conn, "zzz").unwrap(), None);
    }

    #[test]
    fn test_package_files_round_trip() {
        let conn = filelists_db();
        let files = vec![
            FileEntry::new("/usr/bin/foo", FileKind::File),
            FileEntry::new("/usr/share/foo", FileKind::Directory),
            FileEntry::new("/usr/bin/foo-helper", FileKind::Ghost),
        ];
        let key = PackageIdWriter::new(&conn)
            .unwrap()
            .write(&Package { pkg_id: "a".into(), ..Package::default() })
            .unwrap();
        FileListWriter::new(&conn).unwrap().write(key, &files);

        let groups = file_groups(&conn, key).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].dirname, "/usr/bin");

        let decoded = package_files(&conn, key).unwrap();
        assert_eq!(
            decoded,
            vec![
                FileEntry::new("/usr/bin/foo", FileKind::File),
                FileEntry::new("/usr/bin/foo-helper", FileKind::Ghost),
                FileEntry::new("/usr/share/foo", FileKind::Directory),
            ]
        );
    }

    #[test]
    fn test_stats() {
        let conn = filelists_db();
        let key = PackageIdWriter::new(&conn)
            .unwrap()
            .write(&Package { pkg_id: "a".into(), ..Package::default() })
            .unwrap();
        FileListWriter::new(&conn)
            .unwrap()
            .write(key, &[FileEntry::new("/etc/a", FileKind::File)]);

        let stats = CacheStats::collect(&conn, SchemaKind::FileLists).unwrap();
        assert_eq!(stats.packages, 1);
        assert_eq!(stats.tables, vec![("filelist", 1)]);
        assert!(stats.to_string().contains("filelist: 1"));
    }
}
