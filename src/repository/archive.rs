//! Archive operations.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, CorpusRepository, OptionalExt, Result};
use crate::error::Error;
use crate::models::{Archive, ArchiveSummary, ArchiveVersion, Compression, NewArchive};

fn version_column(row: &Row, idx: usize) -> rusqlite::Result<ArchiveVersion> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: Error| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn compression_column(row: &Row, idx: usize) -> rusqlite::Result<Compression> {
    let text: String = row.get(idx)?;
    Compression::from_str(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown compression {:?}", text).into(),
        )
    })
}

fn row_to_archive(row: &Row) -> rusqlite::Result<Archive> {
    let ids: String = row.get(2)?;
    Ok(Archive {
        rowid: row.get(0)?,
        version: version_column(row, 1)?,
        ids: serde_json::from_str(&ids)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
        note: row.get(3)?,
        archive_date: parse_datetime(&row.get::<_, String>(4)?),
        compression: compression_column(row, 5)?,
        payload: row.get(6)?,
    })
}

const ARCHIVE_COLUMNS: &str =
    "SELECT rowid, version, ids, note, archive_date, compression, payload FROM archive";

/// Version of the most recently inserted archive.
fn latest_version(conn: &Connection) -> Result<Option<ArchiveVersion>> {
    let version = conn
        .query_row(
            "SELECT version FROM archive ORDER BY rowid DESC LIMIT 1",
            [],
            |row| version_column(row, 0),
        )
        .optional()?;
    Ok(version)
}

impl CorpusRepository {
    pub fn latest_archive_version(&self) -> Result<Option<ArchiveVersion>> {
        let conn = self.connect()?;
        latest_version(&conn)
    }

    /// Union of all ids in every archive.
    pub fn archived_ids(&self) -> Result<HashSet<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT ids FROM archive")?;
        let lists = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut ids = HashSet::new();
        for list in lists {
            let parsed: Vec<String> = serde_json::from_str(&list)?;
            ids.extend(parsed);
        }
        Ok(ids)
    }

    /// Insert an archive if the latest version is still `expected`.
    ///
    /// The check and the insert share one immediate transaction, so two
    /// concurrent builds cannot both claim the same next version.
    pub fn insert_archive(
        &self,
        archive: &NewArchive,
        expected: Option<ArchiveVersion>,
    ) -> Result<i64> {
        let conn = self.connect()?;

        conn.execute("BEGIN IMMEDIATE", [])?;

        let result: Result<i64> = (|| {
            let found = latest_version(&conn)?;
            if found != expected {
                return Err(Error::VersionConflict {
                    expected: expected.map(|v| v.to_string()),
                    found: found.map(|v| v.to_string()),
                });
            }

            conn.execute(
                r#"
                INSERT INTO archive (version, ids, note, archive_date, compression, payload)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    archive.version.to_string(),
                    serde_json::to_string(&archive.ids)?,
                    archive.note,
                    Utc::now().to_rfc3339(),
                    archive.compression.as_str(),
                    archive.payload,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })();

        if result.is_ok() {
            conn.execute("COMMIT", [])?;
        } else {
            let _ = conn.execute("ROLLBACK", []);
        }

        result
    }

    /// All archives, oldest first, without payloads.
    pub fn list_archives(&self) -> Result<Vec<ArchiveSummary>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT version, json_array_length(ids), note, archive_date, compression, length(payload)
            FROM archive ORDER BY rowid
            "#,
        )?;
        let archives = stmt
            .query_map([], |row| {
                Ok(ArchiveSummary {
                    version: version_column(row, 0)?,
                    documents: row.get::<_, i64>(1)? as usize,
                    note: row.get(2)?,
                    archive_date: parse_datetime(&row.get::<_, String>(3)?),
                    compression: compression_column(row, 4)?,
                    size: row.get::<_, i64>(5)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(archives)
    }

    pub fn get_archive(&self, version: &ArchiveVersion) -> Result<Option<Archive>> {
        let conn = self.connect()?;
        let archive = conn
            .query_row(
                &format!("{} WHERE version = ?1", ARCHIVE_COLUMNS),
                params![version.to_string()],
                row_to_archive,
            )
            .optional()?;
        Ok(archive)
    }

    /// Archives built on the given (UTC) day.
    pub fn archives_on(&self, date: NaiveDate) -> Result<Vec<Archive>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE substr(archive_date, 1, 10) = ?1 ORDER BY rowid",
            ARCHIVE_COLUMNS
        ))?;
        let archives = stmt
            .query_map(params![date.format("%Y-%m-%d").to_string()], row_to_archive)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(archives)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::error::Error;
    use crate::models::{ArchiveVersion, Compression, NewArchive};
    use crate::repository::test_support::repo;

    fn new_archive(version: &str, ids: &[&str]) -> NewArchive {
        NewArchive {
            version: version.parse().unwrap(),
            ids: ids.iter().map(|s| s.to_string()).collect(),
            note: Some("test".to_string()),
            compression: Compression::Xz,
            payload: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_insert_and_read_back() {
        let (_dir, repo) = repo();
        assert!(repo.latest_archive_version().unwrap().is_none());

        repo.insert_archive(&new_archive("1.0", &["a", "b"]), None)
            .unwrap();
        let v1: ArchiveVersion = "1.0".parse().unwrap();
        repo.insert_archive(&new_archive("1.1", &["c"]), Some(v1))
            .unwrap();

        assert_eq!(
            repo.latest_archive_version().unwrap().unwrap().to_string(),
            "1.1"
        );
        let ids = repo.archived_ids().unwrap();
        assert_eq!(ids.len(), 3);

        let listed = repo.list_archives().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].documents, 2);
        assert_eq!(listed[0].size, 3);

        let archive = repo.get_archive(&v1).unwrap().unwrap();
        assert_eq!(archive.ids, ["a", "b"]);
        assert_eq!(archive.payload, [1, 2, 3]);

        let today = repo.archives_on(Utc::now().date_naive()).unwrap();
        assert_eq!(today.len(), 2);
    }

    #[test]
    fn test_version_conflict() {
        let (_dir, repo) = repo();
        repo.insert_archive(&new_archive("1.0", &["a"]), None)
            .unwrap();

        // a second build that also started from "no archive" must not win
        let err = repo
            .insert_archive(&new_archive("1.0", &["b"]), None)
            .unwrap_err();
        assert!(matches!(err, Error::VersionConflict { .. }));
        assert_eq!(repo.list_archives().unwrap().len(), 1);
    }
}
