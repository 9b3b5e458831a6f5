//! Raw record operations.

use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde_json::{Map, Value};

use super::{parse_datetime, CorpusRepository, OptionalExt, Result};
use crate::models::Record;

/// Decode a JSON object column.
pub(super) fn json_object(row: &Row, idx: usize) -> rusqlite::Result<Map<String, Value>> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(super) fn row_to_record(row: &Row) -> rusqlite::Result<Record> {
    Ok(Record {
        id: row.get(0)?,
        fields: json_object(row, 1)?,
        changed: parse_datetime(&row.get::<_, String>(2)?),
    })
}

impl CorpusRepository {
    /// Insert or replace records; returns the number written.
    pub fn upsert_records(&self, records: &[Record]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO raw (id, fields, changed) VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET fields = excluded.fields, changed = excluded.changed
                "#,
            )?;
            for record in records {
                stmt.execute(params![
                    record.id,
                    serde_json::to_string(&record.fields)?,
                    record.changed.to_rfc3339()
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// One page of records in insertion order.
    pub fn raw_page(&self, limit: usize, offset: usize) -> Result<Vec<Record>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, fields, changed FROM raw ORDER BY rowid LIMIT ?1 OFFSET ?2",
        )?;
        let records = stmt
            .query_map(params![limit as i64, offset as i64], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_record(&self, id: &str) -> Result<Option<Record>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT id, fields, changed FROM raw WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    pub fn count_records(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM raw", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::{body, repo};

    #[test]
    fn test_upsert_and_page() {
        let (_dir, repo) = repo();
        repo.upsert_records(&[body("a", "one"), body("b", "two"), body("c", "three")])
            .unwrap();
        assert_eq!(repo.count_records().unwrap(), 3);

        let page = repo.raw_page(2, 1).unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);

        // replacing keeps the row position
        repo.upsert_records(&[body("a", "uno")]).unwrap();
        let first = repo.raw_page(1, 0).unwrap();
        assert_eq!(first[0].text("body"), Some("uno"));
        assert_eq!(repo.count_records().unwrap(), 3);
    }

    #[test]
    fn test_get_missing_record() {
        let (_dir, repo) = repo();
        assert!(repo.get_record("nope").unwrap().is_none());
    }
}
