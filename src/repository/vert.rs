//! Vertical text and attribute operations.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::raw::json_object;
use super::{parse_datetime, CorpusRepository, Result};
use crate::models::{AnnotatedDocument, DocumentRow};

const DOCUMENT_COLUMNS: &str = r#"
    SELECT v.id, v.vertical_text, v.attr, r.fields, r.changed
    FROM vert v LEFT JOIN raw r ON r.id = v.id
"#;

fn row_to_document(row: &Row) -> rusqlite::Result<DocumentRow> {
    let fields = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(json_object(row, 3)?),
        None => None,
    };
    Ok(DocumentRow {
        id: row.get(0)?,
        vertical_text: row.get(1)?,
        attr: row.get(2)?,
        fields,
        changed: row.get::<_, Option<String>>(4)?.map(|s| parse_datetime(&s)),
    })
}

impl CorpusRepository {
    /// Every stored vertical id with its build date.
    pub fn vert_dates(&self) -> Result<HashMap<String, DateTime<Utc>>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT id, vert_date FROM vert")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(id, date)| (id, parse_datetime(&date)))
            .collect())
    }

    /// Insert or replace verticals in one transaction.
    ///
    /// A replaced vertical loses its attributes so the attribute pass
    /// rebuilds them from the current record.
    pub fn upsert_verticals(&self, docs: &[AnnotatedDocument]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO vert (id, vertical_text, vert_date, attr) VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    vertical_text = excluded.vertical_text,
                    vert_date = excluded.vert_date,
                    attr = excluded.attr
                "#,
            )?;
            for doc in docs {
                stmt.execute(params![
                    doc.id,
                    doc.vertical_text,
                    doc.vert_date.to_rfc3339(),
                    doc.attr
                ])?;
            }
        }
        tx.commit()?;
        Ok(docs.len())
    }

    /// One page of verticals joined with their records.
    pub fn document_page(&self, limit: usize, offset: usize) -> Result<Vec<DocumentRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY v.rowid LIMIT ?1 OFFSET ?2",
            DOCUMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Distinct record years (from `raw.changed`) among stored verticals.
    pub fn document_years(&self) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT DISTINCT COALESCE(substr(r.changed, 1, 4), '')
            FROM vert v LEFT JOIN raw r ON r.id = v.id
            ORDER BY 1
            "#,
        )?;
        let years = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(years)
    }

    /// All verticals whose record changed in `year`.
    pub fn documents_for_year(&self, year: &str) -> Result<Vec<DocumentRow>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE COALESCE(substr(r.changed, 1, 4), '') = ?1 ORDER BY v.rowid",
            DOCUMENT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![year], row_to_document)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Store synthesized attributes in one transaction.
    pub fn set_attrs(&self, attrs: &[(String, String)]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare("UPDATE vert SET attr = ?2 WHERE id = ?1")?;
            for (id, attr) in attrs {
                updated += stmt.execute(params![id, attr])?;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    /// One page of vertical text only.
    pub fn vertical_text_page(&self, limit: usize, offset: usize) -> Result<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT vertical_text FROM vert ORDER BY rowid LIMIT ?1 OFFSET ?2")?;
        let texts = stmt
            .query_map(params![limit as i64, offset as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(texts)
    }

    pub fn count_verticals(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vert", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_missing_attrs(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vert WHERE attr IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
