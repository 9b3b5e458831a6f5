//! Language distribution operations.

use std::collections::HashSet;

use rusqlite::params;

use super::raw::row_to_record;
use super::{CorpusRepository, Result};
use crate::models::{LanguageDistribution, Record, RecordSelection};

fn language_path(language: &str) -> String {
    format!("$.\"{}\"", language.replace('"', ""))
}

impl CorpusRepository {
    pub fn upsert_languages(&self, rows: &[LanguageDistribution]) -> Result<usize> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO lang (id, lid) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET lid = excluded.lid
                "#,
            )?;
            for row in rows {
                stmt.execute(params![row.id, serde_json::to_string(&row.lid)?])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Ids whose distribution gives `language` at least `min_portion`.
    pub fn ids_with_language(&self, language: &str, min_portion: f64) -> Result<HashSet<String>> {
        let conn = self.connect()?;
        let path = language_path(language);
        let mut stmt = conn.prepare("SELECT id FROM lang WHERE json_extract(lid, ?1) >= ?2")?;
        let ids = stmt
            .query_map(params![path, min_portion], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<String>, _>>()?;
        Ok(ids)
    }

    /// One page of records matching a language and date window, by id.
    pub fn selected_page(&self, selection: &RecordSelection, limit: usize, offset: usize) -> Result<Vec<Record>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT r.id, r.fields, r.changed FROM lang l
            JOIN raw r ON r.id = l.id
            WHERE json_extract(l.lid, ?1) >= ?2
              AND date(COALESCE(json_extract(r.fields, ?3), r.changed)) BETWEEN date(?4) AND date(?5)
            ORDER BY l.id
            LIMIT ?6 OFFSET ?7
            "#,
        )?;
        let records = stmt
            .query_map(
                params![
                    language_path(&selection.language),
                    selection.min_portion,
                    format!("$.{}", selection.date_field),
                    selection.start.to_string(),
                    selection.end.to_string(),
                    limit as i64,
                    offset as i64
                ],
                row_to_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
