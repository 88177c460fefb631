use rusqlite::{params, Row};

use super::{format_time, get_conn, parse_time, SqlitePool};
use crate::memory_db::schema::FeedbackRecord;
use crate::stores::FeedbackStore;

/// Append-only translation corrections.
#[derive(Clone)]
pub struct SqliteFeedbackStore {
    pool: SqlitePool,
}

impl SqliteFeedbackStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &Row) -> anyhow::Result<FeedbackRecord> {
        let created_at: String = row.get(10)?;
        Ok(FeedbackRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            original_text: row.get(2)?,
            original_translation: row.get(3)?,
            corrected_translation: row.get(4)?,
            source_lang: row.get(5)?,
            target_lang: row.get(6)?,
            context: row.get(7)?,
            session_id: row.get(8)?,
            feedback_type: row.get(9)?,
            created_at: parse_time(&created_at)?,
        })
    }
}

impl FeedbackStore for SqliteFeedbackStore {
    fn append(&self, record: &FeedbackRecord) -> anyhow::Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "INSERT INTO translation_feedback
             (id, user_id, original_text, original_translation, corrected_translation,
              source_lang, target_lang, context, session_id, feedback_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id,
                record.user_id,
                record.original_text,
                record.original_translation,
                record.corrected_translation,
                record.source_lang,
                record.target_lang,
                record.context,
                record.session_id,
                record.feedback_type,
                format_time(&record.created_at),
            ],
        )?;
        Ok(())
    }

    fn recent_for_user(&self, user_id: &str, limit: usize) -> anyhow::Result<Vec<FeedbackRecord>> {
        let conn = get_conn(&self.pool)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, original_text, original_translation, corrected_translation,
                    source_lang, target_lang, context, session_id, feedback_type, created_at
             FROM translation_feedback
             WHERE user_id = ?1
             ORDER BY rowid DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![user_id, limit as i64])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(Self::row_to_record(row)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;
    use chrono::Utc;

    #[test]
    fn test_append_and_list_newest_first() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        for (i, corrected) in ["Kumusta", "Kamusta ka"].iter().enumerate() {
            db.feedback
                .append(&FeedbackRecord {
                    id: format!("fb-{}", i),
                    user_id: "u1".to_string(),
                    original_text: "How are you".to_string(),
                    original_translation: "Paano ka".to_string(),
                    corrected_translation: corrected.to_string(),
                    source_lang: "en".to_string(),
                    target_lang: "tl".to_string(),
                    context: Some("Speaker A: hi".to_string()),
                    session_id: None,
                    feedback_type: "correction".to_string(),
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        let records = db.feedback.recent_for_user("u1", 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].corrected_translation, "Kamusta ka");
        assert_eq!(records[1].context.as_deref(), Some("Speaker A: hi"));
        assert!(db.feedback.recent_for_user("u2", 10).unwrap().is_empty());
    }
}
