//! Translation memory table. Upserts and hit accounting are single statements
//! (`ON CONFLICT ... DO UPDATE`, `UPDATE ... RETURNING`), so concurrent
//! writers on one key never double-create or lose increments.

use chrono::Utc;
use rusqlite::{params, Row};
use tracing::debug;

use super::{format_time, get_conn, parse_time, SqlitePool};
use crate::memory_db::schema::{MemoryKey, MemoryStats, TranslationMemoryEntry};
use crate::stores::TranslationMemoryStore;

const ENTRY_COLUMNS: &str = "source_text, source_lang, target_lang, context_fingerprint, translated_text,
     context_summary, topic_label, entities_involved, confidence_score, usage_count, last_used, created_at";

#[derive(Clone)]
pub struct SqliteTranslationMemory {
    pool: SqlitePool,
}

impl SqliteTranslationMemory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &Row) -> anyhow::Result<TranslationMemoryEntry> {
        let entities_json: String = row.get(7)?;
        let entities_involved: Vec<String> = serde_json::from_str(&entities_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse entities_involved: {}", e))?;
        let last_used: String = row.get(10)?;
        let created_at: String = row.get(11)?;

        Ok(TranslationMemoryEntry {
            source_text: row.get(0)?,
            source_lang: row.get(1)?,
            target_lang: row.get(2)?,
            context_fingerprint: row.get(3)?,
            translated_text: row.get(4)?,
            context_summary: row.get(5)?,
            topic_label: row.get(6)?,
            entities_involved,
            confidence_score: row.get(8)?,
            usage_count: row.get(9)?,
            last_used: parse_time(&last_used)?,
            created_at: parse_time(&created_at)?,
        })
    }
}

impl TranslationMemoryStore for SqliteTranslationMemory {
    fn upsert_reinforce(&self, entry: &TranslationMemoryEntry, step: f32) -> anyhow::Result<TranslationMemoryEntry> {
        let conn = get_conn(&self.pool)?;
        let entities_json = serde_json::to_string(&entry.entities_involved)?;
        let now = format_time(&Utc::now());

        let sql = format!(
            "INSERT INTO translation_memory ({cols})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(source_text, source_lang, target_lang, context_fingerprint) DO UPDATE SET
                 usage_count = translation_memory.usage_count + 1,
                 confidence_score = MIN(translation_memory.confidence_score + ?13, 1.0),
                 last_used = ?11
             RETURNING {cols}",
            cols = ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            entry.source_text,
            entry.source_lang,
            entry.target_lang,
            entry.context_fingerprint,
            entry.translated_text,
            entry.context_summary,
            entry.topic_label,
            entities_json,
            entry.confidence_score.clamp(0.0, 1.0),
            entry.usage_count,
            now,
            format_time(&entry.created_at),
            step,
        ])?;

        let row = rows
            .next()?
            .ok_or_else(|| anyhow::anyhow!("Upsert returned no row"))?;
        let stored = Self::row_to_entry(row)?;
        debug!(
            "Translation memory upsert {} -> confidence {:.2}, usage {}",
            stored.context_fingerprint, stored.confidence_score, stored.usage_count
        );
        Ok(stored)
    }

    fn take_hit(&self, key: &MemoryKey, gate: f32) -> anyhow::Result<Option<TranslationMemoryEntry>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "UPDATE translation_memory
             SET usage_count = usage_count + 1, last_used = ?5
             WHERE source_text = ?1 AND source_lang = ?2 AND target_lang = ?3
               AND context_fingerprint = ?4 AND confidence_score > ?6
             RETURNING {}",
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            key.source_text,
            key.source_lang,
            key.target_lang,
            key.context_fingerprint,
            format_time(&Utc::now()),
            gate,
        ])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    fn get(&self, key: &MemoryKey) -> anyhow::Result<Option<TranslationMemoryEntry>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {} FROM translation_memory
             WHERE source_text = ?1 AND source_lang = ?2 AND target_lang = ?3 AND context_fingerprint = ?4",
            ENTRY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            key.source_text,
            key.source_lang,
            key.target_lang,
            key.context_fingerprint,
        ])?;

        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    fn stats(&self, gate: f32) -> anyhow::Result<MemoryStats> {
        let conn = get_conn(&self.pool)?;
        let (entries, total_usage, servable): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(usage_count), 0),
                    COALESCE(SUM(CASE WHEN confidence_score > ?1 THEN 1 ELSE 0 END), 0)
             FROM translation_memory",
            [gate],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(MemoryStats {
            entries: entries.max(0) as u64,
            total_usage: total_usage.max(0) as u64,
            servable_entries: servable.max(0) as u64,
        })
    }
}
