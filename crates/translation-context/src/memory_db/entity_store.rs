use chrono::Utc;
use rusqlite::{params, Row};

use super::{format_time, get_conn, parse_time, SqlitePool};
use crate::memory_db::schema::EntityMention;
use crate::stores::EntityStore;
use crate::utils::TextUtils;

const MENTION_COLUMNS: &str =
    "session_id, entity_type, entity_name, context_snippet, first_seen, last_seen, mention_count";

/// Per-session entity mentions.
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: SqlitePool,
}

impl SqliteEntityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_mention(row: &Row) -> anyhow::Result<EntityMention> {
        let first_seen: String = row.get(4)?;
        let last_seen: String = row.get(5)?;
        Ok(EntityMention {
            session_id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_name: row.get(2)?,
            context_snippet: row.get(3)?,
            first_seen: parse_time(&first_seen)?,
            last_seen: parse_time(&last_seen)?,
            mention_count: row.get(6)?,
        })
    }
}

impl EntityStore for SqliteEntityStore {
    fn track(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_name: &str,
        context: &str,
        max_snippet_chars: usize,
    ) -> anyhow::Result<EntityMention> {
        let conn = get_conn(&self.pool)?;
        let now = format_time(&Utc::now());
        let snippet = TextUtils::keep_tail(context, max_snippet_chars);

        // substr with a negative start keeps the last N characters.
        let sql = format!(
            "INSERT INTO entity_mentions ({cols})
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 1)
             ON CONFLICT(session_id, entity_type, entity_name) DO UPDATE SET
                 mention_count = entity_mentions.mention_count + 1,
                 last_seen = excluded.last_seen,
                 context_snippet = CASE
                     WHEN excluded.context_snippet = '' THEN entity_mentions.context_snippet
                     WHEN entity_mentions.context_snippet = '' THEN excluded.context_snippet
                     ELSE substr(entity_mentions.context_snippet || char(10) || excluded.context_snippet, -?6)
                 END
             RETURNING {cols}",
            cols = MENTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            session_id,
            entity_type,
            entity_name,
            snippet,
            now,
            max_snippet_chars as i64,
        ])?;

        let row = rows
            .next()?
            .ok_or_else(|| anyhow::anyhow!("Entity upsert returned no row"))?;
        Self::row_to_mention(row)
    }

    fn session_entities(&self, session_id: &str) -> anyhow::Result<Vec<EntityMention>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {} FROM entity_mentions WHERE session_id = ?1
             ORDER BY last_seen DESC, entity_name ASC",
            MENTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([session_id])?;

        let mut mentions = Vec::new();
        while let Some(row) = rows.next()? {
            mentions.push(Self::row_to_mention(row)?);
        }
        Ok(mentions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;

    #[test]
    fn test_track_creates_then_increments() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let store = &db.entities;

        let first = store
            .track("s1", "anime_character", "Tanjiro", "Tanjiro is strong", 1000)
            .unwrap();
        assert_eq!(first.mention_count, 1);
        assert_eq!(first.context_snippet, "Tanjiro is strong");

        let second = store
            .track("s1", "anime_character", "Tanjiro", "Tanjiro again", 1000)
            .unwrap();
        assert_eq!(second.mention_count, 2);
        assert_eq!(second.context_snippet, "Tanjiro is strong\nTanjiro again");
        assert_eq!(second.first_seen, first.first_seen);

        store.track("s2", "anime_character", "Tanjiro", "other session", 1000).unwrap();
        assert_eq!(store.session_entities("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_snippet_keeps_recent_tail() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let store = &db.entities;

        store.track("s1", "tech_term", "api", "Tanjiro is strong", 20).unwrap();
        let capped = store.track("s1", "tech_term", "api", "Tanjiro again", 20).unwrap();
        assert_eq!(capped.context_snippet, "strong\nTanjiro again");
    }
}
