use chrono::Utc;
use rusqlite::{params, Connection, Row, TransactionBehavior};

use super::{format_time, get_conn, parse_time, SqlitePool};
use crate::memory_db::schema::UserProfile;
use crate::stores::ProfileStore;

const PROFILE_COLUMNS: &str = "user_id, preferred_formality, domain_interests, personal_glossary,
     language_pair_stats, style_preferences, created_at, updated_at";

/// User profiles stored as one row per user with JSON collection columns.
#[derive(Clone)]
pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_profile(row: &Row) -> anyhow::Result<UserProfile> {
        fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize, name: &str) -> anyhow::Result<T> {
            let raw: String = row.get(idx)?;
            serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", name, e))
        }

        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;
        Ok(UserProfile {
            user_id: row.get(0)?,
            preferred_formality: row.get(1)?,
            domain_interests: json_column(row, 2, "domain_interests")?,
            personal_glossary: json_column(row, 3, "personal_glossary")?,
            language_pair_stats: json_column(row, 4, "language_pair_stats")?,
            style_preferences: json_column(row, 5, "style_preferences")?,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        })
    }

    fn ensure_row(conn: &Connection, user_id: &str) -> anyhow::Result<()> {
        let now = format_time(&Utc::now());
        conn.execute(
            "INSERT OR IGNORE INTO user_profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![user_id, now],
        )?;
        Ok(())
    }

    fn load(conn: &Connection, user_id: &str) -> anyhow::Result<UserProfile> {
        let sql = format!("SELECT {} FROM user_profiles WHERE user_id = ?1", PROFILE_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([user_id])?;
        let row = rows
            .next()?
            .ok_or_else(|| anyhow::anyhow!("Profile {} vanished", user_id))?;
        Self::row_to_profile(row)
    }
}

impl ProfileStore for SqliteProfileStore {
    fn get_or_create(&self, user_id: &str) -> anyhow::Result<UserProfile> {
        let conn = get_conn(&self.pool)?;
        Self::ensure_row(&conn, user_id)?;
        Self::load(&conn, user_id)
    }

    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserProfile)) -> anyhow::Result<UserProfile> {
        let mut conn = get_conn(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        Self::ensure_row(&tx, user_id)?;
        let mut profile = Self::load(&tx, user_id)?;
        apply(&mut profile);
        profile.updated_at = Utc::now();

        tx.execute(
            "UPDATE user_profiles
             SET preferred_formality = ?2, domain_interests = ?3, personal_glossary = ?4,
                 language_pair_stats = ?5, style_preferences = ?6, updated_at = ?7
             WHERE user_id = ?1",
            params![
                user_id,
                profile.preferred_formality,
                serde_json::to_string(&profile.domain_interests)?,
                serde_json::to_string(&profile.personal_glossary)?,
                serde_json::to_string(&profile.language_pair_stats)?,
                serde_json::to_string(&profile.style_preferences)?,
                format_time(&profile.updated_at),
            ],
        )?;
        tx.commit()?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::schema::DomainInterest;
    use crate::memory_db::MemoryDatabase;

    #[test]
    fn test_get_or_create_defaults() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let profile = db.profiles.get_or_create("u1").unwrap();
        assert_eq!(profile.preferred_formality, "casual");
        assert!(profile.domain_interests.is_empty());
        assert!(profile.personal_glossary.is_empty());
    }

    #[test]
    fn test_update_persists_collections_in_order() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        db.profiles
            .update("u1", &mut |p| {
                p.domain_interests.push(DomainInterest { domain: "anime".into(), weight: 2.0 });
                p.personal_glossary.insert("zeta", "z".to_string());
                p.personal_glossary.insert("alpha", "a".to_string());
                p.language_pair_stats.insert("en-tl".into(), 3);
            })
            .unwrap();

        let loaded = db.profiles.get_or_create("u1").unwrap();
        assert_eq!(loaded.domain_interests[0].domain, "anime");
        let keys: Vec<&str> = loaded.personal_glossary.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(loaded.language_pair_stats.get("en-tl"), Some(&3));
    }
}
