//! Memory database module - SQLite-backed implementations of the engine stores
pub mod entity_store;
pub mod feedback_store;
pub mod migration;
pub mod profile_store;
pub mod schema;
pub mod session_store;
pub mod translation_memory_store;

pub use entity_store::SqliteEntityStore;
pub use feedback_store::SqliteFeedbackStore;
pub use migration::MigrationManager;
pub use profile_store::SqliteProfileStore;
pub use schema::*;
pub use session_store::SessionStore;
pub use translation_memory_store::SqliteTranslationMemory;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) type SqlitePool = Arc<Pool<SqliteConnectionManager>>;
pub(crate) type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) fn get_conn(pool: &SqlitePool) -> anyhow::Result<PooledConn> {
    pool.get()
        .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
}

/// Fixed-width RFC 3339 so stored timestamps also sort as text.
pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_time(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|e| anyhow::anyhow!("Failed to parse timestamp '{}': {}", value, e))?
        .with_timezone(&Utc))
}

pub struct MemoryDatabase {
    pub translation_memory: SqliteTranslationMemory,
    pub entities: SqliteEntityStore,
    pub sessions: SessionStore,
    pub profiles: SqliteProfileStore,
    pub feedback: SqliteFeedbackStore,
    pool: SqlitePool,
}

impl MemoryDatabase {
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        info!("Opening translation context database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let manager = manager.with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            migration::MigrationManager::new(&mut conn).initialize_database()?;
        }

        info!("Translation context database initialized successfully");
        Ok(Self::from_pool(Arc::new(pool)))
    }

    /// Single-connection in-memory database; every `:memory:` connection is
    /// its own database, so the pool must never open a second one.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            migration::MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool)))
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            translation_memory: SqliteTranslationMemory::new(Arc::clone(&pool)),
            entities: SqliteEntityStore::new(Arc::clone(&pool)),
            sessions: SessionStore::new(Arc::clone(&pool)),
            profiles: SqliteProfileStore::new(Arc::clone(&pool)),
            feedback: SqliteFeedbackStore::new(Arc::clone(&pool)),
            pool,
        }
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = get_conn(&self.pool)?;
        Ok(migration::get_database_stats(&conn)?)
    }

    pub fn schema_version(&self) -> anyhow::Result<i32> {
        let mut conn = get_conn(&self.pool)?;
        Ok(MigrationManager::new(&mut conn).get_current_version()?)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        match self.pool.get() {
            Ok(conn) => {
                if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                    warn!("WAL checkpoint on close failed: {}", e);
                }
            }
            Err(e) => warn!("No connection available for WAL checkpoint on close: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_database_initializes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = MemoryDatabase::new(&dir.path().join("nested/ctx.db")).unwrap();
        assert_eq!(db.schema_version().unwrap(), migration::latest_version());
        assert_eq!(db.get_stats().unwrap().translation_memory, 0);
    }

    #[test]
    fn test_drop_checkpoints_wal() {
        use crate::stores::ProfileStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctx.db");
        {
            let db = MemoryDatabase::new(&path).unwrap();
            db.profiles.get_or_create("u1").unwrap();
        }
        let wal = dir.path().join("ctx.db-wal");
        assert!(!wal.exists() || std::fs::metadata(&wal).unwrap().len() == 0);

        let db = MemoryDatabase::new(&path).unwrap();
        assert_eq!(db.get_stats().unwrap().user_profiles, 1);
    }

    #[test]
    fn test_time_round_trip_is_fixed_width() {
        let now = Utc::now();
        let text = format_time(&now);
        assert!(text.ends_with('Z'));
        let parsed = parse_time(&text).unwrap();
        assert!((parsed - now).num_milliseconds().abs() < 1);
    }
}
