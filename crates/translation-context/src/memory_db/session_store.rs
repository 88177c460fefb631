//! Session-scoped analysis results: topic segments and message clusters.

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use super::{format_time, get_conn, parse_time, SqlitePool};
use crate::memory_db::schema::{MessageCluster, TopicRecord};
use crate::stores::{ClusterStore, TopicStore};

const TOPIC_COLUMNS: &str =
    "session_id, topic_label, confidence, keywords, start_time, end_time, message_count";

const CLUSTER_COLUMNS: &str =
    "session_id, cluster_id, member_message_ids, cluster_type, topic_label, start_time, end_time, coherence_score";

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_topic(row: &Row) -> anyhow::Result<TopicRecord> {
        let keywords_json: String = row.get(3)?;
        let keywords: Vec<String> = serde_json::from_str(&keywords_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse keywords: {}", e))?;
        let start_time: String = row.get(4)?;
        let end_time: Option<String> = row.get(5)?;

        Ok(TopicRecord {
            session_id: row.get(0)?,
            topic_label: row.get(1)?,
            confidence: row.get(2)?,
            keywords,
            start_time: parse_time(&start_time)?,
            end_time: end_time.as_deref().map(parse_time).transpose()?,
            message_count: row.get(6)?,
        })
    }

    fn row_to_cluster(row: &Row) -> anyhow::Result<MessageCluster> {
        let members_json: String = row.get(2)?;
        let member_message_ids: Vec<String> = serde_json::from_str(&members_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse member_message_ids: {}", e))?;
        let start_time: String = row.get(5)?;
        let end_time: String = row.get(6)?;

        Ok(MessageCluster {
            session_id: row.get(0)?,
            cluster_id: row.get(1)?,
            member_message_ids,
            cluster_type: row.get(3)?,
            topic_label: row.get(4)?,
            start_time: parse_time(&start_time)?,
            end_time: parse_time(&end_time)?,
            coherence_score: row.get(7)?,
        })
    }
}

impl TopicStore for SessionStore {
    fn record_topic(
        &self,
        session_id: &str,
        label: &str,
        confidence: f32,
        keywords: &[String],
    ) -> anyhow::Result<TopicRecord> {
        let mut conn = get_conn(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = format_time(&Utc::now());
        let keywords_json = serde_json::to_string(keywords)?;

        let latest: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, topic_label FROM conversation_topics
                 WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                [session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let record = {
            let (sql, bound_id) = match &latest {
                Some((id, latest_label)) if latest_label == label => (
                    format!(
                        "UPDATE conversation_topics
                         SET end_time = ?1, message_count = message_count + 1,
                             confidence = ?2, keywords = ?3
                         WHERE id = ?4
                         RETURNING {}",
                        TOPIC_COLUMNS
                    ),
                    Some(*id),
                ),
                _ => {
                    if let Some((id, _)) = &latest {
                        tx.execute(
                            "UPDATE conversation_topics SET end_time = ?1 WHERE id = ?2",
                            params![now, id],
                        )?;
                    }
                    (
                        format!(
                            "INSERT INTO conversation_topics ({cols})
                             VALUES (?4, ?5, ?2, ?3, ?1, NULL, 1)
                             RETURNING {cols}",
                            cols = TOPIC_COLUMNS
                        ),
                        None,
                    )
                }
            };

            let mut stmt = tx.prepare(&sql)?;
            let mut rows = match bound_id {
                Some(id) => stmt.query(params![now, confidence, keywords_json, id])?,
                None => stmt.query(params![now, confidence, keywords_json, session_id, label])?,
            };
            let row = rows
                .next()?
                .ok_or_else(|| anyhow::anyhow!("Topic write returned no row"))?;
            Self::row_to_topic(row)?
        };

        tx.commit()?;
        debug!(
            "Topic segment '{}' for session {} now spans {} message(s)",
            record.topic_label, session_id, record.message_count
        );
        Ok(record)
    }

    fn session_topics(&self, session_id: &str) -> anyhow::Result<Vec<TopicRecord>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {} FROM conversation_topics WHERE session_id = ?1 ORDER BY id ASC",
            TOPIC_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([session_id])?;

        let mut topics = Vec::new();
        while let Some(row) = rows.next()? {
            topics.push(Self::row_to_topic(row)?);
        }
        Ok(topics)
    }
}

impl ClusterStore for SessionStore {
    fn replace_clusters(&self, session_id: &str, clusters: &[MessageCluster]) -> anyhow::Result<()> {
        let mut conn = get_conn(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM message_clusters WHERE session_id = ?1", [session_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO message_clusters
                 (session_id, cluster_id, position, member_message_ids, cluster_type,
                  topic_label, start_time, end_time, coherence_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (position, cluster) in clusters.iter().enumerate() {
                stmt.execute(params![
                    session_id,
                    cluster.cluster_id,
                    position as i64,
                    serde_json::to_string(&cluster.member_message_ids)?,
                    cluster.cluster_type,
                    cluster.topic_label,
                    format_time(&cluster.start_time),
                    format_time(&cluster.end_time),
                    cluster.coherence_score,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn session_clusters(&self, session_id: &str) -> anyhow::Result<Vec<MessageCluster>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {} FROM message_clusters WHERE session_id = ?1 ORDER BY position ASC",
            CLUSTER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([session_id])?;

        let mut clusters = Vec::new();
        while let Some(row) = rows.next()? {
            clusters.push(Self::row_to_cluster(row)?);
        }
        Ok(clusters)
    }
}
