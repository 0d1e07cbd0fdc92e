//! Local SQLite persistence for the bridge: which channel each session maps
//! to, and where each agent's SSE cursor last landed so a restart resumes
//! instead of replaying from zero.

use crate::error::Result;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionMapping {
    pub session_key: String,
    pub agent_id: String,
    pub org_slug: String,
    pub channel_id: String,
    pub channel_type: String,
    pub created_at: String,
}

pub struct BridgeState {
    pool: SqlitePool,
}

impl BridgeState {
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::BridgeError::Config(format!(
                        "failed to create state directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_mappings (
                session_key  TEXT PRIMARY KEY,
                agent_id     TEXT NOT NULL,
                org_slug     TEXT NOT NULL,
                channel_id   TEXT NOT NULL,
                channel_type TEXT NOT NULL DEFAULT 'project',
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS event_cursors (
                agent_id         TEXT PRIMARY KEY,
                org_slug         TEXT NOT NULL,
                last_sequence_id INTEGER NOT NULL,
                updated_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_session_channel ON session_mappings(channel_id, agent_id)",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn get_session_key(&self, channel_id: &str, agent_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT session_key FROM session_mappings WHERE channel_id = ? AND agent_id = ?",
        )
        .bind(channel_id)
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(key,)| key))
    }

    pub async fn get_channel_id(&self, session_key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT channel_id FROM session_mappings WHERE session_key = ?")
                .bind(session_key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    pub async fn create_session_mapping(
        &self,
        session_key: &str,
        agent_id: &str,
        org_slug: &str,
        channel_id: &str,
        channel_type: &str,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT OR REPLACE INTO session_mappings
               (session_key, agent_id, org_slug, channel_id, channel_type, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session_key)
        .bind(agent_id)
        .bind(org_slug)
        .bind(channel_id)
        .bind(channel_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_session_mapping(&self, session_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_mappings WHERE session_key = ?")
            .bind(session_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_sessions(&self, agent_id: &str) -> Result<Vec<SessionMapping>> {
        let rows = sqlx::query_as::<_, SessionMapping>(
            "SELECT * FROM session_mappings WHERE agent_id = ?",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_cursor(&self, agent_id: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_sequence_id FROM event_cursors WHERE agent_id = ?")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(seq,)| seq))
    }

    pub async fn save_cursor(&self, agent_id: &str, org_slug: &str, sequence_id: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO event_cursors (agent_id, org_slug, last_sequence_id, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(agent_id) DO UPDATE SET last_sequence_id = ?, updated_at = ?"#,
        )
        .bind(agent_id)
        .bind(org_slug)
        .bind(sequence_id)
        .bind(&now)
        .bind(sequence_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_state() -> (BridgeState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge_state.db");
        let state = BridgeState::open(path.to_str().unwrap()).await.unwrap();
        (state, dir)
    }

    #[tokio::test]
    async fn session_mapping_round_trips() {
        let (state, _dir) = temp_state().await;
        state
            .create_session_mapping("mc:acme:project:p1", "release-bot", "acme", "c1", "project")
            .await
            .unwrap();

        assert_eq!(
            state.get_session_key("c1", "release-bot").await.unwrap(),
            Some("mc:acme:project:p1".to_string())
        );
        assert_eq!(
            state.get_channel_id("mc:acme:project:p1").await.unwrap(),
            Some("c1".to_string())
        );

        let sessions = state.list_sessions("release-bot").await.unwrap();
        assert_eq!(sessions.len(), 1);

        state.delete_session_mapping("mc:acme:project:p1").await.unwrap();
        assert_eq!(state.get_channel_id("mc:acme:project:p1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cursor_upsert_overwrites_previous_value() {
        let (state, _dir) = temp_state().await;
        assert_eq!(state.get_cursor("release-bot").await.unwrap(), None);

        state.save_cursor("release-bot", "acme", 10).await.unwrap();
        assert_eq!(state.get_cursor("release-bot").await.unwrap(), Some(10));

        state.save_cursor("release-bot", "acme", 42).await.unwrap();
        assert_eq!(state.get_cursor("release-bot").await.unwrap(), Some(42));
    }
}
