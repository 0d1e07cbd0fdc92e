//! The durable event log over Postgres: the source of truth for every
//! event in the system.

use async_trait::async_trait;
use mc_common::{ids::TenantId, CoreError, Result};
use mc_core::event::{Event, EventId};
use mc_core::log::EventLog;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

pub struct PostgresEventLog {
    pool: PgPool,
}

impl PostgresEventLog {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `events` table and the per-tenant sequence counter table
    /// if they don't already exist. Idempotent; safe to call on every
    /// startup.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenant_sequence_counters (
                tenant_id UUID PRIMARY KEY,
                next_sequence_id BIGINT NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id UUID PRIMARY KEY,
                tenant_id UUID NOT NULL,
                sequence_id BIGINT NOT NULL,
                event_type TEXT NOT NULL,
                actor_id UUID,
                actor_kind TEXT NOT NULL,
                payload JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (tenant_id, sequence_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS events_tenant_sequence_idx ON events (tenant_id, sequence_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Atomically claim the next sequence id for `tenant_id` within `tx`.
    async fn next_sequence_id(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        tenant_id: TenantId,
    ) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO tenant_sequence_counters (tenant_id, next_sequence_id)
            VALUES ($1, 2)
            ON CONFLICT (tenant_id)
            DO UPDATE SET next_sequence_id = tenant_sequence_counters.next_sequence_id + 1
            RETURNING next_sequence_id - 1
            "#,
        )
        .bind(tenant_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?
        .try_get::<i64, _>(0)
        .map_err(|e| CoreError::Storage(e.to_string()))
    }
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Result<Event> {
    let actor_kind_str: String = row.try_get("actor_kind").map_err(|e| CoreError::Storage(e.to_string()))?;
    let actor_kind = match actor_kind_str.as_str() {
        "human" => mc_common::ids::ActorKind::Human,
        "agent" => mc_common::ids::ActorKind::Agent,
        _ => mc_common::ids::ActorKind::System,
    };

    Ok(Event {
        id: EventId(row.try_get("id").map_err(|e| CoreError::Storage(e.to_string()))?),
        sequence_id: row.try_get("sequence_id").map_err(|e| CoreError::Storage(e.to_string()))?,
        tenant_id: TenantId(row.try_get("tenant_id").map_err(|e| CoreError::Storage(e.to_string()))?),
        event_type: row.try_get("event_type").map_err(|e| CoreError::Storage(e.to_string()))?,
        actor_id: row.try_get("actor_id").map_err(|e| CoreError::Storage(e.to_string()))?,
        actor_kind,
        payload: row.try_get("payload").map_err(|e| CoreError::Storage(e.to_string()))?,
        timestamp: row.try_get("created_at").map_err(|e| CoreError::Storage(e.to_string()))?,
    })
}

#[async_trait]
impl EventLog for PostgresEventLog {
    async fn append(&self, event: Event) -> Result<Event> {
        let mut tx = self.pool.begin().await.map_err(|e| CoreError::Storage(e.to_string()))?;
        let sequence_id = Self::next_sequence_id(&mut tx, event.tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO events (id, tenant_id, sequence_id, event_type, actor_id, actor_kind, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id.0)
        .bind(event.tenant_id.0)
        .bind(sequence_id)
        .bind(&event.event_type)
        .bind(event.actor_id)
        .bind(event.actor_kind.to_string())
        .bind(&event.payload)
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        tx.commit().await.map_err(|e| CoreError::Storage(e.to_string()))?;

        Ok(Event {
            sequence_id,
            ..event
        })
    }

    async fn range(&self, tenant_id: TenantId, after: i64, limit: usize) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, sequence_id, event_type, actor_id, actor_kind, payload, created_at
            FROM events
            WHERE tenant_id = $1 AND sequence_id > $2
            ORDER BY sequence_id ASC
            LIMIT $3
            "#,
        )
        .bind(tenant_id.0)
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

        rows.into_iter().map(row_to_event).collect()
    }

    async fn min_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MIN(sequence_id) AS min_seq FROM events WHERE tenant_id = $1")
            .bind(tenant_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        row.try_get::<Option<i64>, _>("min_seq")
            .map_err(|e| CoreError::Storage(e.to_string()))
    }

    async fn max_sequence_id(&self, tenant_id: TenantId) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(sequence_id) AS max_seq FROM events WHERE tenant_id = $1")
            .bind(tenant_id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;
        row.try_get::<Option<i64>, _>("max_seq")
            .map_err(|e| CoreError::Storage(e.to_string()))
    }
}
