use mc_common::ids::{ActorKind, TenantId};
use mc_core::event::{Event, EventId};
use mc_core::log::EventLog;
use mc_storage::PostgresEventLog;

fn get_test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set (use docker-compose.test.yml)")
}

async fn setup_test_db() -> PostgresEventLog {
    let log = PostgresEventLog::new(&get_test_db_url())
        .await
        .expect("Failed to connect to test database");
    log.run_migrations().await.expect("Failed to run migrations");
    log
}

fn sample_event(tenant_id: TenantId) -> Event {
    Event {
        id: EventId::new(),
        sequence_id: 0,
        tenant_id,
        event_type: "task.created".to_string(),
        actor_id: None,
        actor_kind: ActorKind::System,
        payload: serde_json::json!({"task_id": "t1"}),
        timestamp: chrono::Utc::now(),
    }
}

#[tokio::test]
#[ignore] // Run only when test services are available
async fn test_postgres_connection() {
    let log = setup_test_db().await;
    assert!(log.pool().acquire().await.is_ok());
}

#[tokio::test]
#[ignore]
async fn test_append_assigns_increasing_sequence_ids() {
    let log = setup_test_db().await;
    let tenant = TenantId::new();

    let first = log.append(sample_event(tenant)).await.unwrap();
    let second = log.append(sample_event(tenant)).await.unwrap();

    assert!(second.sequence_id > first.sequence_id);
}

#[tokio::test]
#[ignore]
async fn test_range_returns_events_after_cursor_in_order() {
    let log = setup_test_db().await;
    let tenant = TenantId::new();

    let first = log.append(sample_event(tenant)).await.unwrap();
    let second = log.append(sample_event(tenant)).await.unwrap();

    let range = log.range(tenant, first.sequence_id, 10).await.unwrap();
    assert_eq!(range.len(), 1);
    assert_eq!(range[0].id, second.id);
}

#[tokio::test]
#[ignore]
async fn test_min_and_max_sequence_id_track_appends() {
    let log = setup_test_db().await;
    let tenant = TenantId::new();

    assert_eq!(log.min_sequence_id(tenant).await.unwrap(), None);

    let first = log.append(sample_event(tenant)).await.unwrap();
    let second = log.append(sample_event(tenant)).await.unwrap();

    assert_eq!(log.min_sequence_id(tenant).await.unwrap(), Some(first.sequence_id));
    assert_eq!(log.max_sequence_id(tenant).await.unwrap(), Some(second.sequence_id));
}
