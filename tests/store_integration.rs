//! Integration tests for the PostgreSQL store.
//!
//! These tests need a real database.
//! Run with: DATABASE_URL=postgres://... cargo test --test store_integration -- --ignored

use serde_json::{json, Value};
use uuid::Uuid;

use draft_forge::scheduler::DraftStatus;
use draft_forge::storage::{Database, StoreGateway};

async fn connect() -> Database {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL environment variable must be set for integration tests");
    let db = Database::connect(&url).await.expect("Should connect");
    db.run_migrations().await.expect("Migrations should apply");
    db
}

/// Inserts a pending task that sorts before any other waiting row.
async fn insert_pending(db: &Database) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO todolist (id, proc_inst_id, activity_name, tool, user_id, tenant_id, draft_status, updated_at)
        VALUES ($1, $2, 'integration topic', 'formHandler:it-form', '', 'it-tenant', 'PENDING', '2000-01-01')
        "#,
    )
    .bind(id)
    .bind(format!("it-{}", id))
    .execute(db.pool())
    .await
    .expect("Insert should succeed");
    id
}

async fn row_state(db: &Database, id: Uuid) -> (String, Option<String>, Option<Value>, Option<Value>) {
    sqlx::query_as("SELECT draft_status, consumer, draft, output FROM todolist WHERE id = $1")
        .bind(id)
        .fetch_one(db.pool())
        .await
        .expect("Row should exist")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test store_integration -- --ignored
async fn test_lease_is_exclusive() {
    let db = connect().await;
    let id = insert_pending(&db).await;

    let first = db.lease_one_task("consumer-a", 1).await.unwrap().expect("task leased");
    assert_eq!(first.id, id);
    assert_eq!(first.task_type, DraftStatus::Pending);
    assert_eq!(first.consumer.as_deref(), Some("consumer-a"));

    let second = db.lease_one_task("consumer-b", 1).await.unwrap();
    assert!(second.map_or(true, |task| task.id != id));

    db.mark_completed(id).await.unwrap();
    let (status, consumer, _, _) = row_state(&db, id).await;
    assert_eq!(status, "COMPLETED");
    assert!(consumer.is_none());
}

#[tokio::test]
#[ignore]
async fn test_release_keeps_status() {
    let db = connect().await;
    let id = insert_pending(&db).await;
    db.lease_one_task("consumer-a", 1).await.unwrap().expect("task leased");

    db.release_lease(id).await.unwrap();

    let (status, consumer, _, _) = row_state(&db, id).await;
    assert_eq!(status, "IN_PROGRESS");
    assert!(consumer.is_none());
    assert_eq!(db.get_status(id).await.unwrap(), Some(DraftStatus::InProgress));
}

#[tokio::test]
#[ignore]
async fn test_draft_and_final_saves() {
    let db = connect().await;
    let id = insert_pending(&db).await;

    let draft = json!({"it-form": {"r1": "partial"}});
    db.save_result(id, &draft, false).await.unwrap();
    let (_, _, saved_draft, output) = row_state(&db, id).await;
    assert_eq!(saved_draft, Some(draft));
    assert!(output.is_none());

    let done = json!({"it-form": {"r1": "complete"}});
    db.save_result(id, &done, true).await.unwrap();
    db.save_result(id, &done, true).await.unwrap();
    let (_, _, saved_draft, output) = row_state(&db, id).await;
    assert_eq!(saved_draft, Some(done.clone()));
    assert_eq!(output, Some(done));

    db.mark_failed(id).await.unwrap();
    assert_eq!(db.get_status(id).await.unwrap(), Some(DraftStatus::Failed));
}

#[tokio::test]
#[ignore]
async fn test_missing_form_gets_default_type() {
    let db = connect().await;
    let meta = db
        .fetch_form_metadata("formHandler:no-such-form", "it-tenant")
        .await
        .unwrap();
    assert_eq!(meta.form_id, "no-such-form");
    assert_eq!(meta.form_types.len(), 1);
    assert_eq!(meta.form_types[0].key, "no-such-form");
}
