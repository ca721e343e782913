//! StoreBackend tests.
//!
//! Tests for the storage backend abstraction layer.

use std::sync::Arc;

use studyhub_activity::{ActivityAction, ActivityFilter, ActivityLog};
use studyhub_membership::{MembershipEngine, NewGroup, NewUser};
use studyhub_storage::{GroupPurpose, Store};
use studyhub_store_sqlite::SqliteStore;

use crate::backend::StoreBackend;

#[tokio::test]
async fn store_backend_open_picks_sqlite() {
    let backend = StoreBackend::open("sqlite::memory:").await.unwrap();
    assert_eq!(backend.kind(), "sqlite");
}

#[tokio::test]
async fn store_backend_dispatches_reads_and_writes() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let backend = StoreBackend::Sqlite(store);

    backend
        .add_whitelisted_email("kim@example.com", Some("pilot"))
        .await
        .unwrap();
    let entries = backend.list_whitelisted_emails().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].note.as_deref(), Some("pilot"));

    let engine = MembershipEngine::new(Arc::new(backend.clone()));
    let user = engine
        .register_user(NewUser {
            email: "kim@example.com".to_string(),
            name: "Kim".to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        })
        .await
        .unwrap();
    engine
        .create_group(
            &user.id,
            NewGroup {
                name: "Backends".to_string(),
                description: None,
                purpose: GroupPurpose::Other,
                max_members: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(backend.get_user_by_email("kim@example.com").await.unwrap().id, user.id);
    assert_eq!(backend.list_groups().await.unwrap().len(), 1);
    assert!(backend.get_active_membership(&user.id).await.unwrap().is_some());

    let created = backend
        .count(ActivityFilter::new().action(ActivityAction::GroupCreated))
        .await
        .unwrap();
    assert_eq!(created, 1);

    backend.remove_whitelisted_email("kim@example.com").await.unwrap();
    assert!(backend.list_whitelisted_emails().await.unwrap().is_empty());
}
