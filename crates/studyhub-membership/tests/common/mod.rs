#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use studyhub_membership::{MembershipEngine, NewGroup, NewUser};
use studyhub_storage::{
    CreateRequestParams, Group, GroupId, GroupPurpose, MembershipRequest, Store, User,
};
use studyhub_store_sqlite::SqliteStore;

pub type Engine = MembershipEngine<SqliteStore>;

pub const JOIN_MESSAGE: &str = "I would like to join, please.";

pub async fn engine() -> Engine {
    let store = SqliteStore::open_in_memory().await.unwrap();
    MembershipEngine::new(Arc::new(store))
}

pub async fn user(engine: &Engine, name: &str) -> User {
    let email = format!("{name}@example.com");
    engine
        .store()
        .add_whitelisted_email(&email, None)
        .await
        .unwrap();
    engine
        .register_user(NewUser {
            email,
            name: name.to_string(),
            password_hash: "$argon2id$test".to_string(),
        })
        .await
        .unwrap()
}

pub fn new_group(name: &str, max_members: u32) -> NewGroup {
    NewGroup {
        name: name.to_string(),
        description: Some("we read papers together".to_string()),
        purpose: GroupPurpose::Learning,
        max_members,
    }
}

pub async fn group(engine: &Engine, leader: &User, name: &str, max_members: u32) -> Group {
    engine
        .create_group(&leader.id, new_group(name, max_members))
        .await
        .unwrap()
}

/// A PENDING request whose deadline passed a day ago.
pub async fn stale_request(engine: &Engine, group_id: GroupId, applicant: &User) -> MembershipRequest {
    let sent = Utc::now() - Duration::days(8);
    let mut uow = engine.store().begin().await.unwrap();
    let request = uow
        .insert_request(&CreateRequestParams::new(
            group_id,
            applicant.id,
            JOIN_MESSAGE.to_string(),
            sent,
        ))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    request
}
