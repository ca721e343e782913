mod common;

use common::*;
use studyhub_activity::{ActivityAction, ActivityFilter, ActivityLog};
use studyhub_membership::{ErrorKind, MembershipError, NewUser, GROUP_CLOSED_RESPONSE};
use studyhub_storage::{
    GroupPurpose, RequestStatus, Store, UpdateGroupParams, UpdateProfileParams,
};

#[tokio::test]
async fn registration_requires_whitelist() {
    let engine = engine().await;

    let refused = engine
        .register_user(NewUser {
            email: "stranger@example.com".into(),
            name: "Stranger".into(),
            password_hash: "x".into(),
        })
        .await;
    assert!(matches!(refused, Err(MembershipError::EmailNotWhitelisted)));

    engine
        .store()
        .add_whitelisted_email("mixed@example.com", None)
        .await
        .unwrap();
    let user = engine
        .register_user(NewUser {
            email: "  Mixed@Example.com ".into(),
            name: "Mixed".into(),
            password_hash: "x".into(),
        })
        .await
        .unwrap();
    assert_eq!(user.email, "mixed@example.com");
    assert!(user.verified);

    let again = engine
        .register_user(NewUser {
            email: "MIXED@example.com".into(),
            name: "Mixed".into(),
            password_hash: "x".into(),
        })
        .await;
    assert!(matches!(again, Err(MembershipError::EmailTaken)));

    let registered = engine
        .store()
        .count(ActivityFilter::new().action(ActivityAction::UserRegistered))
        .await
        .unwrap();
    assert_eq!(registered, 1);
}

#[tokio::test]
async fn profile_update_is_logged() {
    let engine = engine().await;
    let alice = user(&engine, "alice").await;

    let updated = engine
        .update_profile(
            &alice.id,
            UpdateProfileParams {
                bio: Some("  systems programmer ".into()),
                github_url: Some("https://github.com/alice".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.bio.as_deref(), Some("systems programmer"));
    assert_eq!(updated.name, "alice");

    let bad = engine
        .update_profile(
            &alice.id,
            UpdateProfileParams {
                blog_url: Some("javascript:alert(1)".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(bad.unwrap_err().kind(), ErrorKind::ValidationFailed);

    let entries = engine
        .store()
        .query(ActivityFilter::new().action(ActivityAction::UserProfileUpdated))
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].metadata,
        Some(serde_json::json!({ "fields": ["bio", "github_url"] }))
    );
}

#[tokio::test]
async fn create_group_makes_leader_a_member() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;

    let g = group(&engine, &leader, "Rust Study", 4).await;
    assert_eq!(g.leader_id, leader.id);
    assert!(g.is_active);

    let summary = engine.get_group(&g.id).await.unwrap();
    assert_eq!(summary.member_count, 1);

    let members = engine.list_members(&g.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, leader.id);

    let created = engine
        .store()
        .query(ActivityFilter::new().group_id(g.id))
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].action, ActivityAction::GroupCreated);
    assert_eq!(created[0].get_actor_id(), leader.id);
}

#[tokio::test]
async fn create_group_rejections() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let member = user(&engine, "member").await;
    let other = user(&engine, "other").await;

    let g = group(&engine, &leader, "Algorithms", 4).await;

    // already leads a group
    let err = engine
        .create_group(&leader.id, new_group("Second", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::AlreadyLeader));

    // already an active member elsewhere
    let req = engine
        .send_join_request(&member.id, &g.id, JOIN_MESSAGE)
        .await
        .unwrap();
    engine
        .respond_to_request(
            &leader.id,
            &g.id,
            &req.id,
            studyhub_membership::Decision::Approve,
            None,
        )
        .await
        .unwrap();
    let err = engine
        .create_group(&member.id, new_group("Mine", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::AlreadyMember));

    // active names are unique
    let err = engine
        .create_group(&other.id, new_group("Algorithms", 4))
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::NameTaken));
    assert_eq!(err.code(), "NAME_TAKEN");

    // shape checks happen before any write
    for bad in [new_group("x", 4), new_group("Fine name", 1), new_group("Fine name", 11)] {
        let err = engine.create_group(&other.id, bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }
    assert_eq!(engine.list_groups().await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_group_capacity_cannot_drop_below_members() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let a = user(&engine, "a").await;
    let b = user(&engine, "b").await;
    let g = group(&engine, &leader, "Compilers", 5).await;

    for u in [&a, &b] {
        let r = engine
            .send_join_request(&u.id, &g.id, JOIN_MESSAGE)
            .await
            .unwrap();
        engine
            .respond_to_request(
                &leader.id,
                &g.id,
                &r.id,
                studyhub_membership::Decision::Approve,
                None,
            )
            .await
            .unwrap();
    }

    let err = engine
        .update_group(
            &leader.id,
            &g.id,
            UpdateGroupParams {
                max_members: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MembershipError::CapacityBelowMembership { current: 3 }
    ));

    let err = engine
        .update_group(&a.id, &g.id, UpdateGroupParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::NotLeader));

    let updated = engine
        .update_group(
            &leader.id,
            &g.id,
            UpdateGroupParams {
                max_members: Some(3),
                purpose: Some(GroupPurpose::Project),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.max_members, 3);
    assert_eq!(updated.purpose, GroupPurpose::Project);
    assert_eq!(
        updated.description.as_deref(),
        Some("we read papers together")
    );
}

#[tokio::test]
async fn leave_and_remove() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let a = user(&engine, "a").await;
    let b = user(&engine, "b").await;
    let outsider = user(&engine, "outsider").await;
    let g = group(&engine, &leader, "Databases", 5).await;

    for u in [&a, &b] {
        let r = engine
            .send_join_request(&u.id, &g.id, JOIN_MESSAGE)
            .await
            .unwrap();
        engine
            .respond_to_request(
                &leader.id,
                &g.id,
                &r.id,
                studyhub_membership::Decision::Approve,
                None,
            )
            .await
            .unwrap();
    }

    assert!(matches!(
        engine.leave_group(&leader.id, &g.id).await,
        Err(MembershipError::LeaderCannotLeave)
    ));
    assert!(matches!(
        engine.leave_group(&outsider.id, &g.id).await,
        Err(MembershipError::NotAMember)
    ));
    engine.leave_group(&a.id, &g.id).await.unwrap();
    assert!(engine
        .store()
        .get_active_membership(&a.id)
        .await
        .unwrap()
        .is_none());

    assert!(matches!(
        engine.remove_member(&b.id, &g.id, &leader.id).await,
        Err(MembershipError::NotLeader)
    ));
    assert!(matches!(
        engine.remove_member(&leader.id, &g.id, &leader.id).await,
        Err(MembershipError::CannotRemoveLeader)
    ));
    assert!(matches!(
        engine.remove_member(&leader.id, &g.id, &a.id).await,
        Err(MembershipError::NotAMember)
    ));
    engine.remove_member(&leader.id, &g.id, &b.id).await.unwrap();

    assert_eq!(engine.get_group(&g.id).await.unwrap().member_count, 1);

    // a former member is free to found a group
    group(&engine, &a, "Fresh Start", 3).await;
}

#[tokio::test]
async fn deactivate_group_releases_everyone() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let member = user(&engine, "member").await;
    let waiting = user(&engine, "waiting").await;
    let g = group(&engine, &leader, "Networking", 5).await;

    let r = engine
        .send_join_request(&member.id, &g.id, JOIN_MESSAGE)
        .await
        .unwrap();
    engine
        .respond_to_request(
            &leader.id,
            &g.id,
            &r.id,
            studyhub_membership::Decision::Approve,
            None,
        )
        .await
        .unwrap();
    let pending = engine
        .send_join_request(&waiting.id, &g.id, JOIN_MESSAGE)
        .await
        .unwrap();

    assert!(matches!(
        engine.deactivate_group(&member.id, &g.id).await,
        Err(MembershipError::NotLeader)
    ));
    engine.deactivate_group(&leader.id, &g.id).await.unwrap();

    assert!(matches!(
        engine.get_group(&g.id).await,
        Err(MembershipError::GroupNotFound)
    ));
    for u in [&leader, &member] {
        assert!(engine
            .store()
            .get_active_membership(&u.id)
            .await
            .unwrap()
            .is_none());
    }
    let closed = engine.store().get_request(&pending.id).await.unwrap();
    assert_eq!(closed.status, RequestStatus::Rejected);
    assert_eq!(closed.response_message.as_deref(), Some(GROUP_CLOSED_RESPONSE));

    // the old leader may lead again, and the name is reusable
    group(&engine, &leader, "Networking", 3).await;

    let deactivated = engine
        .store()
        .count(ActivityFilter::new().action(ActivityAction::GroupDeactivated))
        .await
        .unwrap();
    assert_eq!(deactivated, 1);
}
