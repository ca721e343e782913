mod common;

use common::*;
use studyhub_activity::{ActivityAction, ActivityFilter, ActivityLog};
use studyhub_membership::{Decision, ErrorKind, MembershipError, NewNotice, Page};
use studyhub_storage::{Group, NoticeKind, UpdateNoticeParams, User};

fn notice(title: &str, pinned: bool) -> NewNotice {
    NewNotice {
        kind: NoticeKind::General,
        title: title.to_string(),
        content: "Chapter 4 before Thursday.".to_string(),
        pinned,
    }
}

async fn join(engine: &Engine, leader: &User, g: &Group, u: &User) {
    let r = engine
        .send_join_request(&u.id, &g.id, JOIN_MESSAGE)
        .await
        .unwrap();
    engine
        .respond_to_request(&leader.id, &g.id, &r.id, Decision::Approve, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn members_post_and_leader_pins() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let member = user(&engine, "member").await;
    let outsider = user(&engine, "outsider").await;
    let g = group(&engine, &leader, "Readers", 4).await;
    join(&engine, &leader, &g, &member).await;

    let first = engine
        .create_notice(&member.id, &g.id, notice("Reading list", false))
        .await
        .unwrap();
    let rules = engine
        .create_notice(&leader.id, &g.id, notice("House rules", true))
        .await
        .unwrap();
    let latest = engine
        .create_notice(&member.id, &g.id, notice("Next meetup", false))
        .await
        .unwrap();

    assert!(matches!(
        engine
            .create_notice(&member.id, &g.id, notice("Look at me", true))
            .await,
        Err(MembershipError::NotLeader)
    ));
    assert!(matches!(
        engine
            .create_notice(&outsider.id, &g.id, notice("Spam", false))
            .await,
        Err(MembershipError::NotAMember)
    ));
    let err = engine
        .create_notice(&member.id, &g.id, notice("   ", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    let listed = engine.list_notices(&member.id, &g.id).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![rules.id, latest.id, first.id]);

    assert!(matches!(
        engine.list_notices(&outsider.id, &g.id).await,
        Err(MembershipError::NotAMember)
    ));

    // pinning is the leader's call
    assert!(matches!(
        engine
            .set_notice_pinned(&member.id, &g.id, &first.id, true)
            .await,
        Err(MembershipError::NotLeader)
    ));
    let pinned = engine
        .set_notice_pinned(&leader.id, &g.id, &first.id, true)
        .await
        .unwrap();
    assert!(pinned.pinned);
    engine
        .set_notice_pinned(&leader.id, &g.id, &rules.id, false)
        .await
        .unwrap();

    let listed = engine.list_notices(&leader.id, &g.id).await.unwrap();
    assert_eq!(listed[0].id, first.id);

    let pins = engine
        .store()
        .count(ActivityFilter::new().action(ActivityAction::NoticePinned))
        .await
        .unwrap();
    let unpins = engine
        .store()
        .count(ActivityFilter::new().action(ActivityAction::NoticeUnpinned))
        .await
        .unwrap();
    assert_eq!((pins, unpins), (1, 1));
}

#[tokio::test]
async fn only_the_author_edits_or_deletes() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let author = user(&engine, "author").await;
    let g = group(&engine, &leader, "Writers", 4).await;
    join(&engine, &leader, &g, &author).await;

    let n = engine
        .create_notice(&author.id, &g.id, notice("Draft", false))
        .await
        .unwrap();

    // no leader override
    let err = engine
        .update_notice(
            &leader.id,
            &g.id,
            &n.id,
            UpdateNoticeParams {
                title: Some("Hijacked".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MembershipError::NotAuthor));
    assert!(matches!(
        engine.delete_notice(&leader.id, &g.id, &n.id).await,
        Err(MembershipError::NotAuthor)
    ));

    let edited = engine
        .update_notice(
            &author.id,
            &g.id,
            &n.id,
            UpdateNoticeParams {
                title: Some("  Final  ".into()),
                kind: Some(NoticeKind::Schedule),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.title, "Final");
    assert_eq!(edited.kind, NoticeKind::Schedule);
    assert_eq!(edited.content, n.content);

    engine.delete_notice(&author.id, &g.id, &n.id).await.unwrap();
    assert!(matches!(
        engine.delete_notice(&author.id, &g.id, &n.id).await,
        Err(MembershipError::NoticeNotFound)
    ));
    assert!(engine.list_notices(&author.id, &g.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn notice_ids_are_scoped_to_their_group() {
    let engine = engine().await;
    let a_leader = user(&engine, "a").await;
    let b_leader = user(&engine, "b").await;
    let ga = group(&engine, &a_leader, "Alpha", 4).await;
    let gb = group(&engine, &b_leader, "Beta", 4).await;

    let n = engine
        .create_notice(&a_leader.id, &ga.id, notice("Alpha only", false))
        .await
        .unwrap();
    assert!(matches!(
        engine
            .set_notice_pinned(&b_leader.id, &gb.id, &n.id, true)
            .await,
        Err(MembershipError::NoticeNotFound)
    ));
}

#[tokio::test]
async fn group_activity_is_members_only() {
    let engine = engine().await;
    let leader = user(&engine, "leader").await;
    let member = user(&engine, "member").await;
    let outsider = user(&engine, "outsider").await;
    let g = group(&engine, &leader, "Logs", 4).await;
    join(&engine, &leader, &g, &member).await;
    engine
        .create_notice(&member.id, &g.id, notice("Hello", false))
        .await
        .unwrap();

    let feed = engine
        .group_activity(&member.id, &g.id, Page::default())
        .await
        .unwrap();
    // created, sent, approved, reviewed, notice
    assert_eq!(feed.len(), 5);
    assert_eq!(feed[0].action, ActivityAction::NoticeCreated);

    let page = engine
        .group_activity(&leader.id, &g.id, Page { limit: Some(2), offset: Some(1) })
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, feed[1].id);

    assert!(matches!(
        engine
            .group_activity(&outsider.id, &g.id, Page::default())
            .await,
        Err(MembershipError::NotAMember)
    ));

    let mine = engine
        .my_activity(&member.id, Page::default())
        .await
        .unwrap();
    assert!(mine.iter().all(|e| e.get_actor_id() == member.id));
    // registration, request, approval, notice
    assert_eq!(mine.len(), 4);
}
