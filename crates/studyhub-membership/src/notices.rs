//! Group notice board. Members post, authors edit and delete their own
//! notices, and only the leader pins.

use serde_json::json;
use studyhub_activity::{record, ActivityAction, ActivityEntry};
use studyhub_storage::{
    CreateNoticeParams, GroupId, Notice, NoticeId, NoticeKind, Store, UnitOfWork,
    UpdateNoticeParams, UserId,
};

use crate::engine::{lock_active_group, role_in};
use crate::error::or_not_found;
use crate::role::GroupRole;
use crate::validate::{self, bounded};
use crate::{MembershipEngine, MembershipError};

#[derive(Clone, Debug)]
pub struct NewNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub content: String,
    pub pinned: bool,
}

fn title(value: &str) -> Result<String, MembershipError> {
    bounded("title", value, 1, validate::NOTICE_TITLE_MAX)
}

fn content(value: &str) -> Result<String, MembershipError> {
    bounded("content", value, 1, validate::NOTICE_CONTENT_MAX)
}

/// Load a notice of `group_id` that `requester` wrote.
async fn own_notice(
    uow: &mut dyn UnitOfWork,
    requester: &UserId,
    group_id: &GroupId,
    notice_id: &NoticeId,
) -> Result<Notice, MembershipError> {
    let notice = uow
        .get_notice(notice_id)
        .await
        .map_err(or_not_found(MembershipError::NoticeNotFound))?;
    if notice.group_id != *group_id {
        return Err(MembershipError::NoticeNotFound);
    }
    if notice.author_id != *requester {
        return Err(MembershipError::NotAuthor);
    }
    Ok(notice)
}

impl<S: Store> MembershipEngine<S> {
    pub async fn create_notice(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        new: NewNotice,
    ) -> Result<Notice, MembershipError> {
        let params = CreateNoticeParams {
            group_id: *group_id,
            author_id: *requester,
            kind: new.kind,
            title: title(&new.title)?,
            content: content(&new.content)?,
            pinned: new.pinned,
        };

        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        match role_in(uow.as_mut(), requester, &group).await?.0 {
            GroupRole::None => return Err(MembershipError::NotAMember),
            GroupRole::Member if params.pinned => return Err(MembershipError::NotLeader),
            _ => {}
        }

        let notice = uow.insert_notice(&params).await?;

        let entry = ActivityEntry::builder(requester, ActivityAction::NoticeCreated)
            .group_id(Some(group_id))
            .message(format!("posted \"{}\"", notice.title))
            .metadata(json!({
                "notice_id": notice.id.to_string(),
                "kind": notice.kind.as_str(),
                "pinned": notice.pinned,
            }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, notice_id = %notice.id, "Notice created");
        Ok(notice)
    }

    /// Author-only edit. The leader gets no override.
    pub async fn update_notice(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        notice_id: &NoticeId,
        changes: UpdateNoticeParams,
    ) -> Result<Notice, MembershipError> {
        let params = UpdateNoticeParams {
            kind: changes.kind,
            title: changes.title.as_deref().map(title).transpose()?,
            content: changes.content.as_deref().map(content).transpose()?,
        };

        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if !role_in(uow.as_mut(), requester, &group).await?.0.is_member() {
            return Err(MembershipError::NotAMember);
        }
        own_notice(uow.as_mut(), requester, group_id, notice_id).await?;

        let notice = uow
            .update_notice(notice_id, &params)
            .await
            .map_err(or_not_found(MembershipError::NoticeNotFound))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::NoticeUpdated)
            .group_id(Some(group_id))
            .message(format!("edited \"{}\"", notice.title))
            .metadata(json!({ "notice_id": notice.id.to_string() }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, notice_id = %notice_id, "Notice updated");
        Ok(notice)
    }

    /// Author-only delete.
    pub async fn delete_notice(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        notice_id: &NoticeId,
    ) -> Result<(), MembershipError> {
        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if !role_in(uow.as_mut(), requester, &group).await?.0.is_member() {
            return Err(MembershipError::NotAMember);
        }
        let notice = own_notice(uow.as_mut(), requester, group_id, notice_id).await?;

        uow.delete_notice(notice_id)
            .await
            .map_err(or_not_found(MembershipError::NoticeNotFound))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::NoticeDeleted)
            .group_id(Some(group_id))
            .message(format!("deleted \"{}\"", notice.title))
            .metadata(json!({ "notice_id": notice_id.to_string() }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, notice_id = %notice_id, "Notice deleted");
        Ok(())
    }

    /// Leader-only pin/unpin.
    pub async fn set_notice_pinned(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        notice_id: &NoticeId,
        pinned: bool,
    ) -> Result<Notice, MembershipError> {
        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        match role_in(uow.as_mut(), requester, &group).await?.0 {
            GroupRole::Leader => {}
            GroupRole::Member => return Err(MembershipError::NotLeader),
            GroupRole::None => return Err(MembershipError::NotAMember),
        }

        let existing = uow
            .get_notice(notice_id)
            .await
            .map_err(or_not_found(MembershipError::NoticeNotFound))?;
        if existing.group_id != *group_id {
            return Err(MembershipError::NoticeNotFound);
        }

        let notice = uow.set_notice_pinned(notice_id, pinned).await?;

        let action = if pinned {
            ActivityAction::NoticePinned
        } else {
            ActivityAction::NoticeUnpinned
        };
        let entry = ActivityEntry::builder(requester, action)
            .group_id(Some(group_id))
            .message(format!(
                "{} \"{}\"",
                if pinned { "pinned" } else { "unpinned" },
                notice.title
            ))
            .metadata(json!({ "notice_id": notice_id.to_string() }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, notice_id = %notice_id, pinned, "Notice pin changed");
        Ok(notice)
    }

    /// Members only; pinned first, then newest.
    pub async fn list_notices(
        &self,
        requester: &UserId,
        group_id: &GroupId,
    ) -> Result<Vec<Notice>, MembershipError> {
        self.require_member(requester, group_id).await?;
        Ok(self.store().list_notices(group_id).await?)
    }
}
