//! Read-only operations. These go straight to the store; no unit of work.

use studyhub_activity::{ActivityEntry, ActivityFilter, ActivityLog, ActivityLogError};
use studyhub_storage::{Group, GroupId, GroupSummary, MemberProfile, Store, StoreError, UserId};

use crate::error::or_not_found;
use crate::role::{has_role, GroupRole};
use crate::{MembershipEngine, MembershipError};

impl From<ActivityLogError> for MembershipError {
    fn from(err: ActivityLogError) -> Self {
        match err {
            ActivityLogError::InvalidFilter(reason) => MembershipError::invalid("filter", reason),
            other => MembershipError::Store(StoreError::backend(other)),
        }
    }
}

/// Page of activity entries; `None` falls back to the log's defaults.
#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Page {
    fn apply(self, mut filter: ActivityFilter) -> ActivityFilter {
        filter.limit = self.limit;
        filter.offset = self.offset;
        filter
    }
}

impl<S: Store> MembershipEngine<S> {
    pub(crate) async fn active_group(&self, group_id: &GroupId) -> Result<Group, MembershipError> {
        let group = self
            .store()
            .get_group(group_id)
            .await
            .map_err(or_not_found(MembershipError::GroupNotFound))?;
        if !group.is_active {
            return Err(MembershipError::GroupNotFound);
        }
        Ok(group)
    }

    /// The requester's role in an active group.
    pub async fn role_of(
        &self,
        requester: &UserId,
        group_id: &GroupId,
    ) -> Result<GroupRole, MembershipError> {
        let group = self.active_group(group_id).await?;
        let membership = self.store().get_active_membership(requester).await?;
        Ok(has_role(requester, &group, membership.as_ref()))
    }

    pub(crate) async fn require_member(
        &self,
        requester: &UserId,
        group_id: &GroupId,
    ) -> Result<GroupRole, MembershipError> {
        let role = self.role_of(requester, group_id).await?;
        if !role.is_member() {
            return Err(MembershipError::NotAMember);
        }
        Ok(role)
    }

    /// Active groups with live member counts, newest first.
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, MembershipError> {
        Ok(self.store().list_groups().await?)
    }

    pub async fn get_group(&self, group_id: &GroupId) -> Result<GroupSummary, MembershipError> {
        let group = self.active_group(group_id).await?;
        let member_count = self.store().count_active_members(group_id).await?;
        Ok(GroupSummary {
            group,
            member_count,
        })
    }

    pub async fn list_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<MemberProfile>, MembershipError> {
        self.active_group(group_id).await?;
        Ok(self.store().list_group_members(group_id).await?)
    }
}

impl<S: Store + ActivityLog> MembershipEngine<S> {
    /// A group's activity, newest first. Members only.
    pub async fn group_activity(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        page: Page,
    ) -> Result<Vec<ActivityEntry>, MembershipError> {
        self.require_member(requester, group_id).await?;
        let filter = page.apply(ActivityFilter::new().group_id(*group_id));
        Ok(self.store().query(filter).await?)
    }

    /// Activity attributed to the requester, newest first.
    pub async fn my_activity(
        &self,
        requester: &UserId,
        page: Page,
    ) -> Result<Vec<ActivityEntry>, MembershipError> {
        let filter = page.apply(ActivityFilter::new().actor_id(*requester));
        Ok(self.store().query(filter).await?)
    }
}
