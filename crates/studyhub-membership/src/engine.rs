use std::sync::Arc;

use serde_json::json;
use studyhub_activity::{record, ActivityAction, ActivityEntry};
use studyhub_storage::{
    CreateGroupParams, CreateUserParams, Group, GroupId, GroupPurpose, Membership,
    MembershipStatus, RequestStatus, Store, UnitOfWork, UpdateGroupParams, UpdateProfileParams,
    User, UserId,
};

use crate::error::{or_conflict, or_exists, or_not_found};
use crate::role::{has_role, GroupRole};
use crate::validate::{self, bounded, optional};
use crate::MembershipError;

/// Response written on pending requests when their group closes.
pub const GROUP_CLOSED_RESPONSE: &str = "group closed";

#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    /// Already hashed by the caller.
    pub password_hash: String,
}

#[derive(Clone, Debug)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub purpose: GroupPurpose,
    pub max_members: u32,
}

/// The membership workflow engine.
///
/// Every state change runs in one [`UnitOfWork`]: checks, writes and the
/// activity entries commit together or not at all. While a unit of work is
/// open the engine only talks to it, never to the store directly.
pub struct MembershipEngine<S> {
    store: Arc<S>,
}

impl<S> Clone for MembershipEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// Load a group under lock; inactive groups are reported as missing.
pub(crate) async fn lock_active_group(
    uow: &mut dyn UnitOfWork,
    group_id: &GroupId,
) -> Result<Group, MembershipError> {
    let group = uow
        .lock_group(group_id)
        .await
        .map_err(or_not_found(MembershipError::GroupNotFound))?;
    if !group.is_active {
        return Err(MembershipError::GroupNotFound);
    }
    Ok(group)
}

/// The requester's role in `group` plus their ACTIVE membership, if any.
pub(crate) async fn role_in(
    uow: &mut dyn UnitOfWork,
    user: &UserId,
    group: &Group,
) -> Result<(GroupRole, Option<Membership>), MembershipError> {
    let membership = uow.find_active_membership(user).await?;
    let role = has_role(user, group, membership.as_ref());
    Ok((role, membership))
}

impl<S: Store> MembershipEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub(crate) async fn begin(&self) -> Result<Box<dyn UnitOfWork>, MembershipError> {
        Ok(self.store.begin().await?)
    }

    // ───────────────────────────────────── Users ──────────────────────────────────────

    /// Register a whitelisted email. The account is created verified.
    pub async fn register_user(&self, new: NewUser) -> Result<User, MembershipError> {
        let email = validate::normalize_email(&new.email);
        if email.is_empty() || !email.contains('@') {
            return Err(MembershipError::invalid("email", "must be an email address"));
        }
        let name = bounded("name", &new.name, 1, validate::USER_NAME_MAX)?;

        let mut uow = self.begin().await?;
        if !uow.is_email_whitelisted(&email).await? {
            tracing::debug!(%email, "registration refused: not whitelisted");
            return Err(MembershipError::EmailNotWhitelisted);
        }
        let user = uow
            .insert_user(&CreateUserParams {
                email,
                name,
                password_hash: new.password_hash,
                verified: true,
            })
            .await
            .map_err(or_exists(MembershipError::EmailTaken))?;

        let entry = ActivityEntry::builder(&user.id, ActivityAction::UserRegistered)
            .message(format!("{} joined studyhub", user.name))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: &UserId) -> Result<User, MembershipError> {
        self.store
            .get_user_by_id(user_id)
            .await
            .map_err(or_not_found(MembershipError::UserNotFound))
    }

    pub async fn update_profile(
        &self,
        requester: &UserId,
        changes: UpdateProfileParams,
    ) -> Result<User, MembershipError> {
        let params = UpdateProfileParams {
            name: changes
                .name
                .as_deref()
                .map(|n| bounded("name", n, 1, validate::USER_NAME_MAX))
                .transpose()?,
            bio: optional("bio", changes.bio.as_deref(), validate::BIO_MAX)?,
            github_url: validate::url("github_url", changes.github_url.as_deref())?,
            blog_url: validate::url("blog_url", changes.blog_url.as_deref())?,
        };

        let mut uow = self.begin().await?;
        let user = uow
            .update_profile(requester, &params)
            .await
            .map_err(or_not_found(MembershipError::UserNotFound))?;

        let fields: Vec<&str> = [
            ("name", params.name.is_some()),
            ("bio", params.bio.is_some()),
            ("github_url", params.github_url.is_some()),
            ("blog_url", params.blog_url.is_some()),
        ]
        .into_iter()
        .filter_map(|(f, set)| set.then_some(f))
        .collect();
        let entry = ActivityEntry::builder(requester, ActivityAction::UserProfileUpdated)
            .message("updated profile")
            .metadata(json!({ "fields": fields }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(user_id = %requester, ?fields, "Profile updated");
        Ok(user)
    }

    // ───────────────────────────────────── Groups ─────────────────────────────────────

    /// Create a group led by `requester`, together with the leader's membership.
    pub async fn create_group(
        &self,
        requester: &UserId,
        new: NewGroup,
    ) -> Result<Group, MembershipError> {
        let name = bounded(
            "name",
            &new.name,
            validate::GROUP_NAME_MIN,
            validate::GROUP_NAME_MAX,
        )?;
        let description = optional(
            "description",
            new.description.as_deref(),
            validate::DESCRIPTION_MAX,
        )?;
        let max_members = validate::capacity(new.max_members)?;

        let mut uow = self.begin().await?;
        uow.lock_user(requester)
            .await
            .map_err(or_not_found(MembershipError::UserNotFound))?;

        if uow.find_group_led_by(requester).await?.is_some() {
            return Err(MembershipError::AlreadyLeader);
        }
        if uow.find_active_membership(requester).await?.is_some() {
            return Err(MembershipError::AlreadyMember);
        }
        if uow.find_active_group_by_name(&name).await?.is_some() {
            return Err(MembershipError::NameTaken);
        }

        let group = uow
            .insert_group(&CreateGroupParams {
                name,
                description,
                purpose: new.purpose,
                max_members,
                leader_id: *requester,
            })
            .await
            .map_err(or_exists(MembershipError::NameTaken))?;
        uow.insert_membership(&group.id, requester)
            .await
            .map_err(or_exists(MembershipError::AlreadyMember))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::GroupCreated)
            .group_id(Some(&group.id))
            .message(format!("created group \"{}\"", group.name))
            .metadata(json!({
                "name": group.name,
                "purpose": group.purpose.as_str(),
                "max_members": group.max_members,
            }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(
            group_id = %group.id,
            leader_id = %requester,
            max_members = group.max_members,
            "Group created"
        );
        Ok(group)
    }

    /// Leader-only edit of description, purpose or capacity.
    pub async fn update_group(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        changes: UpdateGroupParams,
    ) -> Result<Group, MembershipError> {
        let params = UpdateGroupParams {
            description: optional(
                "description",
                changes.description.as_deref(),
                validate::DESCRIPTION_MAX,
            )?,
            purpose: changes.purpose,
            max_members: changes.max_members.map(validate::capacity).transpose()?,
        };

        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if has_role(requester, &group, None) != GroupRole::Leader {
            return Err(MembershipError::NotLeader);
        }
        if let Some(new_max) = params.max_members {
            let current = uow.count_active_members(group_id).await?;
            if new_max < current {
                return Err(MembershipError::CapacityBelowMembership { current });
            }
        }

        let updated = uow.update_group(group_id, &params).await?;

        let entry = ActivityEntry::builder(requester, ActivityAction::GroupUpdated)
            .group_id(Some(group_id))
            .message(format!("updated group \"{}\"", updated.name))
            .metadata(json!({
                "description_changed": params.description.is_some(),
                "purpose": params.purpose.map(|p| p.as_str()),
                "max_members": params.max_members,
            }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, "Group updated");
        Ok(updated)
    }

    /// Close a group: end every membership and reject what is still pending.
    pub async fn deactivate_group(
        &self,
        requester: &UserId,
        group_id: &GroupId,
    ) -> Result<(), MembershipError> {
        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if has_role(requester, &group, None) != GroupRole::Leader {
            return Err(MembershipError::NotLeader);
        }

        let members = uow.list_active_memberships(group_id).await?;
        for m in &members {
            let status = if m.user_id == group.leader_id {
                MembershipStatus::Left
            } else {
                MembershipStatus::Removed
            };
            uow.end_membership(&m.id, status).await?;
        }

        let pending = uow.list_pending_requests(group_id).await?;
        for r in &pending {
            uow.decide_request(&r.id, RequestStatus::Rejected, Some(GROUP_CLOSED_RESPONSE))
                .await?;
        }

        uow.deactivate_group(group_id).await?;

        let entry = ActivityEntry::builder(requester, ActivityAction::GroupDeactivated)
            .group_id(Some(group_id))
            .message(format!("closed group \"{}\"", group.name))
            .metadata(json!({
                "ended_memberships": members.len(),
                "rejected_requests": pending.len(),
            }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(
            group_id = %group_id,
            ended_memberships = members.len(),
            rejected_requests = pending.len(),
            "Group deactivated"
        );
        Ok(())
    }

    // ─────────────────────────────────── Memberships ──────────────────────────────────

    pub async fn leave_group(
        &self,
        requester: &UserId,
        group_id: &GroupId,
    ) -> Result<(), MembershipError> {
        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        let membership = match role_in(uow.as_mut(), requester, &group).await? {
            (GroupRole::Leader, _) => return Err(MembershipError::LeaderCannotLeave),
            (GroupRole::Member, Some(m)) => m,
            _ => return Err(MembershipError::NotAMember),
        };

        uow.end_membership(&membership.id, MembershipStatus::Left)
            .await
            .map_err(or_conflict(MembershipError::NotAMember))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::MemberLeft)
            .group_id(Some(group_id))
            .message(format!("left group \"{}\"", group.name))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, user_id = %requester, "Member left");
        Ok(())
    }

    pub async fn remove_member(
        &self,
        requester: &UserId,
        group_id: &GroupId,
        target: &UserId,
    ) -> Result<(), MembershipError> {
        let mut uow = self.begin().await?;
        let group = lock_active_group(uow.as_mut(), group_id).await?;
        if has_role(requester, &group, None) != GroupRole::Leader {
            return Err(MembershipError::NotLeader);
        }
        let membership = match role_in(uow.as_mut(), target, &group).await? {
            (GroupRole::Leader, _) => return Err(MembershipError::CannotRemoveLeader),
            (GroupRole::Member, Some(m)) => m,
            _ => return Err(MembershipError::NotAMember),
        };

        uow.end_membership(&membership.id, MembershipStatus::Removed)
            .await
            .map_err(or_conflict(MembershipError::NotAMember))?;

        let entry = ActivityEntry::builder(requester, ActivityAction::MemberRemoved)
            .group_id(Some(group_id))
            .message(format!("removed a member from \"{}\"", group.name))
            .metadata(json!({ "user_id": target.to_string() }))
            .build();
        record(uow.as_mut(), &entry).await?;
        uow.commit().await?;

        tracing::info!(group_id = %group_id, user_id = %target, "Member removed");
        Ok(())
    }
}
