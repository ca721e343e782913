//! The storage traits that backends implement.
//!
//! Reads that need no isolation go through [`Store`]. Every write happens
//! inside a [`UnitOfWork`]: the core opens one per operation, performs its
//! checks and writes through it, and commits once. Dropping a unit of work
//! without committing rolls all of its writes back.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// Read side of the persistence store plus the entry point for transactions.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────── Lifecycle ────────────────────────────────────

    /// Open a new all-or-nothing unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    // ───────────────────────────────────── Users ──────────────────────────────────────

    /// Get user by ID.
    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Get user by (lower-cased) email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    // ─────────────────────────────────── Whitelist ────────────────────────────────────

    /// Allow an email address to register.
    async fn add_whitelisted_email(&self, email: &str, note: Option<&str>)
        -> Result<(), StoreError>;

    /// Remove an email address from the whitelist.
    async fn remove_whitelisted_email(&self, email: &str) -> Result<(), StoreError>;

    /// List whitelisted email addresses, oldest first.
    async fn list_whitelisted_emails(&self) -> Result<Vec<WhitelistEntry>, StoreError>;

    // ───────────────────────────────────── Groups ─────────────────────────────────────

    /// Get group by ID (active or not).
    async fn get_group(&self, group_id: &GroupId) -> Result<Group, StoreError>;

    /// List active groups with their live member counts, newest first.
    async fn list_groups(&self) -> Result<Vec<GroupSummary>, StoreError>;

    /// Count ACTIVE memberships of a group.
    async fn count_active_members(&self, group_id: &GroupId) -> Result<u32, StoreError>;

    /// List ACTIVE members of a group, earliest joiner first.
    async fn list_group_members(&self, group_id: &GroupId)
        -> Result<Vec<MemberProfile>, StoreError>;

    /// The user's ACTIVE membership, if any.
    async fn get_active_membership(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError>;

    // ──────────────────────────────────── Requests ────────────────────────────────────

    /// Get a join request by ID.
    async fn get_request(&self, request_id: &RequestId) -> Result<MembershipRequest, StoreError>;

    /// List join requests sent to a group, optionally filtered by stored status, newest first.
    async fn list_group_requests(
        &self,
        group_id: &GroupId,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MembershipRequest>, StoreError>;

    /// List join requests sent by a user, newest first.
    async fn list_user_requests(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<MembershipRequest>, StoreError>;

    // ───────────────────────────────────── Notices ────────────────────────────────────

    /// Get a notice by ID.
    async fn get_notice(&self, notice_id: &NoticeId) -> Result<Notice, StoreError>;

    /// List a group's notices, pinned first, then newest first.
    async fn list_notices(&self, group_id: &GroupId) -> Result<Vec<Notice>, StoreError>;
}

/// A transactional handle. All reads here observe the transaction's own writes.
#[async_trait::async_trait]
pub trait UnitOfWork: Send {
    // ──────────────────────────────────── Locking ─────────────────────────────────────

    /// Load a group and hold a write lock on it until commit/rollback.
    async fn lock_group(&mut self, group_id: &GroupId) -> Result<Group, StoreError>;

    /// Load a user and hold a write lock on it until commit/rollback.
    async fn lock_user(&mut self, user_id: &UserId) -> Result<User, StoreError>;

    // ───────────────────────────────────── Users ──────────────────────────────────────

    async fn is_email_whitelisted(&mut self, email: &str) -> Result<bool, StoreError>;

    /// Insert a user. `AlreadyExists` if the email is taken.
    async fn insert_user(&mut self, params: &CreateUserParams) -> Result<User, StoreError>;

    async fn update_profile(
        &mut self,
        user_id: &UserId,
        params: &UpdateProfileParams,
    ) -> Result<User, StoreError>;

    // ───────────────────────────────────── Groups ─────────────────────────────────────

    async fn find_active_group_by_name(&mut self, name: &str)
        -> Result<Option<Group>, StoreError>;

    /// The active group led by this user, if any.
    async fn find_group_led_by(&mut self, user_id: &UserId) -> Result<Option<Group>, StoreError>;

    /// Insert an active group. `AlreadyExists` if an active group has the same name.
    async fn insert_group(&mut self, params: &CreateGroupParams) -> Result<Group, StoreError>;

    async fn update_group(
        &mut self,
        group_id: &GroupId,
        params: &UpdateGroupParams,
    ) -> Result<Group, StoreError>;

    async fn deactivate_group(&mut self, group_id: &GroupId) -> Result<(), StoreError>;

    // ─────────────────────────────────── Memberships ──────────────────────────────────

    /// Count ACTIVE memberships of a group as seen by this transaction.
    async fn count_active_members(&mut self, group_id: &GroupId) -> Result<u32, StoreError>;

    /// The user's ACTIVE membership anywhere, if any.
    async fn find_active_membership(
        &mut self,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError>;

    async fn list_active_memberships(
        &mut self,
        group_id: &GroupId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Insert an ACTIVE membership. `AlreadyExists` if the user already has one.
    async fn insert_membership(
        &mut self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Membership, StoreError>;

    /// Move an ACTIVE membership to a terminal status. `Conflict` if it is not ACTIVE.
    async fn end_membership(
        &mut self,
        membership_id: &MembershipId,
        status: MembershipStatus,
    ) -> Result<(), StoreError>;

    // ──────────────────────────────────── Requests ────────────────────────────────────

    async fn get_request(&mut self, request_id: &RequestId)
        -> Result<MembershipRequest, StoreError>;

    /// The stored PENDING request of this user for this group, if any (expired or not).
    async fn find_pending_request(
        &mut self,
        group_id: &GroupId,
        user_id: &UserId,
    ) -> Result<Option<MembershipRequest>, StoreError>;

    /// Insert a PENDING request. `AlreadyExists` if one is already pending for the pair.
    async fn insert_request(
        &mut self,
        params: &CreateRequestParams,
    ) -> Result<MembershipRequest, StoreError>;

    /// Move a PENDING request to `status`. `Conflict` if it is no longer PENDING.
    async fn decide_request(
        &mut self,
        request_id: &RequestId,
        status: RequestStatus,
        response_message: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn list_pending_requests(
        &mut self,
        group_id: &GroupId,
    ) -> Result<Vec<MembershipRequest>, StoreError>;

    /// PENDING requests whose expiry is at or before `now`.
    async fn list_stale_pending_requests(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<MembershipRequest>, StoreError>;

    // ───────────────────────────────────── Notices ────────────────────────────────────

    async fn get_notice(&mut self, notice_id: &NoticeId) -> Result<Notice, StoreError>;

    async fn insert_notice(&mut self, params: &CreateNoticeParams) -> Result<Notice, StoreError>;

    async fn update_notice(
        &mut self,
        notice_id: &NoticeId,
        params: &UpdateNoticeParams,
    ) -> Result<Notice, StoreError>;

    async fn set_notice_pinned(
        &mut self,
        notice_id: &NoticeId,
        pinned: bool,
    ) -> Result<Notice, StoreError>;

    async fn delete_notice(&mut self, notice_id: &NoticeId) -> Result<(), StoreError>;

    // ──────────────────────────────────── Activity ────────────────────────────────────

    /// Append an activity row. Rows are never updated or deleted.
    async fn append_activity(&mut self, record: &ActivityRecord) -> Result<(), StoreError>;

    // ─────────────────────────────────── Completion ───────────────────────────────────

    /// Make every write of this unit of work visible at once.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
