//! Activity log for studyhub.
//!
//! Every committed state change appends exactly one entry per affected party.
//! Entries are written through the caller's [`UnitOfWork`] so they commit or
//! roll back together with the change they describe. Nothing here updates or
//! deletes an entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use studyhub_storage::{ActivityRecord, GroupId, StoreError, UnitOfWork, UserId};

/// Default page size for activity queries
pub const DEFAULT_QUERY_LIMIT: u32 = 100;
/// Hard cap on activity page size
pub const MAX_QUERY_LIMIT: u32 = 1000;

/// Unique identifier for an activity entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityId(pub Uuid);

impl ActivityId {
    /// Generate a new activity ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ActivityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kinds of recorded actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    // Users
    UserRegistered,
    UserProfileUpdated,

    // Groups
    GroupCreated,
    GroupUpdated,
    GroupDeactivated,

    // Join requests
    JoinRequestSent,
    JoinRequestApproved,
    JoinRequestRejected,
    JoinRequestReviewed,
    JoinRequestExpired,

    // Memberships
    MemberLeft,
    MemberRemoved,

    // Notices
    NoticeCreated,
    NoticeUpdated,
    NoticeDeleted,
    NoticePinned,
    NoticeUnpinned,
}

impl ActivityAction {
    pub const ALL: [ActivityAction; 17] = [
        ActivityAction::UserRegistered,
        ActivityAction::UserProfileUpdated,
        ActivityAction::GroupCreated,
        ActivityAction::GroupUpdated,
        ActivityAction::GroupDeactivated,
        ActivityAction::JoinRequestSent,
        ActivityAction::JoinRequestApproved,
        ActivityAction::JoinRequestRejected,
        ActivityAction::JoinRequestReviewed,
        ActivityAction::JoinRequestExpired,
        ActivityAction::MemberLeft,
        ActivityAction::MemberRemoved,
        ActivityAction::NoticeCreated,
        ActivityAction::NoticeUpdated,
        ActivityAction::NoticeDeleted,
        ActivityAction::NoticePinned,
        ActivityAction::NoticeUnpinned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::UserRegistered => "user.registered",
            ActivityAction::UserProfileUpdated => "user.profile_updated",
            ActivityAction::GroupCreated => "group.created",
            ActivityAction::GroupUpdated => "group.updated",
            ActivityAction::GroupDeactivated => "group.deactivated",
            ActivityAction::JoinRequestSent => "join_request.sent",
            ActivityAction::JoinRequestApproved => "join_request.approved",
            ActivityAction::JoinRequestRejected => "join_request.rejected",
            ActivityAction::JoinRequestReviewed => "join_request.reviewed",
            ActivityAction::JoinRequestExpired => "join_request.expired",
            ActivityAction::MemberLeft => "member.left",
            ActivityAction::MemberRemoved => "member.removed",
            ActivityAction::NoticeCreated => "notice.created",
            ActivityAction::NoticeUpdated => "notice.updated",
            ActivityAction::NoticeDeleted => "notice.deleted",
            ActivityAction::NoticePinned => "notice.pinned",
            ActivityAction::NoticeUnpinned => "notice.unpinned",
        }
    }
}

impl std::fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActivityAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Unknown activity action: {}", s))
    }
}

/// A single immutable activity entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Unique identifier for this entry
    pub id: ActivityId,
    /// When the action was recorded
    pub timestamp: DateTime<Utc>,
    /// User the entry is attributed to
    pub actor_id: Uuid,
    /// Group context (if applicable)
    pub group_id: Option<Uuid>,
    /// The action that was performed
    pub action: ActivityAction,
    /// Human-readable description
    pub message: String,
    /// Structured details (e.g. request id, decision)
    pub metadata: Option<serde_json::Value>,
}

impl ActivityEntry {
    /// Create a new entry builder
    pub fn builder(actor_id: &UserId, action: ActivityAction) -> ActivityEntryBuilder {
        ActivityEntryBuilder::new(actor_id, action)
    }

    pub fn get_actor_id(&self) -> UserId {
        UserId(self.actor_id)
    }

    pub fn get_group_id(&self) -> Option<GroupId> {
        self.group_id.map(GroupId)
    }

    /// Flatten into the row shape backends persist.
    pub fn to_record(&self) -> ActivityRecord {
        ActivityRecord {
            id: self.id.0,
            actor_id: UserId(self.actor_id),
            group_id: self.group_id.map(GroupId),
            action: self.action.as_str().to_string(),
            message: self.message.clone(),
            metadata: self.metadata.clone(),
            created_at: self.timestamp,
        }
    }
}

impl TryFrom<ActivityRecord> for ActivityEntry {
    type Error = ActivityLogError;

    fn try_from(record: ActivityRecord) -> Result<Self, Self::Error> {
        let action = record
            .action
            .parse::<ActivityAction>()
            .map_err(ActivityLogError::Database)?;
        Ok(Self {
            id: ActivityId(record.id),
            timestamp: record.created_at,
            actor_id: record.actor_id.0,
            group_id: record.group_id.map(|g| g.0),
            action,
            message: record.message,
            metadata: record.metadata,
        })
    }
}

/// Builder for constructing activity entries
pub struct ActivityEntryBuilder {
    actor_id: Uuid,
    action: ActivityAction,
    group_id: Option<Uuid>,
    message: Option<String>,
    metadata: Option<serde_json::Value>,
    timestamp: Option<DateTime<Utc>>,
}

impl ActivityEntryBuilder {
    pub fn new(actor_id: &UserId, action: ActivityAction) -> Self {
        Self {
            actor_id: actor_id.0,
            action,
            group_id: None,
            message: None,
            metadata: None,
            timestamp: None,
        }
    }

    pub fn group_id(mut self, group_id: Option<&GroupId>) -> Self {
        self.group_id = group_id.map(|g| g.0);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> ActivityEntry {
        let message = self
            .message
            .unwrap_or_else(|| self.action.as_str().to_string());
        ActivityEntry {
            id: ActivityId::new(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            actor_id: self.actor_id,
            group_id: self.group_id,
            action: self.action,
            message,
            metadata: self.metadata,
        }
    }
}

/// Append an entry inside the caller's unit of work.
pub async fn record(uow: &mut dyn UnitOfWork, entry: &ActivityEntry) -> Result<(), StoreError> {
    uow.append_activity(&entry.to_record()).await
}

/// Filter for querying the activity log
#[derive(Clone, Debug, Default)]
pub struct ActivityFilter {
    /// Filter by actor
    pub actor_id: Option<UserId>,
    /// Filter by group
    pub group_id: Option<GroupId>,
    /// Filter by action
    pub action: Option<ActivityAction>,
    /// Filter by start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Filter by end timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results to return
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor_id(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn group_id(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn action(mut self, action: ActivityAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Page size with the default applied and the cap enforced.
    pub fn effective_limit(&self) -> Result<u32, ActivityLogError> {
        match self.limit {
            None => Ok(DEFAULT_QUERY_LIMIT),
            Some(0) => Err(ActivityLogError::InvalidFilter(
                "limit must be positive".to_string(),
            )),
            Some(n) if n > MAX_QUERY_LIMIT => Err(ActivityLogError::InvalidFilter(format!(
                "limit must be at most {}",
                MAX_QUERY_LIMIT
            ))),
            Some(n) => Ok(n),
        }
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// Error type for activity log queries
#[derive(Debug, Error)]
pub enum ActivityLogError {
    #[error("database error: {0}")]
    Database(String),

    #[error("activity entry not found: {0}")]
    NotFound(ActivityId),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Read side of the activity log.
///
/// Writes only happen through [`record`], inside a unit of work.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Query entries matching the filter, newest first.
    async fn query(&self, filter: ActivityFilter) -> Result<Vec<ActivityEntry>, ActivityLogError>;

    /// Get a specific entry by ID.
    async fn get(&self, id: ActivityId) -> Result<ActivityEntry, ActivityLogError>;

    /// Count entries matching the filter (limit/offset ignored).
    async fn count(&self, filter: ActivityFilter) -> Result<u64, ActivityLogError>;
}
