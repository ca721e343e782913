//! Raw activity log rows as persisted by backends.
//!
//! The typed view (actions, builder, filters) lives in `studyhub-activity`.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{GroupId, UserId};

/// Append-only activity row
#[derive(Clone, Debug)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub actor_id: UserId,
    pub group_id: Option<GroupId>,
    pub action: String, // dotted action name, e.g. "group.created"
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
