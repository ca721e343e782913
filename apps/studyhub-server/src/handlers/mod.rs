//! HTTP handlers and their wire types.
//!
//! Handlers validate the payload shape, hand the call to the membership
//! engine and render the result. Business rules live in the engine.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studyhub_activity::ActivityEntry;
use studyhub_membership::Page;
use studyhub_storage::{
    GroupSummary, MemberProfile, MembershipRequest, Notice, ParseEnumError, User,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

pub mod activity;
pub mod auth;
pub mod groups;
pub mod notices;
pub mod requests;
pub mod users;

/// Parse an upper-case enum name sent by a client.
fn parse_enum<T>(field: &str, value: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = ParseEnumError>,
{
    value
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|e: ParseEnumError| ApiError::Validation(format!("{field}: {e}")))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PageQuery {
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Page {
            limit: q.limit,
            offset: q.offset,
        }
    }
}

// ────────────────────────────────────── Views ──────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub bio: Option<String>,
    pub github_url: Option<String>,
    pub blog_url: Option<String>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id.0,
            email: u.email,
            name: u.name,
            bio: u.bio,
            github_url: u.github_url,
            blog_url: u.blog_url,
            verified: u.verified,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub purpose: &'static str,
    pub max_members: u32,
    pub member_count: u32,
    pub leader_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupSummary> for GroupView {
    fn from(s: GroupSummary) -> Self {
        let g = s.group;
        Self {
            id: g.id.0,
            name: g.name,
            description: g.description,
            purpose: g.purpose.as_str(),
            max_members: g.max_members,
            member_count: s.member_count,
            leader_id: g.leader_id.0,
            created_at: g.created_at,
            updated_at: g.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MemberView {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub is_leader: bool,
    pub joined_at: DateTime<Utc>,
}

impl MemberView {
    fn new(m: MemberProfile, leader_id: Uuid) -> Self {
        Self {
            user_id: m.user_id.0,
            name: m.name,
            email: m.email,
            is_leader: m.user_id.0 == leader_id,
            joined_at: m.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub status: &'static str,
    pub message: String,
    pub response_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<MembershipRequest> for RequestView {
    fn from(r: MembershipRequest) -> Self {
        Self {
            id: r.id.0,
            group_id: r.group_id.0,
            user_id: r.user_id.0,
            status: r.status.as_str(),
            message: r.message,
            response_message: r.response_message,
            created_at: r.created_at,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NoticeView {
    pub id: Uuid,
    pub group_id: Uuid,
    pub author_id: Uuid,
    pub kind: &'static str,
    pub title: String,
    pub content: String,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Notice> for NoticeView {
    fn from(n: Notice) -> Self {
        Self {
            id: n.id.0,
            group_id: n.group_id.0,
            author_id: n.author_id.0,
            kind: n.kind.as_str(),
            title: n.title,
            content: n.content,
            pinned: n.pinned,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActivityView {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Uuid,
    pub group_id: Option<Uuid>,
    pub action: &'static str,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
}

impl From<ActivityEntry> for ActivityView {
    fn from(e: ActivityEntry) -> Self {
        Self {
            id: e.id.0,
            timestamp: e.timestamp,
            actor_id: e.actor_id,
            group_id: e.group_id,
            action: e.action.as_str(),
            message: e.message,
            metadata: e.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyhub_storage::{GroupPurpose, NoticeKind};

    #[test]
    fn test_parse_enum_is_case_insensitive() {
        let purpose: GroupPurpose = parse_enum("purpose", " project ").unwrap();
        assert_eq!(purpose, GroupPurpose::Project);

        let err = parse_enum::<NoticeKind>("kind", "memo").unwrap_err();
        assert!(matches!(err, ApiError::Validation(msg) if msg.starts_with("kind:")));
    }
}
